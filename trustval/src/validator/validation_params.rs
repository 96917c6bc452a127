//! Validation parameters consumed by [`PathValidator`](crate::PathValidator) and the settings from
//! which trust engines derive them

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use der::asn1::ObjectIdentifier;
use log::error;
use serde::{Deserialize, Serialize};

use crate::util::error::*;
use crate::validator::pdv_certificate::PdvCertificate;
use crate::validator::pdv_crl::PdvCrl;

/// Maximum verification depth accepted from configuration. The path builder uses the same bound.
pub const MAX_VERIFY_DEPTH: u32 = 100;

/// Scope of revocation checking performed after a path has been built
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RevocationPolicy {
    /// No revocation checking
    #[default]
    Off,
    /// Only the end entity certificate is checked
    EntityOnly,
    /// The end entity certificate and all intermediate CA certificates are checked
    FullChain,
}

/// Trust anchors, CRLs and constraints for one validation attempt.
///
/// Instances are built fresh for each position of a
/// [`ValidationInfoIterator`](crate::ValidationInfoIterator) and are read-only once built.
#[readonly::make]
#[derive(Clone, Debug)]
pub struct ValidationParams {
    /// Trust anchors, in order of preference
    pub trust_anchors: Vec<Arc<PdvCertificate>>,
    /// CRLs supplied alongside the trust anchors
    pub crls: Vec<Arc<PdvCrl>>,
    /// Maximum number of intermediate CA certificates (excludes the end entity and trust anchor)
    pub max_depth: u32,
    /// Revocation checking scope
    pub revocation_policy: RevocationPolicy,
    /// Acceptable policies. Empty means any policy.
    pub policy_oids: BTreeSet<ObjectIdentifier>,
    /// initial-policy-mapping-inhibit
    pub policy_mapping_inhibited: bool,
    /// initial-any-policy-inhibit
    pub any_policy_inhibited: bool,
}

impl ValidationParams {
    /// Creates a parameter set with no policy constraints.
    pub fn new(
        trust_anchors: Vec<Arc<PdvCertificate>>,
        crls: Vec<Arc<PdvCrl>>,
        max_depth: u32,
        revocation_policy: RevocationPolicy,
    ) -> Self {
        ValidationParams {
            trust_anchors,
            crls,
            max_depth,
            revocation_policy,
            policy_oids: BTreeSet::new(),
            policy_mapping_inhibited: false,
            any_policy_inhibited: false,
        }
    }

    /// Adds policy constraints to a parameter set.
    pub fn with_policy(
        mut self,
        policy_oids: BTreeSet<ObjectIdentifier>,
        policy_mapping_inhibited: bool,
        any_policy_inhibited: bool,
    ) -> Self {
        self.policy_oids = policy_oids;
        self.policy_mapping_inhibited = policy_mapping_inhibited;
        self.any_policy_inhibited = any_policy_inhibited;
        self
    }

    /// Policy processing is performed when acceptable policies are listed or either inhibit flag is set.
    pub fn policy_checking_enabled(&self) -> bool {
        !self.policy_oids.is_empty() || self.policy_mapping_inhibited || self.any_policy_inhibited
    }

    /// A non-empty set of acceptable policies forces initial-explicit-policy.
    pub fn explicit_policy_required(&self) -> bool {
        !self.policy_oids.is_empty()
    }
}

fn default_verify_depth() -> u32 {
    1
}

/// Validation settings configured for a PKIX trust engine. These supply every field of a
/// [`ValidationParams`] except the trust anchors and CRLs, which come from credentials.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PkixSettings {
    /// Maximum number of intermediate CA certificates
    #[serde(default = "default_verify_depth")]
    pub verify_depth: u32,
    /// Revocation checking scope
    pub revocation_policy: RevocationPolicy,
    /// Acceptable policy OIDs in dotted form
    pub policy_oids: Vec<String>,
    /// initial-policy-mapping-inhibit
    pub policy_mapping_inhibit: bool,
    /// initial-any-policy-inhibit
    pub any_policy_inhibit: bool,
    /// When true, each resolved credential yields its own parameter set. When false, the trust
    /// anchors and CRLs of all resolved credentials are merged into a single set.
    pub per_credential: bool,
}

impl Default for PkixSettings {
    fn default() -> Self {
        PkixSettings {
            verify_depth: default_verify_depth(),
            revocation_policy: RevocationPolicy::Off,
            policy_oids: vec![],
            policy_mapping_inhibit: false,
            any_policy_inhibit: false,
            per_credential: false,
        }
    }
}

impl PkixSettings {
    /// Parses the configured policy OIDs, returning [`Error::Misconfiguration`] for malformed values.
    pub fn parsed_policy_oids(&self) -> Result<BTreeSet<ObjectIdentifier>> {
        let mut retval = BTreeSet::new();
        for s in &self.policy_oids {
            match ObjectIdentifier::from_str(s.trim()) {
                Ok(oid) => {
                    retval.insert(oid);
                }
                Err(e) => {
                    error!("Failed to parse policy OID {}: {}", s, e);
                    return Err(Error::Misconfiguration(format!("invalid policy OID: {}", s)));
                }
            }
        }
        Ok(retval)
    }

    /// Checks the settings, returning [`Error::Misconfiguration`] when they cannot be used.
    pub fn check(&self) -> Result<()> {
        if self.verify_depth > MAX_VERIFY_DEPTH {
            error!(
                "Verification depth {} exceeds maximum of {}",
                self.verify_depth, MAX_VERIFY_DEPTH
            );
            return Err(Error::Misconfiguration(format!(
                "verify_depth must not exceed {}",
                MAX_VERIFY_DEPTH
            )));
        }
        self.parsed_policy_oids()?;
        Ok(())
    }

    /// Builds a parameter set from these settings and the given trust anchors and CRLs.
    pub fn to_params(
        &self,
        policy_oids: &BTreeSet<ObjectIdentifier>,
        trust_anchors: Vec<Arc<PdvCertificate>>,
        crls: Vec<Arc<PdvCrl>>,
    ) -> ValidationParams {
        ValidationParams::new(
            trust_anchors,
            crls,
            self.verify_depth,
            self.revocation_policy,
        )
        .with_policy(
            policy_oids.clone(),
            self.policy_mapping_inhibit,
            self.any_policy_inhibit,
        )
    }
}
