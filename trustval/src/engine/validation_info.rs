//! Production of [`ValidationParams`] instances from the credentials published by a resolver

use std::collections::BTreeSet;
use std::sync::Arc;

use der::asn1::ObjectIdentifier;
use log::debug;

use crate::engine::credential::{Credential, CredentialCriteria, CredentialResolver, LockedResolver};
use crate::util::error::Result;
use crate::validator::pdv_certificate::PdvCertificate;
use crate::validator::pdv_crl::PdvCrl;
use crate::validator::validation_params::{PkixSettings, ValidationParams};

/// Settings an engine shares with the [`ValidationInfoIterator`] instances it creates
pub trait PkixValidationSettings {
    /// Validation settings
    fn pkix_settings(&self) -> &PkixSettings;
    /// Policy OIDs parsed from the settings
    fn policy_oids(&self) -> &BTreeSet<ObjectIdentifier>;
}

/// [`ValidationInfoIterator`] yields the [`ValidationParams`] sets to try, in order, when
/// validating a certificate for a peer.
///
/// The credentials are resolved when the iterator is created, and the resolver's lock is held
/// until the iterator is dropped. Each credential with at least one certificate contributes its
/// certificates as trust anchors and its CRLs. Depending on
/// [`PkixSettings::per_credential`], each such credential yields its own set, or the contributions
/// of all are merged into a single set.
pub struct ValidationInfoIterator<'a> {
    _guard: Box<dyn LockedResolver + 'a>,
    settings: &'a dyn PkixValidationSettings,
    credentials: Vec<Credential>,
    position: usize,
}

impl<'a> ValidationInfoIterator<'a> {
    /// Locks `resolver` and resolves the credentials matching `criteria`.
    pub fn new(
        resolver: &'a dyn CredentialResolver,
        criteria: &CredentialCriteria,
        settings: &'a dyn PkixValidationSettings,
    ) -> Result<Self> {
        let guard = resolver.lock()?;
        let credentials: Vec<Credential> = guard
            .resolve(criteria)
            .into_iter()
            .filter(|c| !c.certificates.is_empty())
            .collect();
        debug!(
            "Resolved {} credentials bearing trust anchors",
            credentials.len()
        );
        Ok(ValidationInfoIterator {
            _guard: guard,
            settings,
            credentials,
            position: 0,
        })
    }

    fn params(
        &self,
        trust_anchors: Vec<Arc<PdvCertificate>>,
        crls: Vec<Arc<PdvCrl>>,
    ) -> ValidationParams {
        self.settings.pkix_settings().to_params(
            self.settings.policy_oids(),
            trust_anchors,
            crls,
        )
    }
}

impl Iterator for ValidationInfoIterator<'_> {
    type Item = ValidationParams;

    fn next(&mut self) -> Option<ValidationParams> {
        if self.position >= self.credentials.len() {
            return None;
        }
        if self.settings.pkix_settings().per_credential {
            let cred = &self.credentials[self.position];
            self.position += 1;
            return Some(self.params(cred.certificates.clone(), cred.crls.clone()));
        }

        self.position = self.credentials.len();
        let mut trust_anchors: Vec<Arc<PdvCertificate>> = vec![];
        let mut crls: Vec<Arc<PdvCrl>> = vec![];
        for cred in &self.credentials {
            for ta in &cred.certificates {
                if !trust_anchors.iter().any(|t| t.encoded_cert == ta.encoded_cert) {
                    trust_anchors.push(ta.clone());
                }
            }
            for crl in &cred.crls {
                if !crls.iter().any(|c| c.encoded_crl == crl.encoded_crl) {
                    crls.push(crl.clone());
                }
            }
        }
        Some(self.params(trust_anchors, crls))
    }
}
