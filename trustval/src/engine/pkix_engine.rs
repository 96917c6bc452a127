//! Trust engine that evaluates certificates by building and validating certification paths to
//! trust anchors published by a credential resolver

use std::collections::BTreeSet;
use std::sync::Arc;

use der::asn1::ObjectIdentifier;
use flagset::FlagSet;
use log::{error, info};

use crate::engine::credential::{CredentialCriteria, CredentialResolver};
use crate::engine::signature::SignatureInput;
use crate::engine::trust_engine::{EngineCapabilities, TrustEngine};
use crate::engine::validation_info::{PkixValidationSettings, ValidationInfoIterator};
use crate::source::crl_cache::CrlCache;
use crate::util::error::{Error, PathValidationStatus, Result};
use crate::util::logging::log_untrusted;
use crate::util::name_utils::{get_leaf_common_name, name_to_forward_string, name_to_string};
use crate::util::time_of_interest::TimeOfInterest;
use crate::validator::path_validator::PathValidator;
use crate::validator::pdv_certificate::PdvCertificate;
use crate::validator::pdv_crl::PdvCrl;
use crate::validator::validation_params::{PkixSettings, ValidationParams};

/// entity_name_matches returns true if any of `names` matches, ignoring case, the subject name of
/// `cert` (rendered in either RDN order), a DNS name or URI from its subject alternative name
/// extension, or the last common name in its subject.
pub fn entity_name_matches(cert: &PdvCertificate, names: &BTreeSet<String>) -> bool {
    let mut candidates = vec![
        name_to_string(cert.subject()),
        name_to_forward_string(cert.subject()),
    ];
    candidates.extend(cert.san_dns_and_uris());
    if let Some(cn) = get_leaf_common_name(cert.subject()) {
        candidates.push(cn);
    }
    names
        .iter()
        .any(|n| candidates.iter().any(|c| c.eq_ignore_ascii_case(n.trim())))
}

/// [`PkixTrustEngine`] evaluates an end entity certificate by validating certification paths to
/// the trust anchors of the credentials published by a resolver.
///
/// When the criteria name a peer, the certificate must first match the peer name or a key name
/// of one of the resolver's credentials for the requested usage; see [`entity_name_matches`].
pub struct PkixTrustEngine {
    settings: PkixSettings,
    policy_oids: BTreeSet<ObjectIdentifier>,
    validator: PathValidator,
}

impl PkixTrustEngine {
    /// Creates an engine that validates paths per `settings`, obtaining CRLs that were not supplied
    /// from `crl_cache`, if present.
    ///
    /// Fails with [`Error::Misconfiguration`] when the settings cannot be used.
    pub fn new(settings: PkixSettings, crl_cache: Option<Arc<CrlCache>>) -> Result<Self> {
        settings.check()?;
        let policy_oids = settings.parsed_policy_oids()?;
        Ok(PkixTrustEngine {
            settings,
            policy_oids,
            validator: PathValidator::new(crl_cache),
        })
    }

    /// Validates at a fixed time instead of the current time.
    pub fn with_time_of_interest(mut self, toi: TimeOfInterest) -> Self {
        self.validator = self.validator.with_time_of_interest(toi);
        self
    }

    // acceptable names are the peer name plus key names of credentials for the requested usage
    fn check_entity_name(
        &self,
        entity: &PdvCertificate,
        peer_name: &str,
        resolver: &dyn CredentialResolver,
        criteria: &CredentialCriteria,
    ) -> Result<()> {
        let mut names = BTreeSet::from([peer_name.to_string()]);
        {
            let guard = resolver.lock()?;
            let usage_only = CredentialCriteria::for_usage(criteria.usage);
            for cred in guard.resolve(&usage_only) {
                names.extend(cred.key_names);
            }
        }
        if entity_name_matches(entity, &names) {
            Ok(())
        } else {
            Err(Error::PathValidation(PathValidationStatus::NameMismatch))
        }
    }

    fn validate_entity(
        &self,
        entity: &Arc<PdvCertificate>,
        untrusted: &[Arc<PdvCertificate>],
        inline_crls: &[Arc<PdvCrl>],
        resolver: &dyn CredentialResolver,
        criteria: &CredentialCriteria,
    ) -> bool {
        if let Some(peer_name) = &criteria.peer_name {
            if let Err(e) = self.check_entity_name(entity, peer_name, resolver, criteria) {
                log_untrusted(
                    &entity.decoded_cert,
                    format!("no acceptable name matched peer {}: {}", peer_name, e).as_str(),
                );
                return false;
            }
        }

        // the resolver is locked only while parameter sets are produced
        let params: Vec<ValidationParams> =
            match ValidationInfoIterator::new(resolver, criteria, self) {
                Ok(iter) => iter.collect(),
                Err(e) => {
                    error!("Failed to obtain trust anchors from credential resolver: {}", e);
                    return false;
                }
            };
        if params.is_empty() {
            log_untrusted(&entity.decoded_cert, "no trust anchors are available");
            return false;
        }

        params
            .iter()
            .any(|p| self.validator.validate(entity, untrusted, p, inline_crls))
    }
}

impl PkixValidationSettings for PkixTrustEngine {
    fn pkix_settings(&self) -> &PkixSettings {
        &self.settings
    }

    fn policy_oids(&self) -> &BTreeSet<ObjectIdentifier> {
        &self.policy_oids
    }
}

impl TrustEngine for PkixTrustEngine {
    fn capabilities(&self) -> FlagSet<EngineCapabilities> {
        EngineCapabilities::Chain
            | EngineCapabilities::Signature
            | EngineCapabilities::DetachedSignature
    }

    fn validate_chain(
        &self,
        entity: &Arc<PdvCertificate>,
        untrusted: &[Arc<PdvCertificate>],
        resolver: &dyn CredentialResolver,
        criteria: &mut CredentialCriteria,
    ) -> bool {
        self.validate_entity(entity, untrusted, &[], resolver, criteria)
    }

    fn validate_signature(
        &self,
        input: &SignatureInput<'_>,
        resolver: &dyn CredentialResolver,
        criteria: &mut CredentialCriteria,
    ) -> bool {
        let key_info = match input.key_info() {
            Some(ki) => ki,
            None => {
                info!("Signature has no key information from which to obtain a certificate");
                return false;
            }
        };
        let signer = match input.locate_signer() {
            Ok(signer) => signer,
            Err(Error::UnsupportedAlgorithm(oid)) => {
                error!("Signature could not be verified due to unsupported algorithm {}", oid);
                return false;
            }
            Err(_) => {
                info!("No certificate in key information verifies the signature");
                return false;
            }
        };
        criteria.key_info = Some(key_info.clone());
        self.validate_entity(
            &signer,
            &key_info.certificates,
            &key_info.crls,
            resolver,
            criteria,
        )
    }
}
