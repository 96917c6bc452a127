//! Certification path validation per [RFC 5280 Section 6.1], with optional policy processing and
//! CRL-based revocation checking.
//!
//! [`PathValidator::validate`] builds candidate paths from an end entity certificate through an
//! untrusted pool to the trust anchors in a [`ValidationParams`] instance, then subjects each
//! candidate to the basic checks below, the depth limit, policy processing (when enabled) and the
//! revocation pass (when enabled). The first candidate to pass everything wins.
//!
//! [RFC 5280 Section 6.1]: <https://datatracker.ietf.org/doc/html/rfc5280.html#section-6.1>

use std::sync::Arc;

use log::{debug, error, info};
use x509_cert::ext::pkix::KeyUsages;

use crate::revocation::check_revocation::check_revocation;
use crate::source::crl_cache::CrlCache;
use crate::util::error::*;
use crate::util::logging::{log_error_for_ca, log_error_for_subject, log_untrusted};
use crate::util::name_utils::compare_names;
use crate::util::time_of_interest::TimeOfInterest;
use crate::validator::cert_path::CertificationPath;
use crate::validator::path_builder::build_paths;
use crate::validator::pdv_certificate::{PdvCertificate, EXTS_IGNORED, EXTS_OF_INTEREST};
use crate::validator::pdv_crl::PdvCrl;
use crate::validator::policy_tree::check_certificate_policies;
use crate::validator::validation_params::{RevocationPolicy, ValidationParams, MAX_VERIFY_DEPTH};

//-----------------------------------------------------------------------------
// Functions that perform some small aspect of path validation
//-----------------------------------------------------------------------------

/// `check_validity` ensures the target, each intermediate CA certificate and the trust anchor are
/// valid at the time of interest.
pub fn check_validity(path: &CertificationPath, toi: TimeOfInterest) -> Result<()> {
    let mut certs = path.certificates();
    certs.push(&path.trust_anchor);
    for cert in certs {
        let validity = &cert.decoded_cert.tbs_certificate.validity;
        if toi < validity.not_before {
            log_error_for_subject(&cert.decoded_cert, "certificate is not yet valid");
            return Err(Error::PathValidation(
                PathValidationStatus::InvalidNotBeforeDate,
            ));
        }
        if toi > validity.not_after {
            log_error_for_subject(&cert.decoded_cert, "certificate has expired");
            return Err(Error::PathValidation(
                PathValidationStatus::InvalidNotAfterDate,
            ));
        }
    }
    Ok(())
}

/// `check_names` ensures that subject and issuer names chain appropriately throughout the
/// certification path.
pub fn check_names(path: &CertificationPath) -> Result<()> {
    for (index, cert) in path.certificates().iter().enumerate() {
        let issuer = path.issuer_of(index);
        if !compare_names(cert.issuer(), issuer.subject()) {
            log_error_for_ca(&issuer.decoded_cert, "name chaining violation");
            return Err(Error::PathValidation(
                PathValidationStatus::NameChainingFailure,
            ));
        }
    }
    Ok(())
}

/// `check_basic_constraints` ensures all intermediate CA certificates feature a basicConstraints
/// extension with the cA field set to true and that the path does not violate any
/// pathLenConstraint.
pub fn check_basic_constraints(path: &CertificationPath) -> Result<()> {
    let mut max_path_length = path.intermediate_count();

    for ca_cert in path.intermediates.iter() {
        // (l)  If the certificate was not self-issued, verify that
        //       max_path_length is greater than zero and decrement
        //       max_path_length by 1.
        if !ca_cert.is_self_issued() {
            if max_path_length == 0 {
                log_error_for_ca(&ca_cert.decoded_cert, "path length constraint violation");
                return Err(Error::PathValidation(
                    PathValidationStatus::InvalidPathLength,
                ));
            }
            max_path_length -= 1;
        }

        // (k)  verify that the basicConstraints extension is present and that cA is set to TRUE
        let bc = match ca_cert.basic_constraints() {
            Some(bc) => bc,
            None => {
                log_error_for_ca(&ca_cert.decoded_cert, "missing basic constraints");
                return Err(Error::PathValidation(
                    PathValidationStatus::MissingBasicConstraints,
                ));
            }
        };
        if !bc.ca {
            log_error_for_ca(&ca_cert.decoded_cert, "invalid basic constraints");
            return Err(Error::PathValidation(
                PathValidationStatus::InvalidBasicConstraints,
            ));
        }

        // (m)  If pathLenConstraint is present in the certificate and is
        //       less than max_path_length, set max_path_length to the value
        //       of pathLenConstraint.
        if let Some(pl) = bc.path_len_constraint {
            max_path_length = max_path_length.min(pl as usize);
        }
    }
    Ok(())
}

/// `check_key_usage` ensures intermediate CA certificates that feature a key usage extension
/// assert keyCertSign.
pub fn check_key_usage(path: &CertificationPath) -> Result<()> {
    for ca_cert in path.intermediates.iter() {
        if !ca_cert.has_key_usage(KeyUsages::KeyCertSign) {
            log_error_for_ca(
                &ca_cert.decoded_cert,
                "keyCertSign is not set in key usage extension",
            );
            return Err(Error::PathValidation(PathValidationStatus::InvalidKeyUsage));
        }
    }
    Ok(())
}

/// `check_critical_extensions` ensures no certificate below the trust anchor features a critical
/// extension that is not processed.
pub fn check_critical_extensions(path: &CertificationPath) -> Result<()> {
    for cert in path.certificates() {
        if let Some(exts) = &cert.decoded_cert.tbs_certificate.extensions {
            for ext in exts {
                if ext.critical
                    && !EXTS_OF_INTEREST.contains(&ext.extn_id)
                    && !EXTS_IGNORED.contains(&ext.extn_id)
                {
                    log_error_for_subject(
                        &cert.decoded_cert,
                        format!("unprocessed critical extension: {}", ext.extn_id).as_str(),
                    );
                    return Err(Error::PathValidation(
                        PathValidationStatus::UnprocessedCriticalExtension,
                    ));
                }
            }
        }
    }
    Ok(())
}

/// `check_depth` ensures the number of intermediate CA certificates does not exceed `max_depth`.
pub fn check_depth(path: &CertificationPath, max_depth: u32) -> Result<()> {
    let count = path.intermediate_count();
    if count > max_depth as usize {
        log_error_for_subject(
            &path.target.decoded_cert,
            format!(
                "path contains {} intermediate CA certificates, maximum is {}",
                count, max_depth
            )
            .as_str(),
        );
        return Err(Error::PathValidation(PathValidationStatus::DepthExceeded));
    }
    Ok(())
}

/// `validate_path_rfc5280` performs the basic path validation checks that do not depend on
/// revocation information.
///
/// Signatures are verified while paths are built, so are not checked again here. Key usage and
/// basic constraints extensions in the trust anchor are not enforced.
pub fn validate_path_rfc5280(
    path: &CertificationPath,
    params: &ValidationParams,
    toi: TimeOfInterest,
) -> Result<()> {
    check_validity(path, toi)?;
    if path.target_is_trust_anchor() {
        return Ok(());
    }
    check_names(path)?;
    check_basic_constraints(path)?;
    check_key_usage(path)?;
    check_critical_extensions(path)?;
    check_depth(path, params.max_depth)?;
    if params.policy_checking_enabled() {
        check_certificate_policies(path, params)?;
    }
    debug!(
        "Successfully completed basic path validation checks for certificate issued to {}",
        path.target.subject_string()
    );
    Ok(())
}

/// Verifies certificate chains against one [`ValidationParams`] set at a time.
///
/// A `PathValidator` holds no per-validation state and may be shared between threads.
#[derive(Clone, Default)]
pub struct PathValidator {
    crl_cache: Option<Arc<CrlCache>>,
    time_of_interest: Option<TimeOfInterest>,
}

impl PathValidator {
    /// Creates a validator that consults `crl_cache` for CRLs that were not supplied directly.
    pub fn new(crl_cache: Option<Arc<CrlCache>>) -> Self {
        PathValidator {
            crl_cache,
            time_of_interest: None,
        }
    }

    /// Validates at a fixed time instead of the current time.
    pub fn with_time_of_interest(mut self, toi: TimeOfInterest) -> Self {
        self.time_of_interest = Some(toi);
        self
    }

    fn toi(&self) -> TimeOfInterest {
        self.time_of_interest.unwrap_or_else(TimeOfInterest::now)
    }

    /// Returns true if `entity` chains to one of the trust anchors in `params` via certificates from
    /// `untrusted` and passes all checks required by `params`. `inline_crls` are CRLs that
    /// accompanied the certificates being validated; they are consulted after `params.crls` and
    /// before any cached or fetched CRL.
    ///
    /// Failures are logged and reported as false.
    pub fn validate(
        &self,
        entity: &Arc<PdvCertificate>,
        untrusted: &[Arc<PdvCertificate>],
        params: &ValidationParams,
        inline_crls: &[Arc<PdvCrl>],
    ) -> bool {
        match self.validate_path(entity, untrusted, params, inline_crls) {
            Ok(path) => {
                info!(
                    "Successfully validated certification path for certificate issued to {} with {} intermediate CA certificates",
                    entity.subject_string(),
                    path.intermediate_count()
                );
                true
            }
            Err(Error::UnsupportedAlgorithm(oid)) => {
                error!(
                    "Certificate issued to {} could not be validated due to unsupported algorithm {}",
                    entity.subject_string(),
                    oid
                );
                false
            }
            Err(e) => {
                log_untrusted(&entity.decoded_cert, format!("{}", e).as_str());
                false
            }
        }
    }

    /// As [`PathValidator::validate`], but returns the validated path or the error observed for
    /// the last candidate path. When no candidate path was found and a signature algorithm
    /// encountered while building paths is not supported, [`Error::UnsupportedAlgorithm`] is
    /// returned.
    pub fn validate_path(
        &self,
        entity: &Arc<PdvCertificate>,
        untrusted: &[Arc<PdvCertificate>],
        params: &ValidationParams,
        inline_crls: &[Arc<PdvCrl>],
    ) -> Result<CertificationPath> {
        if params.trust_anchors.is_empty() {
            return Err(Error::PathValidation(
                PathValidationStatus::MissingTrustAnchor,
            ));
        }

        let toi = self.toi();
        // one intermediate beyond the limit is allowed so that the depth check reports it
        let build_depth = params.max_depth.saturating_add(1).min(MAX_VERIFY_DEPTH);
        let candidates = build_paths(
            entity,
            untrusted,
            &params.trust_anchors,
            build_depth as usize,
        );
        if candidates.paths.is_empty() {
            if let Some(oid) = candidates.unsupported_algorithm {
                return Err(Error::UnsupportedAlgorithm(oid));
            }
        }

        let mut last_error = Error::PathValidation(PathValidationStatus::NoPathsFound);
        for path in candidates.paths {
            if let Err(e) = validate_path_rfc5280(&path, params, toi) {
                last_error = e;
                continue;
            }
            if params.revocation_policy != RevocationPolicy::Off && !path.target_is_trust_anchor()
            {
                if let Err(e) = check_revocation(
                    &path,
                    params,
                    inline_crls,
                    self.crl_cache.as_deref(),
                    toi,
                ) {
                    last_error = e;
                    continue;
                }
            }
            return Ok(path);
        }
        Err(last_error)
    }
}

#[test]
fn check_depth_test() {
    use der::Decode;
    use x509_cert::Certificate;
    let kp = rcgen::KeyPair::generate().unwrap();
    let params = rcgen::CertificateParams::new(vec!["depth.example.org".to_string()]).unwrap();
    let cert = params.self_signed(&kp).unwrap();
    let pdv = Arc::new(
        PdvCertificate::try_from(Certificate::from_der(cert.der()).unwrap()).unwrap(),
    );
    let path = CertificationPath::new(pdv.clone(), vec![pdv.clone(), pdv.clone()], pdv);
    assert!(check_depth(&path, 2).is_ok());
    assert_eq!(
        check_depth(&path, 1),
        Err(Error::PathValidation(PathValidationStatus::DepthExceeded))
    );
}
