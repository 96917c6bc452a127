//! High level revocation checking functionality
//!
//! The check_revocation module determines the revocation status of the certificates in a
//! certification path using CRLs. CRLs are drawn from the following sources, in order of priority:
//! - CRLs supplied with the [`ValidationParams`] in use
//! - CRLs that accompanied the certificates being validated
//! - CRLs obtained via a [`CrlCache`] from the HTTP(S) URIs in a certificate's CRL DP extension
//!
//! At most one CRL is installed per distinct issuer certificate during a single check. A cached CRL that is
//! not fresh is only used when no other candidate is available.

use std::sync::Arc;

use log::info;

use crate::revocation::crl::{check_crl_applicability, process_crl};
use crate::source::crl_cache::CrlCache;
use crate::util::error::{Error, PathValidationStatus::*, Result};
use crate::util::name_utils::compare_names;
use crate::util::time_of_interest::TimeOfInterest;
use crate::validator::cert_path::CertificationPath;
use crate::validator::pdv_certificate::PdvCertificate;
use crate::validator::pdv_crl::PdvCrl;
use crate::validator::validation_params::{RevocationPolicy, ValidationParams};

/// select_local_crl returns the first CRL in `crls` issued by the issuer of `target` that is usable
/// at `toi`.
fn select_local_crl(
    target: &PdvCertificate,
    issuer: &PdvCertificate,
    crls: &[Arc<PdvCrl>],
    toi: TimeOfInterest,
) -> Option<Arc<PdvCrl>> {
    crls.iter()
        .filter(|crl| compare_names(crl.issuer(), target.issuer()) && !crl.is_expired(toi))
        .find(|crl| check_crl_applicability(target, issuer, crl, toi).is_ok())
        .cloned()
}

/// select_cached_crl consults `crl_cache` for each HTTP(S) CRL DP in `target`. The first fresh,
/// usable CRL is returned. Failing that, the first usable CRL that is not fresh is returned.
fn select_cached_crl(
    target: &PdvCertificate,
    issuer: &PdvCertificate,
    crl_cache: &CrlCache,
    toi: TimeOfInterest,
) -> Option<Arc<PdvCrl>> {
    let mut stale = None;
    for uri in target.get_http_crl_dps() {
        let cached = match crl_cache.get_crl(&uri) {
            Some(cached) => cached,
            None => continue,
        };
        if let Err(e) = check_crl_applicability(target, issuer, &cached.crl, toi) {
            info!(
                "Discarding CRL obtained from {} for certificate issued to {}: {}",
                uri,
                target.subject_string(),
                e
            );
            continue;
        }
        if cached.fresh {
            return Some(cached.crl);
        }
        if stale.is_none() {
            stale = Some(cached.crl);
        }
    }
    if stale.is_some() {
        info!(
            "Using CRL that is not fresh for certificate issued to {}",
            target.subject_string()
        );
    }
    stale
}

/// check_revocation determines the revocation status of certificates in `path` using CRLs.
///
/// When `params.revocation_policy` is [`RevocationPolicy::EntityOnly`] only the target is checked;
/// when it is [`RevocationPolicy::FullChain`] each intermediate CA certificate is checked too. The
/// trust anchor is never checked.
///
/// Ok is returned if status for all checked certificates was determined and none were revoked. If a
/// certificate is found to be revoked Error::PathValidation(CertificateRevokedEndEntity) or
/// Error::PathValidation(CertificateRevokedIntermediateCa) is returned. If status could not be
/// determined, Error::PathValidation(RevocationStatusNotDetermined) is returned.
pub fn check_revocation(
    path: &CertificationPath,
    params: &ValidationParams,
    inline_crls: &[Arc<PdvCrl>],
    crl_cache: Option<&CrlCache>,
    toi: TimeOfInterest,
) -> Result<()> {
    let certs = path.certificates();
    if certs.is_empty() {
        info!("Target is a trust anchor, revocation status determination not required.");
        return Ok(());
    }
    let max_index = certs.len() - 1;
    let first = match params.revocation_policy {
        RevocationPolicy::Off => {
            info!("Revocation checking disabled");
            return Ok(());
        }
        RevocationPolicy::EntityOnly => max_index,
        RevocationPolicy::FullChain => 0,
    };

    // CRLs installed so far, at most one per issuer certificate; issuers sharing a name but not a
    // key (e.g., across a key rollover) each get their own
    let mut installed: Vec<(&Arc<PdvCertificate>, Arc<PdvCrl>)> = vec![];

    for (pos, cur_cert) in certs.iter().enumerate().skip(first) {
        let issuer_cert = path.issuer_of(pos);
        let cur_cert_subject = cur_cert.subject_string();
        let revoked_error = if pos == max_index {
            CertificateRevokedEndEntity
        } else {
            CertificateRevokedIntermediateCa
        };

        let existing = installed
            .iter()
            .find(|(issuer, _)| issuer.encoded_cert == issuer_cert.encoded_cert)
            .map(|(_, crl)| crl.clone());
        let (crl, source) = if let Some(crl) = existing {
            (Some(crl), "installed")
        } else if let Some(crl) = select_local_crl(cur_cert, issuer_cert, &params.crls, toi) {
            (Some(crl), "supplied")
        } else if let Some(crl) = select_local_crl(cur_cert, issuer_cert, inline_crls, toi) {
            (Some(crl), "accompanying")
        } else if let Some(crl) =
            crl_cache.and_then(|cache| select_cached_crl(cur_cert, issuer_cert, cache, toi))
        {
            (Some(crl), "cached")
        } else {
            (None, "")
        };

        let crl = match crl {
            Some(crl) => crl,
            None => {
                info!(
                    "Failed to determine revocation status for certificate issued to {}: no usable CRL",
                    cur_cert_subject
                );
                return Err(Error::PathValidation(RevocationStatusNotDetermined));
            }
        };
        if !installed
            .iter()
            .any(|(issuer, _)| issuer.encoded_cert == issuer_cert.encoded_cert)
        {
            installed.push((issuer_cert, crl.clone()));
        }

        match process_crl(cur_cert, issuer_cert, &crl, toi) {
            Ok(()) => {
                info!(
                    "Determined revocation status (valid) using {} CRL from {} for certificate issued to {}",
                    source,
                    crl.issuer_string(),
                    cur_cert_subject
                );
            }
            Err(Error::PathValidation(CertificateRevoked)) => {
                info!(
                    "Determined revocation status (revoked) using {} CRL from {} for certificate issued to {}",
                    source,
                    crl.issuer_string(),
                    cur_cert_subject
                );
                return Err(Error::PathValidation(revoked_error));
            }
            Err(e) => {
                info!(
                    "Failed to determine revocation status using {} CRL for certificate issued to {} with {}",
                    source, cur_cert_subject, e
                );
                return Err(Error::PathValidation(RevocationStatusNotDetermined));
            }
        }
    }
    Ok(())
}
