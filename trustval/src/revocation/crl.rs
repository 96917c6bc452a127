//! Structures and functions that determine whether a CRL may be used to establish the revocation
//! status of a certificate and, if so, what that status is (minus support for delta CRLs, indirect
//! CRLs, on hold, and nameRelativeToIssuer distribution points)

use const_oid::db::rfc5912::{
    ID_CE_AUTHORITY_KEY_IDENTIFIER, ID_CE_CERTIFICATE_ISSUER, ID_CE_CRL_DISTRIBUTION_POINTS,
    ID_CE_CRL_NUMBER, ID_CE_CRL_REASONS, ID_CE_DELTA_CRL_INDICATOR, ID_CE_FRESHEST_CRL,
    ID_CE_HOLD_INSTRUCTION_CODE, ID_CE_INVALIDITY_DATE, ID_CE_ISSUING_DISTRIBUTION_POINT,
};
use der::Decode;
use log::{error, info};
use x509_cert::crl::RevokedCert;
use x509_cert::ext::pkix::name::{DistributionPointName, GeneralNames};
use x509_cert::ext::pkix::{IssuingDistributionPoint, KeyUsages};

use crate::util::crypto::verify_signature_message;
use crate::util::error::*;
use crate::util::logging::log_error_for_subject;
use crate::util::name_utils::compare_names;
use crate::util::time_of_interest::TimeOfInterest;
use crate::validator::pdv_certificate::{PdvCertificate, PdvExtension};
use crate::validator::pdv_crl::PdvCrl;

/// verify_crl verifies the signature on `crl` using the public key from `issuer`.
pub fn verify_crl(crl: &PdvCrl, issuer: &PdvCertificate) -> Result<()> {
    let r = verify_signature_message(
        &crl.encoded_tbs,
        crl.decoded_crl.signature.raw_bytes(),
        &crl.decoded_crl.signature_algorithm,
        &issuer.decoded_cert.tbs_certificate.subject_public_key_info,
    );
    if let Err(e) = r {
        log_error_for_subject(
            &issuer.decoded_cert,
            format!("CRL signature verification error: {:?}", e).as_str(),
        );
        return Err(Error::PathValidation(
            PathValidationStatus::SignatureVerificationFailure,
        ));
    }
    Ok(())
}

/// check_crl_sign ensures that, when a key usage extension is present in the CRL issuer's
/// certificate, the cRLSign bit is set.
pub fn check_crl_sign(issuer: &PdvCertificate) -> Result<()> {
    if !issuer.has_key_usage(KeyUsages::CRLSign) {
        error!("crlSign is not set in key usage extension");
        return Err(Error::PathValidation(PathValidationStatus::InvalidKeyUsage));
    }
    Ok(())
}

/// check_crl_validity rejects CRLs whose thisUpdate is later than the time of interest or whose
/// nextUpdate is earlier than the time of interest.
pub fn check_crl_validity(toi: TimeOfInterest, crl: &PdvCrl) -> Result<()> {
    let toi = toi.as_unix_secs();
    let tu = crl.this_update();
    if tu > toi {
        info!(
            "Discarding CRL from {} as having this update time ({}) later than time of interest ({})",
            crl.issuer_string(),
            tu,
            toi
        );
        return Err(Error::CrlIncompatible);
    }
    if let Some(nu) = crl.next_update() {
        if nu < toi {
            info!(
                "Discarding CRL from {} as having next update time ({}) earlier than time of interest ({})",
                crl.issuer_string(),
                nu,
                toi
            );
            return Err(Error::CrlIncompatible);
        }
    }
    Ok(())
}

/// check_crl_extensions rejects CRLs that feature a critical extension other than those that are
/// either processed here or safely ignored.
pub fn check_crl_extensions(crl: &PdvCrl) -> Result<()> {
    let exts_to_ignore = [
        ID_CE_ISSUING_DISTRIBUTION_POINT,
        ID_CE_DELTA_CRL_INDICATOR,
        ID_CE_FRESHEST_CRL,
        ID_CE_CRL_NUMBER,
        ID_CE_AUTHORITY_KEY_IDENTIFIER,
    ];
    if let Some(exts) = &crl.decoded_crl.tbs_cert_list.crl_extensions {
        for e in exts {
            if e.critical && !exts_to_ignore.contains(&e.extn_id) {
                info!(
                    "Discarding CRL from {} due to unrecognized critical extension {}",
                    crl.issuer_string(),
                    e.extn_id
                );
                return Err(Error::UnsupportedCrlExtension);
            }
            if e.extn_id == ID_CE_DELTA_CRL_INDICATOR {
                info!("Discarding delta CRL from {}", crl.issuer_string());
                return Err(Error::CrlIncompatible);
            }
        }
    }
    Ok(())
}

/// check_entry_extensions inspects the extensions in a CRL entry. invalidity date and reasons are
/// informational. hold instruction is ignored with the corresponding certificate treated as revoked.
/// Presence of any other critical extension is cause to discard the CRL.
pub fn check_entry_extensions(rc: &RevokedCert) -> Result<()> {
    let exts_to_ignore = [
        ID_CE_INVALIDITY_DATE,
        ID_CE_CRL_REASONS,
        ID_CE_HOLD_INSTRUCTION_CODE,
    ];
    if let Some(exts) = &rc.crl_entry_extensions {
        for e in exts {
            if e.critical && !exts_to_ignore.contains(&e.extn_id) {
                return Err(Error::UnsupportedCrlEntryExtension);
            }
        }
    }
    Ok(())
}

fn certificate_issuer_extension_present(rc: &RevokedCert) -> bool {
    match &rc.crl_entry_extensions {
        Some(exts) => exts.iter().any(|e| e.extn_id == ID_CE_CERTIFICATE_ISSUER),
        None => false,
    }
}

fn get_idp(crl: &PdvCrl) -> Result<Option<IssuingDistributionPoint>> {
    if let Some(exts) = &crl.decoded_crl.tbs_cert_list.crl_extensions {
        for e in exts {
            if e.extn_id == ID_CE_ISSUING_DISTRIBUTION_POINT {
                let idp = IssuingDistributionPoint::from_der(e.extn_value.as_bytes())?;
                return Ok(Some(idp));
            }
        }
    }
    Ok(None)
}

fn at_least_one_general_name_in_common(lhs: &GeneralNames, rhs: &GeneralNames) -> bool {
    rhs.iter().any(|gn| lhs.contains(gn))
}

fn dp_full_names(target: &PdvCertificate) -> Vec<GeneralNames> {
    let mut retval = vec![];
    if let Some(PdvExtension::CrlDistributionPoints(crl_dps)) =
        target.get_extension(&ID_CE_CRL_DISTRIBUTION_POINTS)
    {
        for dp in &crl_dps.0 {
            if let Some(DistributionPointName::FullName(gns)) = &dp.distribution_point {
                retval.push(gns.clone());
            }
        }
    }
    retval
}

/// validate_crl_scope confirms that the coverage and distribution point of a CRL, as expressed in
/// its issuing distribution point extension, include `target`.
///
/// Indirect CRLs, CRLs limited to attribute certificates and CRLs that cover only some reasons are
/// rejected. A CRL whose issuing distribution point names a distribution point is accepted only when
/// `target` features a CRL distribution point with at least one name in common.
pub fn validate_crl_scope(target: &PdvCertificate, crl: &PdvCrl) -> Result<()> {
    let idp = match get_idp(crl)? {
        Some(idp) => idp,
        None => return Ok(()),
    };

    if idp.indirect_crl {
        info!("Discarding indirect CRL from {}", crl.issuer_string());
        return Err(Error::UnsupportedIndirectCrl);
    }
    if idp.only_contains_attribute_certs {
        return Err(Error::CrlIncompatible);
    }
    let is_ca = target.is_ca();
    if idp.only_contains_ca_certs && !is_ca {
        return Err(Error::CrlIncompatible);
    }
    if idp.only_contains_user_certs && is_ca {
        return Err(Error::CrlIncompatible);
    }
    if idp.only_some_reasons.is_some() {
        info!(
            "Discarding CRL from {} as covering only some reasons",
            crl.issuer_string()
        );
        return Err(Error::CrlIncompatible);
    }

    match &idp.distribution_point {
        None => Ok(()),
        Some(DistributionPointName::FullName(gns_from_idp)) => {
            let found_match = dp_full_names(target)
                .iter()
                .any(|gns| at_least_one_general_name_in_common(gns, gns_from_idp));
            if found_match {
                Ok(())
            } else {
                Err(Error::CrlIncompatible)
            }
        }
        Some(DistributionPointName::NameRelativeToCRLIssuer(_)) => Err(Error::CrlIncompatible),
    }
}

/// check_crl_applicability performs every check needed to decide whether `crl` may be used to
/// determine the revocation status of `target`, which was issued by `issuer`, at `toi`. The list of
/// revoked certificates is not consulted.
pub fn check_crl_applicability(
    target: &PdvCertificate,
    issuer: &PdvCertificate,
    crl: &PdvCrl,
    toi: TimeOfInterest,
) -> Result<()> {
    if !compare_names(crl.issuer(), target.issuer()) {
        return Err(Error::CrlIncompatible);
    }
    verify_crl(crl, issuer)?;
    check_crl_sign(issuer)?;
    check_crl_validity(toi, crl)?;
    check_crl_extensions(crl)?;
    if let Err(e) = validate_crl_scope(target, crl) {
        info!(
            "Discarding CRL from {} as having incompatible scope or coverage for certificate issued to {}",
            crl.issuer_string(),
            target.subject_string()
        );
        return Err(e);
    }
    Ok(())
}

/// process_crl determines the revocation status of `target` using `crl`.
///
/// Returns Ok when the CRL is usable and does not list `target`, an error carrying
/// [`PathValidationStatus::CertificateRevoked`] when it does, and some other error when the CRL cannot
/// be used.
pub fn process_crl(
    target: &PdvCertificate,
    issuer: &PdvCertificate,
    crl: &PdvCrl,
    toi: TimeOfInterest,
) -> Result<()> {
    check_crl_applicability(target, issuer, crl, toi)?;

    if let Some(revoked_certificates) = &crl.decoded_crl.tbs_cert_list.revoked_certificates {
        for rc in revoked_certificates {
            if certificate_issuer_extension_present(rc) {
                info!(
                    "Discarding CRL from {} due to presence of certificate issuer CRL entry extension",
                    crl.issuer_string()
                );
                return Err(Error::UnsupportedIndirectCrl);
            }
        }
    }

    if !crl.is_revoked(target.serial_number()) {
        return Ok(());
    }

    if let Some(revoked_certificates) = &crl.decoded_crl.tbs_cert_list.revoked_certificates {
        if let Some(rc) = revoked_certificates
            .iter()
            .find(|rc| &rc.serial_number == target.serial_number())
        {
            if let Err(e) = check_entry_extensions(rc) {
                info!(
                    "Discarding CRL from {} due to unrecognized critical CRL entry extension",
                    crl.issuer_string()
                );
                return Err(e);
            }
        }
    }
    Err(Error::PathValidation(
        PathValidationStatus::CertificateRevoked,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{
        BasicConstraints, CertificateParams, CertificateRevocationListParams, CrlDistributionPoint,
        DnType, IsCa, KeyIdMethod, KeyPair, KeyUsagePurpose, RevokedCertParams,
        SerialNumber as RcSerial,
    };
    use time::{Duration, OffsetDateTime};

    struct Fixture {
        ca: PdvCertificate,
        ee: PdvCertificate,
        ca_cert: rcgen::Certificate,
        ca_key: KeyPair,
    }

    fn fixture(ca_key_usages: Vec<KeyUsagePurpose>) -> Fixture {
        let ca_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec![]).unwrap();
        params.distinguished_name.push(DnType::CommonName, "CRL Test CA");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = ca_key_usages;
        let ca_cert = params.self_signed(&ca_key).unwrap();

        let ee_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["ee.example.org".to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, "ee.example.org");
        params.serial_number = Some(RcSerial::from(7u64));
        params.crl_distribution_points = vec![CrlDistributionPoint {
            uris: vec!["http://crl.example.org/ca.crl".to_string()],
        }];
        let ee_cert = params.signed_by(&ee_key, &ca_cert, &ca_key).unwrap();

        Fixture {
            ca: PdvCertificate::from_pem_or_der(ca_cert.der()).unwrap(),
            ee: PdvCertificate::from_pem_or_der(ee_cert.der()).unwrap(),
            ca_cert,
            ca_key,
        }
    }

    fn make_crl(f: &Fixture, revoked: &[u64], this_update: OffsetDateTime) -> PdvCrl {
        let crl = CertificateRevocationListParams {
            this_update,
            next_update: this_update + Duration::days(7),
            crl_number: RcSerial::from(1u64),
            issuing_distribution_point: None,
            revoked_certs: revoked
                .iter()
                .map(|s| RevokedCertParams {
                    serial_number: RcSerial::from(*s),
                    revocation_time: this_update,
                    reason_code: None,
                    invalidity_date: None,
                })
                .collect(),
            key_identifier_method: KeyIdMethod::Sha256,
        }
        .signed_by(&f.ca_cert, &f.ca_key)
        .unwrap();
        PdvCrl::try_from(crl.der().as_ref()).unwrap()
    }

    #[test]
    fn process_crl_not_revoked_and_revoked() {
        let f = fixture(vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign]);
        let now = OffsetDateTime::now_utc() - Duration::hours(1);
        let toi = TimeOfInterest::now();

        let good = make_crl(&f, &[1, 2, 3], now);
        assert!(process_crl(&f.ee, &f.ca, &good, toi).is_ok());

        let bad = make_crl(&f, &[7], now);
        assert_eq!(
            process_crl(&f.ee, &f.ca, &bad, toi),
            Err(Error::PathValidation(PathValidationStatus::CertificateRevoked))
        );
    }

    #[test]
    fn crl_validity_window() {
        let f = fixture(vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign]);
        let now = OffsetDateTime::now_utc();

        let future = make_crl(&f, &[], now + Duration::days(1));
        assert_eq!(
            check_crl_validity(TimeOfInterest::now(), &future),
            Err(Error::CrlIncompatible)
        );

        let current = make_crl(&f, &[], now - Duration::hours(1));
        assert!(check_crl_validity(TimeOfInterest::now(), &current).is_ok());
        let later = TimeOfInterest::from_unix_secs(TimeOfInterest::now().as_unix_secs() + 30 * 86400);
        assert_eq!(check_crl_validity(later, &current), Err(Error::CrlIncompatible));
    }

    #[test]
    fn crl_issuer_without_crl_sign() {
        let f = fixture(vec![KeyUsagePurpose::KeyCertSign]);
        let crl = make_crl(&f, &[], OffsetDateTime::now_utc() - Duration::hours(1));
        assert_eq!(
            process_crl(&f.ee, &f.ca, &crl, TimeOfInterest::now()),
            Err(Error::PathValidation(PathValidationStatus::InvalidKeyUsage))
        );
    }

    #[test]
    fn crl_from_other_issuer() {
        let f = fixture(vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign]);
        let other = fixture(vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign]);
        let crl = make_crl(&other, &[], OffsetDateTime::now_utc() - Duration::hours(1));
        // same issuer name, different key
        assert_eq!(
            process_crl(&f.ee, &f.ca, &crl, TimeOfInterest::now()),
            Err(Error::PathValidation(
                PathValidationStatus::SignatureVerificationFailure
            ))
        );
    }
}
