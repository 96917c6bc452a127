//! Wrapper around a decoded certificate that retains the encoding and the extensions consulted
//! during path building, path validation, name matching and revocation checking

use std::collections::BTreeMap;

use const_oid::db::rfc5912::{
    ID_CE_AUTHORITY_KEY_IDENTIFIER, ID_CE_BASIC_CONSTRAINTS, ID_CE_CERTIFICATE_POLICIES,
    ID_CE_CRL_DISTRIBUTION_POINTS, ID_CE_EXT_KEY_USAGE, ID_CE_INHIBIT_ANY_POLICY,
    ID_CE_KEY_USAGE, ID_CE_POLICY_CONSTRAINTS, ID_CE_POLICY_MAPPINGS, ID_CE_SUBJECT_ALT_NAME,
    ID_CE_SUBJECT_KEY_IDENTIFIER,
};
use der::{asn1::ObjectIdentifier, Decode, Encode};
use x509_cert::ext::pkix::crl::CrlDistributionPoints;
use x509_cert::ext::pkix::name::{DistributionPointName, GeneralName};
use x509_cert::ext::pkix::{
    BasicConstraints, CertificatePolicies, InhibitAnyPolicy, KeyUsage, KeyUsages,
    PolicyConstraints, PolicyMappings, SubjectAltName,
};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

use crate::util::error::*;
use crate::util::file_utils::pem_or_der;
use crate::util::name_utils::{compare_names, name_to_string};

/// Extensions that are parsed when a [`PdvCertificate`] is instantiated. Critical extensions not
/// in this list cause path validation to fail.
pub const EXTS_OF_INTEREST: &[ObjectIdentifier] = &[
    ID_CE_BASIC_CONSTRAINTS,
    ID_CE_KEY_USAGE,
    ID_CE_SUBJECT_ALT_NAME,
    ID_CE_CRL_DISTRIBUTION_POINTS,
    ID_CE_CERTIFICATE_POLICIES,
    ID_CE_POLICY_MAPPINGS,
    ID_CE_POLICY_CONSTRAINTS,
    ID_CE_INHIBIT_ANY_POLICY,
];

/// Extensions that are recognized but whose content does not affect validation.
pub(crate) const EXTS_IGNORED: &[ObjectIdentifier] = &[
    ID_CE_SUBJECT_KEY_IDENTIFIER,
    ID_CE_AUTHORITY_KEY_IDENTIFIER,
    ID_CE_EXT_KEY_USAGE,
];

/// [`PdvExtension`] provides a wrapper for the extension types used by this crate.
#[derive(PartialEq, Clone, Eq, Debug)]
pub enum PdvExtension {
    /// Parsed BasicConstraints extension
    BasicConstraints(BasicConstraints),
    /// Parsed KeyUsage extension
    KeyUsage(KeyUsage),
    /// Parsed SubjectAltName extension
    SubjectAltName(SubjectAltName),
    /// Parsed CRLDistributionPoints extension
    CrlDistributionPoints(CrlDistributionPoints),
    /// Parsed CertificatePolicies extension
    CertificatePolicies(CertificatePolicies),
    /// Parsed PolicyMappings extension
    PolicyMappings(PolicyMappings),
    /// Parsed PolicyConstraints extension
    PolicyConstraints(PolicyConstraints),
    /// Parsed InhibitAnyPolicy extension
    InhibitAnyPolicy(InhibitAnyPolicy),
}

/// [`PdvCertificate`] aggregates a binary, DER-encoded Certificate, the decoded Certificate, the
/// encoded TBSCertificate (i.e., the signed portion) and the parsed extensions of interest.
///
/// Instances are immutable once created and are shared via `Arc` between credential resolvers,
/// validation parameters and certification paths.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PdvCertificate {
    /// Binary, encoded Certificate object
    pub encoded_cert: Vec<u8>,
    /// Decoded Certificate object
    pub decoded_cert: Certificate,
    /// Binary, encoded TBSCertificate
    pub encoded_tbs: Vec<u8>,
    parsed_extensions: BTreeMap<ObjectIdentifier, PdvExtension>,
}

impl TryFrom<&[u8]> for PdvCertificate {
    type Error = Error;

    fn try_from(enc_cert: &[u8]) -> Result<Self> {
        let cert = Certificate::from_der(enc_cert)?;
        PdvCertificate::new(enc_cert.to_vec(), cert)
    }
}

impl TryFrom<Certificate> for PdvCertificate {
    type Error = Error;

    fn try_from(cert: Certificate) -> Result<Self> {
        let enc_cert = cert.to_der()?;
        PdvCertificate::new(enc_cert, cert)
    }
}

impl PdvCertificate {
    fn new(encoded_cert: Vec<u8>, decoded_cert: Certificate) -> Result<Self> {
        let encoded_tbs = decoded_cert.tbs_certificate.to_der()?;
        let parsed_extensions = parse_extensions(&decoded_cert)?;
        Ok(PdvCertificate {
            encoded_cert,
            decoded_cert,
            encoded_tbs,
            parsed_extensions,
        })
    }

    /// Parses a certificate that may be either binary DER or PEM encoded.
    pub fn from_pem_or_der(buf: &[u8]) -> Result<Self> {
        let der = pem_or_der(buf)?;
        PdvCertificate::try_from(der.as_slice())
    }

    /// `get_extension` returns the previously parsed extension identified by `oid`, if present.
    pub fn get_extension(&self, oid: &ObjectIdentifier) -> Option<&PdvExtension> {
        self.parsed_extensions.get(oid)
    }

    /// Subject name
    pub fn subject(&self) -> &Name {
        &self.decoded_cert.tbs_certificate.subject
    }

    /// Issuer name
    pub fn issuer(&self) -> &Name {
        &self.decoded_cert.tbs_certificate.issuer
    }

    /// Serial number
    pub fn serial_number(&self) -> &SerialNumber {
        &self.decoded_cert.tbs_certificate.serial_number
    }

    /// RFC 4514 rendering of the subject name, for logging
    pub fn subject_string(&self) -> String {
        name_to_string(self.subject())
    }

    /// is_self_issued returns true if the subject and issuer names match.
    pub fn is_self_issued(&self) -> bool {
        compare_names(self.issuer(), self.subject())
    }

    /// DER encoding of the SubjectPublicKeyInfo, used for byte-wise key comparison
    pub fn spki_der(&self) -> Result<Vec<u8>> {
        Ok(self
            .decoded_cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()?)
    }

    /// Basic constraints extension, if present
    pub fn basic_constraints(&self) -> Option<&BasicConstraints> {
        match self.get_extension(&ID_CE_BASIC_CONSTRAINTS) {
            Some(PdvExtension::BasicConstraints(bc)) => Some(bc),
            _ => None,
        }
    }

    /// is_ca returns true when a basic constraints extension asserting cA is present.
    pub fn is_ca(&self) -> bool {
        self.basic_constraints().map(|bc| bc.ca).unwrap_or(false)
    }

    /// has_key_usage returns true if the key usage extension is absent or asserts `usage`.
    pub fn has_key_usage(&self, usage: KeyUsages) -> bool {
        match self.get_extension(&ID_CE_KEY_USAGE) {
            Some(PdvExtension::KeyUsage(ku)) => ku.0.contains(usage),
            _ => true,
        }
    }

    /// DNS names and URIs from the subject alternative name extension
    pub fn san_dns_and_uris(&self) -> Vec<String> {
        let mut retval = vec![];
        if let Some(PdvExtension::SubjectAltName(san)) = self.get_extension(&ID_CE_SUBJECT_ALT_NAME)
        {
            for gn in san.0.iter() {
                match gn {
                    GeneralName::DnsName(dns) => retval.push(dns.to_string()),
                    GeneralName::UniformResourceIdentifier(uri) => retval.push(uri.to_string()),
                    _ => {}
                }
            }
        }
        retval
    }

    /// get_crl_dps returns the list of URIs read from the CRL DP extension, if any.
    pub fn get_crl_dps(&self) -> Vec<String> {
        let mut retval = vec![];
        if let Some(PdvExtension::CrlDistributionPoints(crl_dps)) =
            self.get_extension(&ID_CE_CRL_DISTRIBUTION_POINTS)
        {
            for crl_dp in &crl_dps.0 {
                if let Some(DistributionPointName::FullName(gns)) = &crl_dp.distribution_point {
                    for gn in gns {
                        if let GeneralName::UniformResourceIdentifier(uri) = &gn {
                            let s = uri.to_string();
                            if !retval.contains(&s) {
                                retval.push(s);
                            }
                        }
                    }
                }
            }
        }
        retval
    }

    /// HTTP and HTTPS URIs read from the CRL DP extension
    pub fn get_http_crl_dps(&self) -> Vec<String> {
        self.get_crl_dps()
            .into_iter()
            .filter(|uri| {
                let lc = uri.to_lowercase();
                lc.starts_with("http://") || lc.starts_with("https://")
            })
            .collect()
    }

    /// Policy OIDs asserted in the certificate policies extension
    pub fn policy_oids(&self) -> Vec<ObjectIdentifier> {
        match self.get_extension(&ID_CE_CERTIFICATE_POLICIES) {
            Some(PdvExtension::CertificatePolicies(cp)) => {
                cp.0.iter().map(|pi| pi.policy_identifier).collect()
            }
            _ => vec![],
        }
    }
}

fn parse_extensions(cert: &Certificate) -> Result<BTreeMap<ObjectIdentifier, PdvExtension>> {
    macro_rules! add_ext {
        ($pe:ident, $oid:expr, $v:ident, $t:ident) => {
            $pe.insert($oid, PdvExtension::$t($t::from_der($v)?))
        };
    }

    let mut pe = BTreeMap::new();
    if let Some(exts) = cert.tbs_certificate.extensions.as_ref() {
        for ext in exts {
            let v = ext.extn_value.as_bytes();
            match ext.extn_id {
                ID_CE_BASIC_CONSTRAINTS => add_ext!(pe, ext.extn_id, v, BasicConstraints),
                ID_CE_KEY_USAGE => add_ext!(pe, ext.extn_id, v, KeyUsage),
                ID_CE_SUBJECT_ALT_NAME => add_ext!(pe, ext.extn_id, v, SubjectAltName),
                ID_CE_CRL_DISTRIBUTION_POINTS => {
                    add_ext!(pe, ext.extn_id, v, CrlDistributionPoints)
                }
                ID_CE_CERTIFICATE_POLICIES => add_ext!(pe, ext.extn_id, v, CertificatePolicies),
                ID_CE_POLICY_MAPPINGS => add_ext!(pe, ext.extn_id, v, PolicyMappings),
                ID_CE_POLICY_CONSTRAINTS => add_ext!(pe, ext.extn_id, v, PolicyConstraints),
                ID_CE_INHIBIT_ANY_POLICY => add_ext!(pe, ext.extn_id, v, InhibitAnyPolicy),
                _ => None,
            };
        }
    }
    Ok(pe)
}
