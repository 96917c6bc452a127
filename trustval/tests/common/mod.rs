//! Certificate and CRL fixtures shared by the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateRevocationListParams,
    CrlDistributionPoint, DnType, IsCa, KeyIdMethod, KeyPair, KeyUsagePurpose, RevokedCertParams,
    SerialNumber,
};
use time::{Duration, OffsetDateTime};
use trustval::*;

pub const EE_CRL_URI: &str = "http://crl.example.org/intermediate.crl";
pub const CA_CRL_URI: &str = "http://crl.example.org/root.crl";
pub const INTERMEDIATE_SERIAL: u64 = 100;

pub struct Issued {
    pub cert: Certificate,
    pub key: KeyPair,
    pub pdv: Arc<PdvCertificate>,
}

impl Issued {
    pub fn der(&self) -> Vec<u8> {
        self.cert.der().to_vec()
    }
}

fn ca_params(cn: &str, crl_uri: Option<&str>) -> CertificateParams {
    let mut params = CertificateParams::new(vec![]).unwrap();
    params.distinguished_name = rcgen::DistinguishedName::new();
    params.distinguished_name.push(DnType::OrganizationName, "Example");
    params.distinguished_name.push(DnType::CommonName, cn);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    if let Some(uri) = crl_uri {
        params.crl_distribution_points = vec![CrlDistributionPoint {
            uris: vec![uri.to_string()],
        }];
    }
    params
}

fn finish(cert: Certificate, key: KeyPair) -> Issued {
    let pdv = Arc::new(PdvCertificate::from_pem_or_der(cert.der()).unwrap());
    Issued { cert, key, pdv }
}

pub fn root(cn: &str) -> Issued {
    let key = KeyPair::generate().unwrap();
    let cert = ca_params(cn, None).self_signed(&key).unwrap();
    finish(cert, key)
}

pub fn intermediate(cn: &str, issuer: &Issued) -> Issued {
    intermediate_with_key(cn, issuer, KeyPair::generate().unwrap())
}

pub fn intermediate_with_key(cn: &str, issuer: &Issued, key: KeyPair) -> Issued {
    let mut params = ca_params(cn, Some(CA_CRL_URI));
    params.serial_number = Some(SerialNumber::from(INTERMEDIATE_SERIAL));
    let cert = params
        .signed_by(&key, &issuer.cert, &issuer.key)
        .unwrap();
    finish(cert, key)
}

pub fn end_entity(dns_name: &str, serial: u64, issuer: &Issued) -> Issued {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(vec![dns_name.to_string()]).unwrap();
    params.distinguished_name = rcgen::DistinguishedName::new();
    params.distinguished_name.push(DnType::OrganizationName, "Example");
    params.distinguished_name.push(DnType::CommonName, dns_name);
    params.serial_number = Some(SerialNumber::from(serial));
    params.crl_distribution_points = vec![CrlDistributionPoint {
        uris: vec![EE_CRL_URI.to_string()],
    }];
    let cert = params.signed_by(&key, &issuer.cert, &issuer.key).unwrap();
    finish(cert, key)
}

/// Root, intermediate and end entity with serial 7
pub struct Pki {
    pub root: Issued,
    pub intermediate: Issued,
    pub ee: Issued,
}

pub fn pki() -> Pki {
    let root = root("Test Root CA");
    let intermediate = intermediate("Test Intermediate CA", &root);
    let ee = end_entity("ee.example.org", 7, &intermediate);
    Pki {
        root,
        intermediate,
        ee,
    }
}

/// crl_der returns a CRL issued by `issuer` that was issued an hour ago and is valid for a week.
pub fn crl_der(issuer: &Issued, revoked: &[u64]) -> Vec<u8> {
    crl_der_at(issuer, revoked, OffsetDateTime::now_utc() - Duration::hours(1), Duration::days(7))
}

pub fn crl_der_at(
    issuer: &Issued,
    revoked: &[u64],
    this_update: OffsetDateTime,
    validity: Duration,
) -> Vec<u8> {
    CertificateRevocationListParams {
        this_update,
        next_update: this_update + validity,
        crl_number: SerialNumber::from(1u64),
        issuing_distribution_point: None,
        revoked_certs: revoked
            .iter()
            .map(|s| RevokedCertParams {
                serial_number: SerialNumber::from(*s),
                revocation_time: this_update,
                reason_code: None,
                invalidity_date: None,
            })
            .collect(),
        key_identifier_method: KeyIdMethod::Sha256,
    }
    .signed_by(&issuer.cert, &issuer.key)
    .unwrap()
    .der()
    .to_vec()
}

pub fn crl(issuer: &Issued, revoked: &[u64]) -> Arc<PdvCrl> {
    Arc::new(PdvCrl::from_pem_or_der(&crl_der(issuer, revoked)).unwrap())
}

/// Serves canned responses keyed by URI and counts requests
#[derive(Default)]
pub struct MapFetcher {
    pub responses: Vec<(String, Vec<u8>)>,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl CrlFetcher for MapFetcher {
    fn fetch(&self, uri: &str) -> trustval::Result<Vec<u8>> {
        self.requests.lock().unwrap().push(uri.to_string());
        self.responses
            .iter()
            .find(|(u, _)| u == uri)
            .map(|(_, b)| b.clone())
            .ok_or(Error::NetworkError)
    }
}
