//! End-to-end tests of the trustv command

use assert_cmd::prelude::*;
use predicates::prelude::*;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateRevocationListParams, DnType,
    IsCa, KeyIdMethod, KeyPair, KeyUsagePurpose, RevokedCertParams, SerialNumber,
};
use std::fs;
use std::path::Path;
use std::process::Command;
use time::{Duration, OffsetDateTime};

struct Fixture {
    dir: tempfile::TempDir,
    ca: Certificate,
    ca_key: KeyPair,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["tas", "crls", "keys"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
        }

        let root_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec![]).unwrap();
        params.distinguished_name.push(DnType::CommonName, "trustv Root");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let root = params.self_signed(&root_key).unwrap();
        fs::write(dir.path().join("tas/root.der"), root.der()).unwrap();

        let ca_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec![]).unwrap();
        params.distinguished_name.push(DnType::CommonName, "trustv CA");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let ca = params.signed_by(&ca_key, &root, &root_key).unwrap();
        fs::write(dir.path().join("ca.der"), ca.der()).unwrap();

        let ee_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["www.example.com".to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, "www.example.com");
        params.serial_number = Some(SerialNumber::from(42u64));
        let ee = params.signed_by(&ee_key, &ca, &ca_key).unwrap();
        fs::write(dir.path().join("ee.der"), ee.der()).unwrap();

        Fixture { dir, ca, ca_key }
    }

    fn path(&self, rel: &str) -> String {
        self.dir.path().join(rel).to_str().unwrap().to_string()
    }

    fn write_crl(&self, revoked: &[u64]) {
        let this_update = OffsetDateTime::now_utc() - Duration::hours(1);
        let crl = CertificateRevocationListParams {
            this_update,
            next_update: this_update + Duration::days(7),
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
        .signed_by(&self.ca, &self.ca_key)
        .unwrap();
        fs::write(self.dir.path().join("crls/ca.crl"), crl.der()).unwrap();
    }

    fn write_settings(&self, json: &str) -> String {
        let p = self.dir.path().join("settings.json");
        fs::write(&p, json).unwrap();
        p.to_str().unwrap().to_string()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("trustv").unwrap();
        cmd.arg("--ta-folder").arg(self.path("tas"));
        cmd.arg("--chain").arg(self.path("ee.der")).arg(self.path("ca.der"));
        cmd
    }
}

#[test]
fn valid_chain() -> Result<(), Box<dyn std::error::Error>> {
    let f = Fixture::new();
    let mut cmd = f.command();
    cmd.arg("--peer-name").arg("www.example.com");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Result: VALID"));
    Ok(())
}

#[test]
fn peer_name_mismatch() -> Result<(), Box<dyn std::error::Error>> {
    let f = Fixture::new();
    let mut cmd = f.command();
    cmd.arg("--peer-name").arg("mail.example.com");
    cmd.assert()
        .code(1)
        .stdout(predicate::str::contains("Result: INVALID"));
    Ok(())
}

#[test]
fn revocation_with_crl_folder() -> Result<(), Box<dyn std::error::Error>> {
    let f = Fixture::new();
    let settings = f.write_settings(r#"{"pkix": {"revocation_policy": "entityOnly"}}"#);

    // no CRL available
    let mut cmd = f.command();
    cmd.arg("--settings").arg(&settings);
    cmd.assert().code(1);

    f.write_crl(&[1, 2]);
    let mut cmd = f.command();
    cmd.arg("--settings").arg(&settings).arg("--crl-folder").arg(f.path("crls"));
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Result: VALID"));

    f.write_crl(&[42]);
    let mut cmd = f.command();
    cmd.arg("--settings").arg(&settings).arg("--crl-folder").arg(f.path("crls"));
    cmd.assert()
        .code(1)
        .stdout(predicate::str::contains("Result: INVALID"));
    Ok(())
}

#[test]
fn depth_limit() -> Result<(), Box<dyn std::error::Error>> {
    let f = Fixture::new();
    let settings = f.write_settings(r#"{"pkix": {"verify_depth": 0}}"#);
    let mut cmd = f.command();
    cmd.arg("--settings").arg(&settings);
    cmd.assert().code(1);
    Ok(())
}

#[test]
fn explicit_key() -> Result<(), Box<dyn std::error::Error>> {
    let f = Fixture::new();
    let key = KeyPair::generate()?;
    let pinned = CertificateParams::new(vec!["pinned.example.com".to_string()])?.self_signed(&key)?;
    fs::write(f.dir.path().join("keys/pinned.der"), pinned.der())?;
    fs::write(f.dir.path().join("pinned.der"), pinned.der())?;

    let mut cmd = Command::cargo_bin("trustv")?;
    cmd.arg("--ta-folder").arg(f.path("tas"));
    cmd.arg("--chain").arg(f.path("pinned.der"));
    cmd.assert().code(1);

    let mut cmd = Command::cargo_bin("trustv")?;
    cmd.arg("--ta-folder").arg(f.path("tas"));
    cmd.arg("--explicit-key-folder").arg(f.path("keys"));
    cmd.arg("--chain").arg(f.path("pinned.der"));
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Result: VALID"));

    // chains that validate are unaffected by the pinned keys
    let mut cmd = f.command();
    cmd.arg("--explicit-key-folder").arg(f.path("keys"));
    cmd.assert().success();
    Ok(())
}

#[test]
fn configuration_errors() -> Result<(), Box<dyn std::error::Error>> {
    let f = Fixture::new();

    let settings = f.write_settings(r#"{"pkix": {"policy_oids": ["not-an-oid"]}}"#);
    let mut cmd = f.command();
    cmd.arg("--settings").arg(&settings);
    cmd.assert()
        .code(2)
        .stdout(predicate::str::contains("Result: CONFIGURATION ERROR"));

    let mut cmd = Command::cargo_bin("trustv")?;
    cmd.arg("--ta-folder").arg(f.path("missing"));
    cmd.arg("--chain").arg(f.path("ee.der"));
    cmd.assert().code(2);

    let mut cmd = f.command();
    cmd.arg("--settings").arg(f.path("missing.json"));
    cmd.assert().code(2);

    assert!(Path::new(&f.path("ee.der")).exists());
    Ok(())
}
