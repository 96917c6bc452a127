//! Trust engine that trusts only keys published directly by a credential resolver

use std::sync::Arc;

use flagset::FlagSet;
use log::{debug, error, info};

use crate::engine::credential::{Credential, CredentialCriteria, CredentialResolver};
use crate::engine::signature::SignatureInput;
use crate::engine::trust_engine::{EngineCapabilities, TrustEngine};
use crate::util::error::Error;
use crate::validator::pdv_certificate::PdvCertificate;

/// [`ExplicitKeyTrustEngine`] trusts an end entity certificate or signature only when the key
/// involved is one of the keys of the credentials resolved for the criteria. No path is built and
/// certificate contents other than the public key are not examined.
#[derive(Clone, Debug, Default)]
pub struct ExplicitKeyTrustEngine {}

impl ExplicitKeyTrustEngine {
    /// Creates a new engine.
    pub fn new() -> Self {
        ExplicitKeyTrustEngine {}
    }
}

fn resolve(resolver: &dyn CredentialResolver, criteria: &CredentialCriteria) -> Vec<Credential> {
    match resolver.lock() {
        Ok(guard) => guard.resolve(criteria),
        Err(e) => {
            error!("Failed to obtain credentials from credential resolver: {}", e);
            vec![]
        }
    }
}

impl TrustEngine for ExplicitKeyTrustEngine {
    fn capabilities(&self) -> FlagSet<EngineCapabilities> {
        EngineCapabilities::Chain
            | EngineCapabilities::Signature
            | EngineCapabilities::DetachedSignature
    }

    fn validate_chain(
        &self,
        entity: &Arc<PdvCertificate>,
        _untrusted: &[Arc<PdvCertificate>],
        resolver: &dyn CredentialResolver,
        criteria: &mut CredentialCriteria,
    ) -> bool {
        let target = match entity.spki_der() {
            Ok(enc) => enc,
            Err(e) => {
                error!(
                    "Failed to encode public key from certificate issued to {}: {}",
                    entity.subject_string(),
                    e
                );
                return false;
            }
        };
        let credentials = resolve(resolver, criteria);
        if credentials
            .iter()
            .filter_map(|c| c.public_key_der())
            .any(|k| k == target)
        {
            debug!(
                "Public key from certificate issued to {} matched a resolved credential",
                entity.subject_string()
            );
            true
        } else {
            info!(
                "Public key from certificate issued to {} did not match any of {} resolved credentials",
                entity.subject_string(),
                credentials.len()
            );
            false
        }
    }

    fn validate_signature(
        &self,
        input: &SignatureInput<'_>,
        resolver: &dyn CredentialResolver,
        criteria: &mut CredentialCriteria,
    ) -> bool {
        let credentials = resolve(resolver, criteria);
        for cred in &credentials {
            let spki = match cred.spki() {
                Some(spki) => spki,
                None => continue,
            };
            match input.verify_with(spki) {
                Ok(()) => {
                    debug!("Signature verified using key from resolved credential");
                    return true;
                }
                Err(Error::UnsupportedAlgorithm(oid)) => {
                    error!("Signature could not be verified due to unsupported algorithm {}", oid);
                }
                Err(_) => {}
            }
        }
        info!(
            "Signature was not verified by any of {} resolved credentials",
            credentials.len()
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::credential::StaticCredentialResolver;
    use crate::engine::signature::{KeyInfo, SignedContent};
    use der::Decode;
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::{DerSignature, SigningKey};
    use p256::pkcs8::DecodePrivateKey;
    use rcgen::{CertificateParams, KeyPair};
    use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

    fn issue(name: &str) -> (Arc<PdvCertificate>, KeyPair) {
        let kp = KeyPair::generate().unwrap();
        let params = CertificateParams::new(vec![name.to_string()]).unwrap();
        let cert = params.self_signed(&kp).unwrap();
        (
            Arc::new(PdvCertificate::from_pem_or_der(cert.der()).unwrap()),
            kp,
        )
    }

    #[test]
    fn chain_matches_on_key_only() {
        let (a, _) = issue("a.example.org");
        let (b, _) = issue("b.example.org");
        let spki = SubjectPublicKeyInfoOwned::from_der(&a.spki_der().unwrap()).unwrap();
        let resolver = StaticCredentialResolver::new(vec![Credential::from_public_key(spki)]);
        let engine = ExplicitKeyTrustEngine::new();
        let mut criteria = CredentialCriteria::default();
        assert!(engine.validate_chain(&a, &[], &resolver, &mut criteria));
        assert!(!engine.validate_chain(&b, &[], &resolver, &mut criteria));
        assert!(!engine.validate_chain(
            &a,
            &[],
            &StaticCredentialResolver::default(),
            &mut criteria
        ));
    }

    #[test]
    fn signature_verified_with_resolved_key() {
        let (a, kp) = issue("a.example.org");
        let (b, _) = issue("b.example.org");
        let data = b"signed content".to_vec();
        let key = SigningKey::from_pkcs8_der(&kp.serialize_der()).unwrap();
        let signature: DerSignature = key.sign(&data);
        let content = SignedContent {
            algorithm: AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
                parameters: None,
            },
            signature: signature.as_bytes().to_vec(),
            data,
            key_info: KeyInfo::default(),
        };
        let engine = ExplicitKeyTrustEngine::new();
        let mut criteria = CredentialCriteria::default();

        let trusted = StaticCredentialResolver::new(vec![Credential::from_certificates(vec![a])]);
        assert!(engine.validate_signature(
            &SignatureInput::Embedded(&content),
            &trusted,
            &mut criteria
        ));
        let other = StaticCredentialResolver::new(vec![Credential::from_certificates(vec![b])]);
        assert!(!engine.validate_signature(
            &SignatureInput::Embedded(&content),
            &other,
            &mut criteria
        ));
    }
}
