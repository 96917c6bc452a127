//! Signature evaluation and chaining of trust engines

mod common;

use common::*;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{DerSignature, SigningKey};
use p256::pkcs8::DecodePrivateKey;
use spki::AlgorithmIdentifierOwned;
use trustval::*;

fn sign(signer: &Issued, data: &[u8]) -> Vec<u8> {
    let key = SigningKey::from_pkcs8_der(&signer.key.serialize_der()).unwrap();
    let sig: DerSignature = key.sign(data);
    sig.as_bytes().to_vec()
}

fn ecdsa_sha256() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
        parameters: None,
    }
}

fn pkix_engine(policy: RevocationPolicy) -> PkixTrustEngine {
    PkixTrustEngine::new(
        PkixSettings {
            revocation_policy: policy,
            ..Default::default()
        },
        None,
    )
    .unwrap()
}

#[test]
fn embedded_signature_with_inline_crls() {
    let pki = pki();
    let data = b"<Assertion/>".to_vec();
    let resolver = StaticCredentialResolver::new(vec![Credential::from_certificates(vec![
        pki.root.pdv.clone(),
    ])]);
    let engine = pkix_engine(RevocationPolicy::EntityOnly);

    let content = SignedContent {
        algorithm: ecdsa_sha256(),
        signature: sign(&pki.ee, &data),
        data: data.clone(),
        key_info: KeyInfo {
            certificates: vec![pki.intermediate.pdv.clone(), pki.ee.pdv.clone()],
            crls: vec![crl(&pki.intermediate, &[])],
            key_names: vec![],
        },
    };
    let mut criteria = CredentialCriteria::for_usage(UsageTypes::Signing);
    assert!(engine.validate_signature(&SignatureInput::Embedded(&content), &resolver, &mut criteria));
    // the engine records the key information it used
    assert_eq!(criteria.key_info.as_ref().unwrap().certificates.len(), 2);

    let mut revoked = content.clone();
    revoked.key_info.crls = vec![crl(&pki.intermediate, &[7])];
    let mut criteria = CredentialCriteria::for_usage(UsageTypes::Signing);
    assert!(!engine.validate_signature(&SignatureInput::Embedded(&revoked), &resolver, &mut criteria));

    let mut tampered = content.clone();
    tampered.data = b"<Assertion ID=\"x\"/>".to_vec();
    let mut criteria = CredentialCriteria::for_usage(UsageTypes::Signing);
    assert!(!engine.validate_signature(&SignatureInput::Embedded(&tampered), &resolver, &mut criteria));
}

#[test]
fn detached_signature() {
    let pki = pki();
    let data = b"query=string&sig=alg".to_vec();
    let signature = sign(&pki.ee, &data);
    let algorithm = ecdsa_sha256();
    let key_info = KeyInfo {
        certificates: vec![pki.ee.pdv.clone(), pki.intermediate.pdv.clone()],
        ..Default::default()
    };
    let resolver = StaticCredentialResolver::new(vec![Credential::from_certificates(vec![
        pki.root.pdv.clone(),
    ])]);
    let engine = pkix_engine(RevocationPolicy::Off);

    let input = SignatureInput::Detached {
        algorithm: &algorithm,
        signature: &signature,
        data: &data,
        key_info: Some(&key_info),
    };
    assert_eq!(required_capability(&input), EngineCapabilities::DetachedSignature);
    assert!(engine.validate_signature(&input, &resolver, &mut CredentialCriteria::default()));

    let no_key_info = SignatureInput::Detached {
        algorithm: &algorithm,
        signature: &signature,
        data: &data,
        key_info: None,
    };
    assert!(!engine.validate_signature(&no_key_info, &resolver, &mut CredentialCriteria::default()));

    let unsupported = AlgorithmIdentifierOwned {
        oid: const_oid::db::rfc8410::ID_ED_25519,
        parameters: None,
    };
    let input = SignatureInput::Detached {
        algorithm: &unsupported,
        signature: &signature,
        data: &data,
        key_info: Some(&key_info),
    };
    assert!(!engine.validate_signature(&input, &resolver, &mut CredentialCriteria::default()));
}

#[test]
fn explicit_key_then_pkix() {
    let pki = pki();
    let pinned = end_entity("pinned.example.org", 11, &root("Unrelated Root"));

    let mut chain = ChainingTrustEngine::new();
    chain.add_engine(Box::new(ExplicitKeyTrustEngine::new()));
    chain.add_engine(Box::new(pkix_engine(RevocationPolicy::Off)));
    assert_eq!(
        chain.capabilities(),
        EngineCapabilities::Chain | EngineCapabilities::Signature | EngineCapabilities::DetachedSignature
    );

    let resolver = StaticCredentialResolver::new(vec![
        Credential::from_certificates(vec![pki.root.pdv.clone()]),
        Credential::from_certificates(vec![pinned.pdv.clone()]).with_usage(UsageTypes::Tls),
    ]);

    // pinned key is accepted by the explicit key engine
    let mut criteria = CredentialCriteria::for_usage(UsageTypes::Tls);
    assert!(chain.validate_chain(&pinned.pdv, &[], &resolver, &mut criteria));

    // the PKIX engine accepts the end entity after the explicit key engine fails
    let mut criteria = CredentialCriteria::for_usage(UsageTypes::Tls);
    assert!(chain.validate_chain(
        &pki.ee.pdv,
        &[pki.intermediate.pdv.clone()],
        &resolver,
        &mut criteria
    ));
    assert_eq!(criteria.usage, flagset::FlagSet::<UsageTypes>::from(UsageTypes::Tls));

    let stranger = end_entity("stranger.example.org", 12, &root("Stranger Root"));
    let mut criteria = CredentialCriteria::for_usage(UsageTypes::Tls).with_peer_name("stranger.example.org");
    assert!(!chain.validate_chain(&stranger.pdv, &[], &resolver, &mut criteria));
    assert!(criteria.peer_name.is_none());
    assert_eq!(criteria.usage, flagset::FlagSet::<UsageTypes>::from(UsageTypes::Tls));
}
