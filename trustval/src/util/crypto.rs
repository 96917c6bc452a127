//! Signature verification using libraries from the [Rust Crypto](https://github.com/RustCrypto)
//! project.
//!
//! RSA PKCS #1 v1.5 signatures with SHA-256, SHA-384 or SHA-512 and ECDSA P-256 signatures with
//! SHA-256 are supported. Any other algorithm yields [`Error::UnsupportedAlgorithm`].

use const_oid::db::rfc5912::{
    ECDSA_WITH_SHA_256, ID_EC_PUBLIC_KEY, RSA_ENCRYPTION, SECP_256_R_1, SECP_384_R_1,
    SECP_521_R_1, SHA_256_WITH_RSA_ENCRYPTION, SHA_384_WITH_RSA_ENCRYPTION,
    SHA_512_WITH_RSA_ENCRYPTION,
};
use der::{asn1::ObjectIdentifier, Encode};
use log::error;
use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256, Sha384, Sha512};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::util::error::{Error, PathValidationStatus, Result};

/// is_rsa returns true if the presented OID is one of the supported RSA signature algorithms.
pub(crate) fn is_rsa(oid: &ObjectIdentifier) -> bool {
    *oid == SHA_256_WITH_RSA_ENCRYPTION
        || *oid == SHA_384_WITH_RSA_ENCRYPTION
        || *oid == SHA_512_WITH_RSA_ENCRYPTION
}

/// is_ecdsa returns true if the presented OID is a supported ECDSA signature algorithm.
pub(crate) fn is_ecdsa(oid: &ObjectIdentifier) -> bool {
    *oid == ECDSA_WITH_SHA_256
}

fn get_named_curve_parameter(alg_id: &AlgorithmIdentifierOwned) -> Result<ObjectIdentifier> {
    if let Some(params) = &alg_id.parameters {
        if let Ok(oid) = params.decode_as::<ObjectIdentifier>() {
            return Ok(oid);
        }
    }
    Err(Error::PathValidation(PathValidationStatus::EncodingError))
}

fn verify_rsa(
    message_to_verify: &[u8],
    signature: &[u8],
    signature_alg: &ObjectIdentifier,
    spki: &SubjectPublicKeyInfoOwned,
) -> Result<()> {
    let enc_spki = spki.to_der()?;
    let rsa = match RsaPublicKey::from_public_key_der(&enc_spki) {
        Ok(rsa) => rsa,
        Err(_e) => {
            error!("Failed to parse RSA public key");
            return Err(Error::PathValidation(PathValidationStatus::EncodingError));
        }
    };

    let result = match *signature_alg {
        SHA_256_WITH_RSA_ENCRYPTION => rsa.verify(
            Pkcs1v15Sign::new::<Sha256>(),
            &Sha256::digest(message_to_verify),
            signature,
        ),
        SHA_384_WITH_RSA_ENCRYPTION => rsa.verify(
            Pkcs1v15Sign::new::<Sha384>(),
            &Sha384::digest(message_to_verify),
            signature,
        ),
        SHA_512_WITH_RSA_ENCRYPTION => rsa.verify(
            Pkcs1v15Sign::new::<Sha512>(),
            &Sha512::digest(message_to_verify),
            signature,
        ),
        _ => return Err(Error::UnsupportedAlgorithm(*signature_alg)),
    };
    result.map_err(|_e| Error::PathValidation(PathValidationStatus::SignatureVerificationFailure))
}

fn verify_p256(
    message_to_verify: &[u8],
    signature: &[u8],
    spki: &SubjectPublicKeyInfoOwned,
) -> Result<()> {
    let ecdsa = match VerifyingKey::from_sec1_bytes(spki.subject_public_key.raw_bytes()) {
        Ok(ecdsa) => ecdsa,
        Err(_e) => {
            error!("Failed to parse P256 public key");
            return Err(Error::PathValidation(PathValidationStatus::EncodingError));
        }
    };
    let s = match Signature::from_der(signature) {
        Ok(s) => s,
        Err(_e) => {
            return Err(Error::PathValidation(
                PathValidationStatus::SignatureVerificationFailure,
            ))
        }
    };
    ecdsa
        .verify(message_to_verify, &s)
        .map_err(|_e| Error::PathValidation(PathValidationStatus::SignatureVerificationFailure))
}

/// verify_signature_message verifies `signature` over `message_to_verify` using the public key in
/// `spki` and the algorithm in `signature_alg`.
///
/// Returns [`Error::UnsupportedAlgorithm`] when the signature algorithm or named curve is not
/// supported and a [`PathValidationStatus::SignatureVerificationFailure`] error when the signature
/// does not verify.
pub fn verify_signature_message(
    message_to_verify: &[u8],
    signature: &[u8],
    signature_alg: &AlgorithmIdentifierOwned,
    spki: &SubjectPublicKeyInfoOwned,
) -> Result<()> {
    if is_rsa(&signature_alg.oid) {
        if spki.algorithm.oid != RSA_ENCRYPTION {
            return Err(Error::PathValidation(
                PathValidationStatus::SignatureVerificationFailure,
            ));
        }
        return verify_rsa(message_to_verify, signature, &signature_alg.oid, spki);
    } else if is_ecdsa(&signature_alg.oid) {
        if spki.algorithm.oid != ID_EC_PUBLIC_KEY {
            return Err(Error::PathValidation(
                PathValidationStatus::SignatureVerificationFailure,
            ));
        }
        let named_curve = get_named_curve_parameter(&spki.algorithm)?;
        return match named_curve {
            SECP_256_R_1 => verify_p256(message_to_verify, signature, spki),
            _ => {
                error!("Unrecognized or unsupported named curve: {}", named_curve);
                Err(Error::UnsupportedAlgorithm(named_curve))
            }
        };
    }
    error!("Unrecognized signature algorithm: {}", signature_alg.oid);
    Err(Error::UnsupportedAlgorithm(signature_alg.oid))
}

/// get_key_size returns the size in bits of the public key in `spki`, if it can be determined.
pub fn get_key_size(spki: &SubjectPublicKeyInfoOwned) -> Option<usize> {
    if spki.algorithm.oid == RSA_ENCRYPTION {
        let enc_spki = spki.to_der().ok()?;
        let rsa = RsaPublicKey::from_public_key_der(&enc_spki).ok()?;
        Some(rsa.size() * 8)
    } else if spki.algorithm.oid == ID_EC_PUBLIC_KEY {
        match get_named_curve_parameter(&spki.algorithm).ok()? {
            SECP_256_R_1 => Some(256),
            SECP_384_R_1 => Some(384),
            SECP_521_R_1 => Some(521),
            _ => None,
        }
    } else {
        None
    }
}
