//! The interface shared by all trust engines

use std::sync::Arc;

use flagset::{flags, FlagSet};
use log::error;

use crate::engine::credential::{CredentialCriteria, CredentialResolver};
use crate::engine::signature::SignatureInput;
use crate::validator::pdv_certificate::PdvCertificate;

flags! {
    /// Entry points a trust engine implements
    pub enum EngineCapabilities: u8 {
        /// [`TrustEngine::validate_chain`]
        Chain = 0x01,
        /// [`TrustEngine::validate_signature`] with [`SignatureInput::Embedded`]
        Signature = 0x02,
        /// [`TrustEngine::validate_signature`] with [`SignatureInput::Detached`]
        DetachedSignature = 0x04,
    }
}

/// Returns the capability needed to evaluate `input`.
pub fn required_capability(input: &SignatureInput<'_>) -> EngineCapabilities {
    if input.is_detached() {
        EngineCapabilities::DetachedSignature
    } else {
        EngineCapabilities::Signature
    }
}

/// A [`TrustEngine`] decides whether a certificate chain or a signature is trustworthy relative to
/// the credentials published by a [`CredentialResolver`].
///
/// Engines report an untrusted outcome as false and log the reason; errors never cross this
/// interface. Entry points an engine does not list in [`TrustEngine::capabilities`] return false.
pub trait TrustEngine: Send + Sync {
    /// Entry points implemented by this engine
    fn capabilities(&self) -> FlagSet<EngineCapabilities>;

    /// Returns true if `entity` is trusted. `untrusted` holds any other certificates presented with
    /// `entity`.
    fn validate_chain(
        &self,
        _entity: &Arc<PdvCertificate>,
        _untrusted: &[Arc<PdvCertificate>],
        _resolver: &dyn CredentialResolver,
        _criteria: &mut CredentialCriteria,
    ) -> bool {
        error!("Trust engine does not support certificate chain validation");
        false
    }

    /// Returns true if `input` carries a valid signature by a trusted key.
    fn validate_signature(
        &self,
        _input: &SignatureInput<'_>,
        _resolver: &dyn CredentialResolver,
        _criteria: &mut CredentialCriteria,
    ) -> bool {
        error!("Trust engine does not support signature validation");
        false
    }
}

/// validate_encoded_chain parses a chain of DER or PEM encoded certificates, with the end entity
/// certificate first, and evaluates it using `engine`. Certificates that cannot be parsed cause
/// the chain to be rejected.
pub fn validate_encoded_chain(
    engine: &dyn TrustEngine,
    chain: &[Vec<u8>],
    resolver: &dyn CredentialResolver,
    criteria: &mut CredentialCriteria,
) -> bool {
    let mut parsed = vec![];
    for (i, enc) in chain.iter().enumerate() {
        match PdvCertificate::from_pem_or_der(enc) {
            Ok(cert) => parsed.push(Arc::new(cert)),
            Err(e) => {
                error!("Failed to parse certificate at position {} in chain: {}", i, e);
                return false;
            }
        }
    }
    match parsed.split_first() {
        Some((entity, rest)) => engine.validate_chain(entity, rest, resolver, criteria),
        None => {
            error!("No certificates were presented for validation");
            false
        }
    }
}
