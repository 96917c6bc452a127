//! Signatures presented to trust engines and the key information that accompanies them

use std::sync::Arc;

use log::debug;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::util::crypto::verify_signature_message;
use crate::util::error::{Error, Result};
use crate::validator::pdv_certificate::PdvCertificate;
use crate::validator::pdv_crl::PdvCrl;

/// Certificates, CRLs and key names carried with a signature
#[derive(Clone, Debug, Default)]
pub struct KeyInfo {
    /// Certificates that may include the signer's certificate and certificates useful in building
    /// a path for it, in no particular order
    pub certificates: Vec<Arc<PdvCertificate>>,
    /// CRLs that may be used when checking revocation status
    pub crls: Vec<Arc<PdvCrl>>,
    /// Names by which the signer's key is known
    pub key_names: Vec<String>,
}

/// A signature along with the signed data and the key information that was embedded with it
#[derive(Clone, Debug)]
pub struct SignedContent {
    /// Signature algorithm
    pub algorithm: AlgorithmIdentifierOwned,
    /// Signature value
    pub signature: Vec<u8>,
    /// Signed bytes
    pub data: Vec<u8>,
    /// Embedded key information
    pub key_info: KeyInfo,
}

/// A signature presented for evaluation by a [`TrustEngine`](crate::TrustEngine).
#[derive(Clone, Debug)]
pub enum SignatureInput<'a> {
    /// A signature carrying its own key information
    Embedded(&'a SignedContent),
    /// A raw signature over a range of bytes, with key information supplied separately, if at all
    Detached {
        /// Signature algorithm
        algorithm: &'a AlgorithmIdentifierOwned,
        /// Signature value
        signature: &'a [u8],
        /// Signed bytes
        data: &'a [u8],
        /// Key information accompanying the signature
        key_info: Option<&'a KeyInfo>,
    },
}

impl<'a> SignatureInput<'a> {
    /// Signature algorithm
    pub fn algorithm(&self) -> &'a AlgorithmIdentifierOwned {
        match self {
            SignatureInput::Embedded(sc) => &sc.algorithm,
            SignatureInput::Detached { algorithm, .. } => algorithm,
        }
    }

    /// Signature value
    pub fn signature(&self) -> &'a [u8] {
        match self {
            SignatureInput::Embedded(sc) => &sc.signature,
            SignatureInput::Detached { signature, .. } => signature,
        }
    }

    /// Signed bytes
    pub fn data(&self) -> &'a [u8] {
        match self {
            SignatureInput::Embedded(sc) => &sc.data,
            SignatureInput::Detached { data, .. } => data,
        }
    }

    /// Key information, if any
    pub fn key_info(&self) -> Option<&'a KeyInfo> {
        match self {
            SignatureInput::Embedded(sc) => Some(&sc.key_info),
            SignatureInput::Detached { key_info, .. } => *key_info,
        }
    }

    /// Returns true for [`SignatureInput::Detached`]
    pub fn is_detached(&self) -> bool {
        matches!(self, SignatureInput::Detached { .. })
    }

    /// Verifies the signature using the given public key.
    pub fn verify_with(&self, spki: &SubjectPublicKeyInfoOwned) -> Result<()> {
        verify_signature_message(self.data(), self.signature(), self.algorithm(), spki)
    }

    /// locate_signer returns the first certificate in the key information whose public key
    /// verifies the signature.
    ///
    /// When no certificate verifies the signature, [`Error::UnsupportedAlgorithm`] is returned if
    /// any attempt failed for want of algorithm support and [`Error::NotFound`] otherwise.
    pub fn locate_signer(&self) -> Result<Arc<PdvCertificate>> {
        let key_info = match self.key_info() {
            Some(ki) => ki,
            None => return Err(Error::NotFound),
        };
        let mut unsupported = None;
        for cert in &key_info.certificates {
            match self.verify_with(&cert.decoded_cert.tbs_certificate.subject_public_key_info) {
                Ok(()) => return Ok(cert.clone()),
                Err(Error::UnsupportedAlgorithm(oid)) => unsupported = Some(oid),
                Err(_) => debug!(
                    "Signature not verified by key from certificate issued to {}",
                    cert.subject_string()
                ),
            }
        }
        match unsupported {
            Some(oid) => Err(Error::UnsupportedAlgorithm(oid)),
            None => Err(Error::NotFound),
        }
    }
}
