//! Provides structure that represents a certification path including target, optional intermediate
//! CAs and trust anchor.

use std::sync::Arc;

use crate::validator::pdv_certificate::PdvCertificate;

/// `CertificationPath` is used to represent the trust anchor, intermediate CA certificates and
/// target certificate that comprise a certification path.
#[derive(Clone, Debug)]
#[readonly::make]
pub struct CertificationPath {
    /// `target` contains the target certificate for the certification path
    pub target: Arc<PdvCertificate>,
    /// `intermediates` contains zero or more intermediate CA certificates, beginning with the
    /// certificate that was issued by `trust_anchor` and proceeding in order to the certificate
    /// that issued the target, i.e., `intermediates[0]` can be used to verify `intermediates[1]`
    /// and `intermediates[intermediates.len() - 1]` can be used to verify `target`.
    pub intermediates: Vec<Arc<PdvCertificate>>,
    /// `trust_anchor` contains the trust anchor for the certification path
    pub trust_anchor: Arc<PdvCertificate>,
}

impl CertificationPath {
    /// instantiates a new CertificationPath
    pub fn new(
        trust_anchor: Arc<PdvCertificate>,
        intermediates: Vec<Arc<PdvCertificate>>,
        target: Arc<PdvCertificate>,
    ) -> CertificationPath {
        CertificationPath {
            target,
            intermediates,
            trust_anchor,
        }
    }

    /// Number of intermediate CA certificates, i.e., excluding the target and the trust anchor.
    pub fn intermediate_count(&self) -> usize {
        self.intermediates.len()
    }

    /// Certificates below the trust anchor, in order from the one issued by the trust anchor to
    /// the target. When the target is itself a trust anchor, the result is empty.
    pub fn certificates(&self) -> Vec<&Arc<PdvCertificate>> {
        if self.target_is_trust_anchor() {
            return vec![];
        }
        let mut retval: Vec<&Arc<PdvCertificate>> = self.intermediates.iter().collect();
        retval.push(&self.target);
        retval
    }

    /// Returns the certificate that issued the certificate at `index` in the list returned by
    /// [`CertificationPath::certificates`].
    pub fn issuer_of(&self, index: usize) -> &Arc<PdvCertificate> {
        if index == 0 {
            &self.trust_anchor
        } else {
            &self.intermediates[index - 1]
        }
    }

    /// Returns true when the target certificate was found among the trust anchors.
    pub fn target_is_trust_anchor(&self) -> bool {
        self.intermediates.is_empty() && self.target.encoded_cert == self.trust_anchor.encoded_cert
    }
}
