//! Depth-first construction of candidate certification paths from a target certificate through a
//! pool of untrusted certificates to a trust anchor

use std::sync::Arc;

use der::asn1::ObjectIdentifier;
use log::{debug, info};

use crate::util::crypto::verify_signature_message;
use crate::util::error::*;
use crate::util::name_utils::compare_names;
use crate::validator::cert_path::CertificationPath;
use crate::validator::pdv_certificate::PdvCertificate;

/// Upper bound on the number of candidate paths returned by [`build_paths`].
pub const MAX_CANDIDATE_PATHS: usize = 16;

/// Upper bound on the number of partial paths visited by [`build_paths`] for one target.
pub const MAX_EXPLORED_NODES: usize = 1024;

/// verify_issued_by verifies the signature on `cert` using the public key from `issuer`.
pub fn verify_issued_by(cert: &PdvCertificate, issuer: &PdvCertificate) -> Result<()> {
    verify_signature_message(
        &cert.encoded_tbs,
        cert.decoded_cert.signature.raw_bytes(),
        &cert.decoded_cert.signature_algorithm,
        &issuer.decoded_cert.tbs_certificate.subject_public_key_info,
    )
}

/// Candidate paths produced by [`build_paths`].
#[derive(Clone, Debug, Default)]
pub struct CandidatePaths {
    /// Candidate certification paths, in the order they were found
    pub paths: Vec<CertificationPath>,
    /// Signature algorithm that prevented at least one name-chaining link from being checked, if
    /// any
    pub unsupported_algorithm: Option<ObjectIdentifier>,
    explored: usize,
}

/// Issuer relationships among the target (node 0) and the untrusted certificates (nodes 1..),
/// computed once so that each signature is verified at most once.
struct IssuerGraph<'a> {
    certs: Vec<&'a Arc<PdvCertificate>>,
    trust_anchors: &'a [Arc<PdvCertificate>],
    ca_issuers: Vec<Vec<usize>>,
    ta_issuers: Vec<Vec<usize>>,
    reaches_anchor: Vec<bool>,
    unsupported_algorithm: Option<ObjectIdentifier>,
}

impl<'a> IssuerGraph<'a> {
    fn new(
        target: &'a Arc<PdvCertificate>,
        untrusted: &'a [Arc<PdvCertificate>],
        trust_anchors: &'a [Arc<PdvCertificate>],
    ) -> Self {
        // trust anchors and the target are never used as intermediates, nor are duplicates
        let mut certs = vec![target];
        for ca in untrusted {
            if certs.iter().any(|c| c.encoded_cert == ca.encoded_cert)
                || trust_anchors
                    .iter()
                    .any(|ta| ta.encoded_cert == ca.encoded_cert)
            {
                continue;
            }
            certs.push(ca);
        }

        let mut graph = IssuerGraph {
            ca_issuers: vec![vec![]; certs.len()],
            ta_issuers: vec![vec![]; certs.len()],
            reaches_anchor: vec![false; certs.len()],
            certs,
            trust_anchors,
            unsupported_algorithm: None,
        };

        for i in 0..graph.certs.len() {
            for (t, ta) in trust_anchors.iter().enumerate() {
                if ta.encoded_cert != graph.certs[i].encoded_cert && graph.is_issuer(i, ta) {
                    graph.ta_issuers[i].push(t);
                }
            }
            for j in 1..graph.certs.len() {
                let candidate = graph.certs[j];
                if i != j && graph.is_issuer(i, candidate) {
                    graph.ca_issuers[i].push(j);
                }
            }
        }

        // fixed point over the issuer edges
        let mut changed = true;
        while changed {
            changed = false;
            for i in 0..graph.certs.len() {
                if graph.reaches_anchor[i] {
                    continue;
                }
                if !graph.ta_issuers[i].is_empty()
                    || graph.ca_issuers[i].iter().any(|j| graph.reaches_anchor[*j])
                {
                    graph.reaches_anchor[i] = true;
                    changed = true;
                }
            }
        }
        graph
    }

    // name chaining plus signature verification
    fn is_issuer(&mut self, index: usize, candidate: &PdvCertificate) -> bool {
        let cert = self.certs[index];
        if !compare_names(cert.issuer(), candidate.subject()) {
            return false;
        }
        match verify_issued_by(cert, candidate) {
            Ok(()) => true,
            Err(Error::UnsupportedAlgorithm(oid)) => {
                debug!(
                    "Unsupported algorithm {} on certificate issued to {}",
                    oid,
                    cert.subject_string()
                );
                self.unsupported_algorithm = Some(oid);
                false
            }
            Err(_) => false,
        }
    }
}

struct PathSearch<'g, 'a> {
    graph: &'g IssuerGraph<'a>,
    max_depth: usize,
    explored: usize,
    paths: Vec<CertificationPath>,
}

impl PathSearch<'_, '_> {
    fn done(&self) -> bool {
        self.paths.len() >= MAX_CANDIDATE_PATHS || self.explored >= MAX_EXPLORED_NODES
    }

    // chain holds the nodes above the target collected so far, nearest to the target first
    fn extend(&mut self, chain: &mut Vec<usize>) {
        if self.done() {
            return;
        }
        self.explored += 1;
        let graph = self.graph;
        let current = chain.last().copied().unwrap_or(0);

        for t in &graph.ta_issuers[current] {
            let intermediates = chain
                .iter()
                .rev()
                .map(|i| graph.certs[*i].clone())
                .collect();
            self.paths.push(CertificationPath::new(
                graph.trust_anchors[*t].clone(),
                intermediates,
                graph.certs[0].clone(),
            ));
            if self.done() {
                return;
            }
        }

        if chain.len() >= self.max_depth {
            return;
        }

        for next in &graph.ca_issuers[current] {
            if !graph.reaches_anchor[*next] || chain.contains(next) {
                continue;
            }
            chain.push(*next);
            self.extend(chain);
            chain.pop();
            if self.done() {
                return;
            }
        }
    }
}

/// `build_paths` returns candidate certification paths for `target`, each terminating at one of
/// `trust_anchors`, with at most `max_depth` intermediate CA certificates drawn from `untrusted`.
///
/// Every link in a returned path has been checked for name chaining and signature validity. No
/// certificate appears twice in a path and trust anchors are never used as intermediates. When
/// the target itself is a trust anchor, a path with no intermediates and the target as trust
/// anchor is returned first.
///
/// Each issuer relationship is checked once per call. Certificates that cannot lead to a trust
/// anchor are not explored, and the search stops after [`MAX_CANDIDATE_PATHS`] paths are found or
/// [`MAX_EXPLORED_NODES`] partial paths are visited. When a link could not be checked because its
/// signature algorithm is not supported, the algorithm is reported in
/// [`CandidatePaths::unsupported_algorithm`].
pub fn build_paths(
    target: &Arc<PdvCertificate>,
    untrusted: &[Arc<PdvCertificate>],
    trust_anchors: &[Arc<PdvCertificate>],
    max_depth: usize,
) -> CandidatePaths {
    let mut paths = vec![];
    if let Some(ta) = trust_anchors
        .iter()
        .find(|ta| ta.encoded_cert == target.encoded_cert)
    {
        paths.push(CertificationPath::new(ta.clone(), vec![], target.clone()));
    }

    let graph = IssuerGraph::new(target, untrusted, trust_anchors);
    let mut search = PathSearch {
        graph: &graph,
        max_depth,
        explored: 0,
        paths,
    };
    if graph.reaches_anchor[0] {
        search.extend(&mut vec![]);
    }
    if search.explored >= MAX_EXPLORED_NODES {
        info!(
            "Stopped building paths for certificate issued to {} after visiting {} partial paths",
            target.subject_string(),
            search.explored
        );
    }
    debug!(
        "Found {} candidate paths for certificate issued to {}",
        search.paths.len(),
        target.subject_string()
    );
    CandidatePaths {
        paths: search.paths,
        unsupported_algorithm: graph.unsupported_algorithm,
        explored: search.explored,
    }
}
