//! Policy tree-based certificate policy processing

use std::collections::BTreeSet;

use const_oid::db::rfc5280::ANY_POLICY;
use const_oid::db::rfc5912::{
    ID_CE_CERTIFICATE_POLICIES, ID_CE_INHIBIT_ANY_POLICY, ID_CE_POLICY_CONSTRAINTS,
    ID_CE_POLICY_MAPPINGS,
};
use der::asn1::ObjectIdentifier;
use log::debug;

use crate::util::error::*;
use crate::util::logging::log_error_for_subject;
use crate::validator::cert_path::CertificationPath;
use crate::validator::pdv_certificate::{PdvCertificate, PdvExtension};
use crate::validator::validation_params::ValidationParams;

/// Node in the valid_policy_tree. Nodes live in a [`PolicyPool`] and refer to each other by index.
#[derive(Clone, Debug)]
struct PolicyProcessingData {
    valid_policy: ObjectIdentifier,
    expected_policy_set: BTreeSet<ObjectIdentifier>,
    depth: usize,
    parent: Option<usize>,
    children: Vec<usize>,
    deleted: bool,
}

/// Arena owning the nodes of the valid_policy_tree.
#[derive(Default)]
struct PolicyPool {
    nodes: Vec<PolicyProcessingData>,
}

impl PolicyPool {
    fn add_node(
        &mut self,
        valid_policy: ObjectIdentifier,
        expected_policy_set: BTreeSet<ObjectIdentifier>,
        depth: usize,
        parent: Option<usize>,
    ) -> usize {
        let index = self.nodes.len();
        self.nodes.push(PolicyProcessingData {
            valid_policy,
            expected_policy_set,
            depth,
            parent,
            children: vec![],
            deleted: false,
        });
        if let Some(p) = parent {
            self.nodes[p].children.push(index);
        }
        index
    }

    fn row(&self, depth: usize) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.deleted && n.depth == depth)
            .map(|(i, _)| i)
            .collect()
    }

    fn live_children(&self, index: usize) -> Vec<usize> {
        self.nodes[index]
            .children
            .iter()
            .copied()
            .filter(|c| !self.nodes[*c].deleted)
            .collect()
    }

    fn delete_subtree(&mut self, index: usize) {
        let children = self.nodes[index].children.clone();
        for c in children {
            self.delete_subtree(c);
        }
        self.nodes[index].deleted = true;
    }

    // deletes childless nodes at depths below `depth`, deepest first; returns false if the root
    // was deleted
    fn prune(&mut self, depth: usize) -> bool {
        for d in (0..depth).rev() {
            for index in self.row(d) {
                if self.live_children(index).is_empty() {
                    self.nodes[index].deleted = true;
                }
            }
        }
        !self.nodes[0].deleted
    }
}

fn get_policy_constraints(cert: &PdvCertificate) -> (Option<u32>, Option<u32>) {
    match cert.get_extension(&ID_CE_POLICY_CONSTRAINTS) {
        Some(PdvExtension::PolicyConstraints(pc)) => {
            (pc.require_explicit_policy, pc.inhibit_policy_mapping)
        }
        _ => (None, None),
    }
}

/// `check_certificate_policies` implements certificate policy processing per RFC 5280 sections
/// 6.1.2 through 6.1.5, using the certificate policies, policy mappings, policy constraints and
/// inhibit anyPolicy extensions.
///
/// The initial policy set is `params.policy_oids` (or anyPolicy when empty), initial-explicit-policy
/// is set when that set is not empty, and initial-policy-mapping-inhibit and initial-any-policy-inhibit
/// come from the corresponding flags. Policy information in the trust anchor is not processed.
pub fn check_certificate_policies(
    path: &CertificationPath,
    params: &ValidationParams,
) -> Result<()> {
    let certs = path.certificates();
    let n = certs.len();

    let initial_policy_set: BTreeSet<ObjectIdentifier> = if params.policy_oids.is_empty() {
        BTreeSet::from([ANY_POLICY])
    } else {
        params.policy_oids.clone()
    };

    // Initialize state variables (RFC 5280 6.1.2 a, d, e and f)
    let mut explicit_policy = if params.explicit_policy_required() {
        0
    } else {
        n + 1
    };
    let mut inhibit_any_policy = if params.any_policy_inhibited { 0 } else { n + 1 };
    let mut policy_mapping = if params.policy_mapping_inhibited {
        0
    } else {
        n + 1
    };

    let mut pool = PolicyPool::default();
    pool.add_node(ANY_POLICY, BTreeSet::from([ANY_POLICY]), 0, None);
    let mut tree_is_null = false;

    for (pos, cert) in certs.iter().enumerate() {
        let i = pos + 1;
        let is_target = i == n;

        let policies = match cert.get_extension(&ID_CE_CERTIFICATE_POLICIES) {
            Some(PdvExtension::CertificatePolicies(cp)) => Some(cp),
            _ => None,
        };

        if let (Some(policies), false) = (policies, tree_is_null) {
            // 6.1.3 (d)(1): for each policy P not equal to anyPolicy
            let mut has_any_policy = false;
            for pi in &policies.0 {
                let p_oid = pi.policy_identifier;
                if p_oid == ANY_POLICY {
                    has_any_policy = true;
                    continue;
                }
                let prev = pool.row(i - 1);
                let matches: Vec<usize> = prev
                    .iter()
                    .copied()
                    .filter(|p| pool.nodes[*p].expected_policy_set.contains(&p_oid))
                    .collect();
                if !matches.is_empty() {
                    // (i)
                    for parent in matches {
                        pool.add_node(p_oid, BTreeSet::from([p_oid]), i, Some(parent));
                    }
                } else {
                    // (ii)
                    for parent in prev {
                        if pool.nodes[parent].valid_policy == ANY_POLICY {
                            pool.add_node(p_oid, BTreeSet::from([p_oid]), i, Some(parent));
                        }
                    }
                }
            }

            // 6.1.3 (d)(2)
            if has_any_policy
                && (inhibit_any_policy > 0 || (!is_target && cert.is_self_issued()))
            {
                for parent in pool.row(i - 1) {
                    let existing: BTreeSet<ObjectIdentifier> = pool
                        .live_children(parent)
                        .iter()
                        .map(|c| pool.nodes[*c].valid_policy)
                        .collect();
                    let expected = pool.nodes[parent].expected_policy_set.clone();
                    for p in expected {
                        if !existing.contains(&p) {
                            pool.add_node(p, BTreeSet::from([p]), i, Some(parent));
                        }
                    }
                }
            }

            // 6.1.3 (d)(3)
            if !pool.prune(i) || pool.row(i).is_empty() {
                tree_is_null = true;
            }
        } else {
            // 6.1.3 (e)
            tree_is_null = true;
        }

        // 6.1.3 (f)
        if explicit_policy == 0 && tree_is_null {
            log_error_for_subject(
                &cert.decoded_cert,
                "valid_policy_tree is NULL while explicit policy is required",
            );
            return Err(Error::PathValidation(PathValidationStatus::NullPolicySet));
        }

        if is_target {
            break;
        }

        // 6.1.4 (a) and (b)
        if let Some(PdvExtension::PolicyMappings(mappings)) =
            cert.get_extension(&ID_CE_POLICY_MAPPINGS)
        {
            for m in &mappings.0 {
                if m.issuer_domain_policy == ANY_POLICY || m.subject_domain_policy == ANY_POLICY {
                    log_error_for_subject(&cert.decoded_cert, "policy mapping to or from anyPolicy");
                    return Err(Error::PathValidation(PathValidationStatus::NullPolicySet));
                }
            }

            if !tree_is_null {
                let issuer_policies: BTreeSet<ObjectIdentifier> =
                    mappings.0.iter().map(|m| m.issuer_domain_policy).collect();
                for idp in issuer_policies {
                    let mapped: BTreeSet<ObjectIdentifier> = mappings
                        .0
                        .iter()
                        .filter(|m| m.issuer_domain_policy == idp)
                        .map(|m| m.subject_domain_policy)
                        .collect();
                    let row = pool.row(i);
                    let with_idp: Vec<usize> = row
                        .iter()
                        .copied()
                        .filter(|n| pool.nodes[*n].valid_policy == idp)
                        .collect();

                    if policy_mapping > 0 {
                        // 6.1.4 (b)(1)
                        if !with_idp.is_empty() {
                            for node in with_idp {
                                pool.nodes[node].expected_policy_set = mapped.clone();
                            }
                        } else if let Some(any_node) = row
                            .iter()
                            .copied()
                            .find(|n| pool.nodes[*n].valid_policy == ANY_POLICY)
                        {
                            let parent = pool.nodes[any_node].parent;
                            pool.add_node(idp, mapped.clone(), i, parent);
                        }
                    } else {
                        // 6.1.4 (b)(2)
                        for node in with_idp {
                            pool.delete_subtree(node);
                        }
                        if !pool.prune(i) {
                            tree_is_null = true;
                        }
                    }
                }
            }
        }

        // 6.1.4 (h)
        if !cert.is_self_issued() {
            explicit_policy = explicit_policy.saturating_sub(1);
            policy_mapping = policy_mapping.saturating_sub(1);
            inhibit_any_policy = inhibit_any_policy.saturating_sub(1);
        }

        // 6.1.4 (i)
        let (require_explicit, inhibit_mapping) = get_policy_constraints(cert);
        if let Some(r) = require_explicit {
            explicit_policy = explicit_policy.min(r as usize);
        }
        if let Some(m) = inhibit_mapping {
            policy_mapping = policy_mapping.min(m as usize);
        }

        // 6.1.4 (j)
        if let Some(PdvExtension::InhibitAnyPolicy(iap)) =
            cert.get_extension(&ID_CE_INHIBIT_ANY_POLICY)
        {
            inhibit_any_policy = inhibit_any_policy.min(iap.0 as usize);
        }
    }

    // 6.1.5 (a) and (b)
    explicit_policy = explicit_policy.saturating_sub(1);
    if let Some(target) = certs.last() {
        if let (Some(0), _) = get_policy_constraints(target) {
            explicit_policy = 0;
        }
    }

    // 6.1.5 (g)
    if !tree_is_null && !initial_policy_set.contains(&ANY_POLICY) {
        // (ii) nodes whose parent is anyPolicy and whose policy is not acceptable are removed
        let mut valid_policy_node_set = vec![];
        for (index, node) in pool.nodes.iter().enumerate() {
            if node.deleted {
                continue;
            }
            if let Some(p) = node.parent {
                if pool.nodes[p].valid_policy == ANY_POLICY {
                    valid_policy_node_set.push(index);
                }
            }
        }
        let mut present = BTreeSet::new();
        for index in valid_policy_node_set {
            let vp = pool.nodes[index].valid_policy;
            if vp != ANY_POLICY && !initial_policy_set.contains(&vp) {
                pool.delete_subtree(index);
            } else {
                present.insert(vp);
            }
        }

        // (iii) an anyPolicy leaf is replaced by the acceptable policies not already present
        if let Some(any_leaf) = pool
            .row(n)
            .into_iter()
            .find(|l| pool.nodes[*l].valid_policy == ANY_POLICY)
        {
            let parent = pool.nodes[any_leaf].parent;
            for p in &initial_policy_set {
                if !present.contains(p) {
                    pool.add_node(*p, BTreeSet::from([*p]), n, parent);
                }
            }
            pool.nodes[any_leaf].deleted = true;
        }

        // (iv)
        if !pool.prune(n) || pool.row(n).is_empty() {
            tree_is_null = true;
        }
    }

    if explicit_policy == 0 && tree_is_null {
        log_error_for_subject(
            &path.target.decoded_cert,
            "no acceptable policy remains after policy processing",
        );
        return Err(Error::PathValidation(PathValidationStatus::NullPolicySet));
    }

    debug!(
        "Completed policy processing for certificate issued to {}",
        path.target.subject_string()
    );
    Ok(())
}
