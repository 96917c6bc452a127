//! Trust engine that consults a list of other trust engines

use std::sync::Arc;

use flagset::FlagSet;
use log::{debug, info};

use crate::engine::credential::{CredentialCriteria, CredentialResolver};
use crate::engine::signature::SignatureInput;
use crate::engine::trust_engine::{required_capability, EngineCapabilities, TrustEngine};
use crate::validator::pdv_certificate::PdvCertificate;

/// [`ChainingTrustEngine`] evaluates a chain or signature using each of its engines in the order
/// they were added, stopping at the first that succeeds.
///
/// Engines lacking the capability required by a request are skipped. After each engine fails the
/// criteria are reset to defaults, except for the requested usage, so that side effects of one
/// engine are not seen by the next.
#[derive(Default)]
pub struct ChainingTrustEngine {
    engines: Vec<(Box<dyn TrustEngine>, FlagSet<EngineCapabilities>)>,
}

impl ChainingTrustEngine {
    /// Creates an engine with no members.
    pub fn new() -> Self {
        ChainingTrustEngine::default()
    }

    /// Appends an engine. Its capabilities are captured when it is added.
    pub fn add_engine(&mut self, engine: Box<dyn TrustEngine>) {
        let caps = engine.capabilities();
        self.engines.push((engine, caps));
    }

    /// Number of member engines
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Returns true if there are no member engines.
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    fn evaluate<F>(
        &self,
        capability: EngineCapabilities,
        criteria: &mut CredentialCriteria,
        f: F,
    ) -> bool
    where
        F: Fn(&dyn TrustEngine, &mut CredentialCriteria) -> bool,
    {
        for (i, (engine, caps)) in self.engines.iter().enumerate() {
            if !caps.contains(capability) {
                debug!("Skipping trust engine {} lacking capability {:?}", i, capability);
                continue;
            }
            if f(engine.as_ref(), criteria) {
                debug!("Trust engine {} succeeded", i);
                return true;
            }
            let usage = criteria.usage;
            criteria.reset();
            criteria.usage = usage;
        }
        info!("No trust engine accepted the presented material");
        false
    }
}

impl TrustEngine for ChainingTrustEngine {
    fn capabilities(&self) -> FlagSet<EngineCapabilities> {
        self.engines
            .iter()
            .fold(FlagSet::default(), |acc, (_, caps)| acc | *caps)
    }

    fn validate_chain(
        &self,
        entity: &Arc<PdvCertificate>,
        untrusted: &[Arc<PdvCertificate>],
        resolver: &dyn CredentialResolver,
        criteria: &mut CredentialCriteria,
    ) -> bool {
        self.evaluate(EngineCapabilities::Chain, criteria, |engine, c| {
            engine.validate_chain(entity, untrusted, resolver, c)
        })
    }

    fn validate_signature(
        &self,
        input: &SignatureInput<'_>,
        resolver: &dyn CredentialResolver,
        criteria: &mut CredentialCriteria,
    ) -> bool {
        self.evaluate(required_capability(input), criteria, |engine, c| {
            engine.validate_signature(input, resolver, c)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::credential::{StaticCredentialResolver, UsageTypes};
    use crate::engine::signature::KeyInfo;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // records what it observed, pollutes the criteria and returns a fixed answer
    struct RecordingEngine {
        answer: bool,
        calls: Arc<AtomicUsize>,
        saw_clean: Arc<AtomicUsize>,
        caps: FlagSet<EngineCapabilities>,
    }

    impl RecordingEngine {
        fn new(answer: bool) -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let saw_clean = Arc::new(AtomicUsize::new(0));
            (
                RecordingEngine {
                    answer,
                    calls: calls.clone(),
                    saw_clean: saw_clean.clone(),
                    caps: EngineCapabilities::Chain.into(),
                },
                calls,
                saw_clean,
            )
        }
    }

    impl TrustEngine for RecordingEngine {
        fn capabilities(&self) -> FlagSet<EngineCapabilities> {
            self.caps
        }

        fn validate_chain(
            &self,
            _entity: &Arc<PdvCertificate>,
            _untrusted: &[Arc<PdvCertificate>],
            _resolver: &dyn CredentialResolver,
            criteria: &mut CredentialCriteria,
        ) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if criteria.key_info.is_none()
                && criteria.peer_name.is_none()
                && criteria.usage == FlagSet::from(UsageTypes::Tls)
            {
                self.saw_clean.fetch_add(1, Ordering::SeqCst);
            }
            criteria.key_info = Some(KeyInfo::default());
            criteria.peer_name = Some("polluted".to_string());
            self.answer
        }
    }

    fn entity() -> Arc<PdvCertificate> {
        let kp = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec!["ee.example.org".to_string()]).unwrap();
        let cert = params.self_signed(&kp).unwrap();
        Arc::new(PdvCertificate::from_pem_or_der(cert.der()).unwrap())
    }

    #[test]
    fn first_success_wins() {
        let (first, first_calls, _) = RecordingEngine::new(false);
        let (second, second_calls, second_clean) = RecordingEngine::new(true);
        let (third, third_calls, _) = RecordingEngine::new(true);
        let mut chain = ChainingTrustEngine::new();
        chain.add_engine(Box::new(first));
        chain.add_engine(Box::new(second));
        chain.add_engine(Box::new(third));

        let resolver = StaticCredentialResolver::default();
        let mut criteria = CredentialCriteria::for_usage(UsageTypes::Tls);
        assert!(chain.validate_chain(&entity(), &[], &resolver, &mut criteria));
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
        // the second engine did not see the first engine's side effects
        assert_eq!(second_clean.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn all_fail() {
        let (first, _, _) = RecordingEngine::new(false);
        let (second, _, _) = RecordingEngine::new(false);
        let mut chain = ChainingTrustEngine::new();
        chain.add_engine(Box::new(first));
        chain.add_engine(Box::new(second));

        let resolver = StaticCredentialResolver::default();
        let mut criteria = CredentialCriteria::for_usage(UsageTypes::Tls).with_peer_name("peer");
        assert!(!chain.validate_chain(&entity(), &[], &resolver, &mut criteria));
        assert!(criteria.peer_name.is_none());
        assert!(criteria.key_info.is_none());
        assert_eq!(criteria.usage, FlagSet::from(UsageTypes::Tls));
    }

    #[test]
    fn capabilities() {
        let mut chain = ChainingTrustEngine::new();
        assert!(chain.capabilities().is_empty());
        assert!(!chain.validate_chain(
            &entity(),
            &[],
            &StaticCredentialResolver::default(),
            &mut CredentialCriteria::default()
        ));

        let (mut recorder, calls, _) = RecordingEngine::new(true);
        recorder.caps = EngineCapabilities::Signature.into();
        chain.add_engine(Box::new(recorder));
        assert_eq!(chain.len(), 1);
        assert!(chain.capabilities().contains(EngineCapabilities::Signature));
        assert!(!chain.capabilities().contains(EngineCapabilities::Chain));
        // skipped since it cannot evaluate chains
        assert!(!chain.validate_chain(
            &entity(),
            &[],
            &StaticCredentialResolver::default(),
            &mut CredentialCriteria::default()
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
