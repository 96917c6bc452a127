//! Registry of named reader/writer locks shared by cooperating components

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::util::error::{Error, Result};

/// [`NamedLocks`] hands out reader/writer locks keyed by name. Every request for a given name
/// returns the same lock, so independent components (e.g., several CRL cache instances sharing a
/// folder) can synchronize access to a resource by agreeing on its name.
///
/// A registry is constructed by the application and passed to the components that need it.
#[derive(Default)]
pub struct NamedLocks {
    locks: Mutex<BTreeMap<String, Arc<RwLock<()>>>>,
}

impl NamedLocks {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock associated with `name`, creating it on first use.
    pub fn get(&self, name: &str) -> Result<Arc<RwLock<()>>> {
        let mut locks = match self.locks.lock() {
            Ok(g) => g,
            Err(_) => return Err(Error::Unrecognized),
        };
        Ok(locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone())
    }

    /// Number of distinct names requested so far
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Returns true if no lock has been requested yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[test]
fn named_locks_test() {
    let registry = NamedLocks::new();
    assert!(registry.is_empty());
    let a1 = registry.get("crl-cache").unwrap();
    let a2 = registry.get("crl-cache").unwrap();
    let b = registry.get("other").unwrap();
    assert!(Arc::ptr_eq(&a1, &a2));
    assert!(!Arc::ptr_eq(&a1, &b));
    assert_eq!(registry.len(), 2);

    let _r1 = a1.read().unwrap();
    let _r2 = a2.read().unwrap();
    assert!(a1.try_write().is_err());
    assert!(b.try_write().is_ok());
}
