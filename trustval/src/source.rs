//! Sources of revocation information: the named lock registry, CRL fetchers and the file system
//! backed CRL cache

pub mod crl_cache;
pub mod crl_fetcher;
pub mod named_locks;

pub use crate::source::{crl_cache::*, crl_fetcher::*, named_locks::*};
