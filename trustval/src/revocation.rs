//! CRL acceptance checks and the revocation pass performed over a validated certification path

pub mod check_revocation;
pub mod crl;

pub use crate::revocation::{check_revocation::*, crl::*};
