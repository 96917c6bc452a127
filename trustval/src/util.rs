//! Utility functions and types used by the path validator, CRL cache and trust engines

pub mod crypto;
pub mod error;
pub mod file_utils;
pub mod logging;
pub mod name_utils;
pub mod time_of_interest;

pub use crate::util::{
    crypto::*, error::*, file_utils::*, logging::*, name_utils::*, time_of_interest::*,
};
