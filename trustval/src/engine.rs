//! Trust engines and the credential abstractions they consume

pub mod chaining_engine;
pub mod credential;
pub mod explicit_key_engine;
pub mod pkix_engine;
pub mod signature;
pub mod trust_engine;
pub mod validation_info;

pub use crate::engine::{
    chaining_engine::*, credential::*, explicit_key_engine::*, pkix_engine::*, signature::*,
    trust_engine::*, validation_info::*,
};
