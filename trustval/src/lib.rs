#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod engine;
pub mod revocation;
pub mod source;
pub mod util;
pub mod validator;

pub use crate::{engine::*, revocation::*, source::*, util::*, validator::*};
