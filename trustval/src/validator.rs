//! Certificate and CRL wrappers, validation parameters, path building and RFC 5280 path validation

pub mod cert_path;
pub mod path_builder;
pub mod path_validator;
pub mod pdv_certificate;
pub mod pdv_crl;
pub mod policy_tree;
pub mod validation_params;

pub use crate::validator::{
    cert_path::*, path_builder::*, path_validator::*, pdv_certificate::*, pdv_crl::*,
    policy_tree::*, validation_params::*,
};
