//! Logging support

use log::{error, info};
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::util::name_utils::name_to_string;

/// log_error_for_name logs an error message prefixed with the given subject name.
pub fn log_error_for_name(name: &Name, msg: &str) {
    error!(
        "Encountered error while processing certificate with subject {}: {}",
        name_to_string(name),
        msg
    );
}

/// log_error_for_subject logs an error message prefixed with the subject name of the given certificate.
pub fn log_error_for_subject(cert: &Certificate, msg: &str) {
    log_error_for_name(&cert.tbs_certificate.subject, msg);
}

/// log_error_for_ca logs an error message prefixed with the subject name of the given CA certificate.
pub fn log_error_for_ca(ca_cert: &Certificate, msg: &str) {
    error!(
        "Encountered error while processing CA certificate with subject {}: {}",
        name_to_string(&ca_cert.tbs_certificate.subject),
        msg
    );
}

/// log_untrusted logs the outcome of an unsuccessful validation attempt at info level.
pub fn log_untrusted(cert: &Certificate, msg: &str) {
    info!(
        "Certificate with subject {} could not be validated: {}",
        name_to_string(&cert.tbs_certificate.subject),
        msg
    );
}
