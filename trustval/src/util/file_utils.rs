//! The file_utils module contains utility functions related to interactions with the filesystem.

use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{debug, error};
use walkdir::WalkDir;

use crate::util::error::*;
use crate::validator::pdv_certificate::PdvCertificate;
use crate::validator::pdv_crl::PdvCrl;

/// `pem_or_der` returns the DER encoding of the buffer, decoding it first if it begins with a PEM
/// encapsulation boundary.
pub fn pem_or_der(buf: &[u8]) -> Result<Vec<u8>> {
    if buf.first() == Some(&b'-') {
        match pem_rfc7468::decode_vec(buf) {
            Ok((_label, der)) => Ok(der),
            Err(_e) => Err(Error::ParseError),
        }
    } else {
        Ok(buf.to_vec())
    }
}

/// `get_file_as_byte_vec` takes a Path containing a file name and returns a vector of bytes
/// containing the contents of that file or an error.
pub fn get_file_as_byte_vec(filename: &Path) -> Result<Vec<u8>> {
    Ok(fs::read(filename)?)
}

/// `get_file_as_byte_vec_pem` reads a file and, if it is PEM encoded, returns the decoded
/// contents instead.
pub fn get_file_as_byte_vec_pem(filename: &Path) -> Result<Vec<u8>> {
    pem_or_der(&get_file_as_byte_vec(filename)?)
}

fn folder_files(folder: &str, file_exts: &[&str]) -> Result<Vec<std::path::PathBuf>> {
    if !Path::is_dir(Path::new(folder)) {
        error!("{} does not exist or is not a directory", folder);
        return Err(Error::NotFound);
    }

    let mut retval = vec![];
    for entry in WalkDir::new(folder).sort_by_file_name() {
        let e = match entry {
            Ok(e) => e,
            Err(e) => {
                error!("Failed to read entry while walking {}: {}", folder, e);
                continue;
            }
        };
        if e.file_type().is_dir() {
            continue;
        }
        if let Some(ext) = e.path().extension().and_then(OsStr::to_str) {
            if file_exts.contains(&ext.to_lowercase().as_str()) {
                retval.push(e.path().to_path_buf());
            }
        }
    }
    Ok(retval)
}

/// `cert_folder_to_vec` recursively traverses a folder and returns the certificates read from
/// files with .der, .crt, .cer or .pem extensions. Files that cannot be parsed are logged and
/// skipped.
pub fn cert_folder_to_vec(certs_dir: &str) -> Result<Vec<Arc<PdvCertificate>>> {
    let mut retval = vec![];
    for path in folder_files(certs_dir, &["der", "crt", "cer", "pem"])? {
        let buffer = match get_file_as_byte_vec(&path) {
            Ok(b) => b,
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                continue;
            }
        };
        match PdvCertificate::from_pem_or_der(&buffer) {
            Ok(cert) => {
                debug!("Read certificate for {} from {}", cert.subject_string(), path.display());
                retval.push(Arc::new(cert));
            }
            Err(e) => error!("Failed to parse certificate from {}: {}", path.display(), e),
        }
    }
    Ok(retval)
}

/// `crl_folder_to_vec` recursively traverses a folder and returns the CRLs read from files with
/// .crl, .der or .pem extensions. Files that cannot be parsed are logged and skipped.
pub fn crl_folder_to_vec(crls_dir: &str) -> Result<Vec<Arc<PdvCrl>>> {
    let mut retval = vec![];
    for path in folder_files(crls_dir, &["crl", "der", "pem"])? {
        let buffer = match get_file_as_byte_vec(&path) {
            Ok(b) => b,
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                continue;
            }
        };
        match PdvCrl::from_pem_or_der(&buffer) {
            Ok(crl) => {
                debug!("Read CRL from {} from {}", crl.issuer_string(), path.display());
                retval.push(Arc::new(crl));
            }
            Err(e) => error!("Failed to parse CRL from {}: {}", path.display(), e),
        }
    }
    Ok(retval)
}
