//! Wrapper around a decoded CRL that retains the encoding and an index of revoked serial numbers

use std::collections::BTreeSet;

use der::{Decode, Encode};
use x509_cert::crl::CertificateList;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;

use crate::util::error::*;
use crate::util::file_utils::pem_or_der;
use crate::util::name_utils::name_to_string;
use crate::util::time_of_interest::{time_to_unix_secs, TimeOfInterest};

/// [`PdvCrl`] aggregates a binary, DER-encoded CRL, the decoded CRL and the set of revoked serial
/// numbers.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PdvCrl {
    /// Binary, encoded CertificateList object
    pub encoded_crl: Vec<u8>,
    /// Decoded CertificateList object
    pub decoded_crl: CertificateList,
    /// Binary, encoded TBSCertList
    pub encoded_tbs: Vec<u8>,
    revoked_serials: BTreeSet<Vec<u8>>,
}

impl TryFrom<&[u8]> for PdvCrl {
    type Error = Error;

    fn try_from(enc_crl: &[u8]) -> Result<Self> {
        let crl = CertificateList::from_der(enc_crl)?;
        let encoded_tbs = crl.tbs_cert_list.to_der()?;
        let revoked_serials = match &crl.tbs_cert_list.revoked_certificates {
            Some(rcs) => rcs
                .iter()
                .map(|rc| rc.serial_number.as_bytes().to_vec())
                .collect(),
            None => BTreeSet::new(),
        };
        Ok(PdvCrl {
            encoded_crl: enc_crl.to_vec(),
            decoded_crl: crl,
            encoded_tbs,
            revoked_serials,
        })
    }
}

impl PdvCrl {
    /// Parses a CRL that may be either binary DER or PEM encoded.
    pub fn from_pem_or_der(buf: &[u8]) -> Result<Self> {
        let der = pem_or_der(buf)?;
        PdvCrl::try_from(der.as_slice())
    }

    /// Issuer name
    pub fn issuer(&self) -> &Name {
        &self.decoded_crl.tbs_cert_list.issuer
    }

    /// RFC 4514 rendering of the issuer name, for logging
    pub fn issuer_string(&self) -> String {
        name_to_string(self.issuer())
    }

    /// thisUpdate as seconds since the Unix epoch
    pub fn this_update(&self) -> u64 {
        time_to_unix_secs(&self.decoded_crl.tbs_cert_list.this_update)
    }

    /// nextUpdate as seconds since the Unix epoch, if present
    pub fn next_update(&self) -> Option<u64> {
        self.decoded_crl
            .tbs_cert_list
            .next_update
            .as_ref()
            .map(time_to_unix_secs)
    }

    /// is_expired returns true when nextUpdate is present and not after the time of interest.
    pub fn is_expired(&self, toi: TimeOfInterest) -> bool {
        match self.next_update() {
            Some(nu) => nu <= toi.as_unix_secs(),
            None => false,
        }
    }

    /// is_revoked returns true if the serial number appears in the list of revoked certificates.
    pub fn is_revoked(&self, serial: &SerialNumber) -> bool {
        self.revoked_serials.contains(serial.as_bytes())
    }

    /// Number of entries in the list of revoked certificates
    pub fn revoked_count(&self) -> usize {
        self.revoked_serials.len()
    }
}
