//! Retrieval of CRLs from distribution points

use crate::util::error::Result;

#[cfg(feature = "remote")]
use std::time::Duration;

#[cfg(feature = "remote")]
use log::debug;

#[cfg(feature = "remote")]
use crate::util::error::Error;

/// [`CrlFetcher`] retrieves the bytes of a CRL from a URI. Implementations block until the
/// transfer completes or fails; any timeout is the implementation's concern.
pub trait CrlFetcher: Send + Sync {
    /// Retrieves the resource at `uri`.
    fn fetch(&self, uri: &str) -> Result<Vec<u8>>;
}

/// [`HttpCrlFetcher`] retrieves CRLs from HTTP and HTTPS distribution points.
#[cfg(feature = "remote")]
pub struct HttpCrlFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "remote")]
impl HttpCrlFetcher {
    /// Prepares a fetcher whose requests fail after `timeout_in_secs` seconds.
    pub fn new(timeout_in_secs: u64) -> Result<Self> {
        match reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_in_secs))
            .build()
        {
            Ok(client) => Ok(HttpCrlFetcher { client }),
            Err(e) => {
                debug!("Failed to prepare HTTP client to retrieve CRLs: {}", e);
                Err(Error::NetworkError)
            }
        }
    }
}

#[cfg(feature = "remote")]
impl CrlFetcher for HttpCrlFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        let lc = uri.to_lowercase();
        if !lc.starts_with("http://") && !lc.starts_with("https://") {
            debug!("Ignored non-HTTP URI presented for CRL retrieval: {}", uri);
            return Err(Error::InvalidUriScheme);
        }

        let response = match self.client.get(uri).send() {
            Ok(response) => response,
            Err(e) => {
                debug!("Failed to fetch CRL from {}: {:?}", uri, e);
                return Err(Error::NetworkError);
            }
        };
        if !response.status().is_success() {
            debug!(
                "Failed to fetch CRL from {}: HTTP status {}",
                uri,
                response.status()
            );
            return Err(Error::NetworkError);
        }
        match response.bytes() {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(e) => {
                debug!("Failed to retrieve CRL bytes from {} with {}", uri, e);
                Err(Error::NetworkError)
            }
        }
    }
}
