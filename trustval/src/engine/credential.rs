//! Credentials, the criteria used to select them and the resolvers that supply them

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use der::asn1::ObjectIdentifier;
use der::Encode;
use flagset::{flags, FlagSet};
use log::error;
use spki::SubjectPublicKeyInfoOwned;

use crate::engine::signature::KeyInfo;
use crate::util::crypto::get_key_size;
use crate::util::error::{Error, Result};
use crate::validator::pdv_certificate::PdvCertificate;
use crate::validator::pdv_crl::PdvCrl;

flags! {
    /// Purposes for which a credential may be used
    pub enum UsageTypes: u8 {
        /// Verification of signatures on messages
        Signing = 0x01,
        /// Authentication of TLS peers
        Tls = 0x02,
        /// Encryption of keys or content
        Encryption = 0x04,
    }
}

/// A [`Credential`] is a unit of trust material published by a [`CredentialResolver`]: a trust
/// anchor with its CRLs, a peer's certificate, or a bare public key, along with the names by which
/// the key is known.
#[derive(Clone, Debug, Default)]
pub struct Credential {
    /// Certificates. When the credential represents a trust anchor or a peer, the first
    /// certificate is that of the anchor or peer.
    pub certificates: Vec<Arc<PdvCertificate>>,
    /// CRLs associated with the credential
    pub crls: Vec<Arc<PdvCrl>>,
    /// Public key, for credentials that are not certificate-based
    pub public_key: Option<SubjectPublicKeyInfoOwned>,
    /// Names by which the key is known
    pub key_names: Vec<String>,
    /// Purposes the credential serves. Empty means unrestricted.
    pub usage: FlagSet<UsageTypes>,
}

impl Credential {
    /// Creates a credential from one or more certificates.
    pub fn from_certificates(certificates: Vec<Arc<PdvCertificate>>) -> Self {
        Credential {
            certificates,
            ..Default::default()
        }
    }

    /// Creates a credential from a bare public key.
    pub fn from_public_key(spki: SubjectPublicKeyInfoOwned) -> Self {
        Credential {
            public_key: Some(spki),
            ..Default::default()
        }
    }

    /// Adds CRLs to the credential.
    pub fn with_crls(mut self, crls: Vec<Arc<PdvCrl>>) -> Self {
        self.crls.extend(crls);
        self
    }

    /// Adds key names to the credential.
    pub fn with_key_names(mut self, names: &[&str]) -> Self {
        self.key_names.extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Restricts the credential to the given usage.
    pub fn with_usage(mut self, usage: impl Into<FlagSet<UsageTypes>>) -> Self {
        self.usage = usage.into();
        self
    }

    /// The explicit public key, if present, otherwise the key from the first certificate
    pub fn spki(&self) -> Option<&SubjectPublicKeyInfoOwned> {
        match &self.public_key {
            Some(spki) => Some(spki),
            None => self
                .certificates
                .first()
                .map(|c| &c.decoded_cert.tbs_certificate.subject_public_key_info),
        }
    }

    /// DER encoding of the key returned by [`Credential::spki`]
    pub fn public_key_der(&self) -> Option<Vec<u8>> {
        match self.spki()?.to_der() {
            Ok(enc) => Some(enc),
            Err(e) => {
                error!("Failed to encode public key from credential: {}", e);
                None
            }
        }
    }

    /// Public key algorithm
    pub fn key_algorithm(&self) -> Option<ObjectIdentifier> {
        self.spki().map(|spki| spki.algorithm.oid)
    }

    /// Public key size in bits, where it can be determined
    pub fn key_size(&self) -> Option<usize> {
        self.spki().and_then(get_key_size)
    }
}

/// Conditions a [`Credential`] must satisfy to be returned by a resolver, along with information
/// about the peer being evaluated.
///
/// Trust engines may record information in the criteria as a side effect of evaluation, e.g., the
/// key information extracted from a signature.
#[derive(Clone, Debug, Default)]
pub struct CredentialCriteria {
    /// Required usage. Empty matches any credential.
    pub usage: FlagSet<UsageTypes>,
    /// Name of the peer being authenticated
    pub peer_name: Option<String>,
    /// Required public key algorithm
    pub key_algorithm: Option<ObjectIdentifier>,
    /// Minimum key size in bits
    pub min_key_size: Option<usize>,
    /// Maximum key size in bits
    pub max_key_size: Option<usize>,
    /// When not empty, a credential must be known by at least one of these names
    pub key_names: BTreeSet<String>,
    /// Key information extracted from a signature under evaluation
    pub key_info: Option<KeyInfo>,
}

impl CredentialCriteria {
    /// Creates criteria requiring the given usage.
    pub fn for_usage(usage: impl Into<FlagSet<UsageTypes>>) -> Self {
        CredentialCriteria {
            usage: usage.into(),
            ..Default::default()
        }
    }

    /// Sets the peer name.
    pub fn with_peer_name(mut self, peer_name: &str) -> Self {
        self.peer_name = Some(peer_name.to_string());
        self
    }

    /// matches returns true if `credential` satisfies these criteria.
    ///
    /// Credentials with no usage restriction match any usage. A peer name is only compared against
    /// credentials that carry key names. Key algorithm and size are only compared when they can be
    /// determined for the credential.
    pub fn matches(&self, credential: &Credential) -> bool {
        if !self.usage.is_empty()
            && !credential.usage.is_empty()
            && (self.usage & credential.usage).is_empty()
        {
            return false;
        }

        if let Some(peer_name) = &self.peer_name {
            if !credential.key_names.is_empty()
                && !credential
                    .key_names
                    .iter()
                    .any(|n| n.eq_ignore_ascii_case(peer_name))
            {
                return false;
            }
        }

        if !self.key_names.is_empty()
            && !credential.key_names.iter().any(|n| {
                self.key_names
                    .iter()
                    .any(|kn| kn.eq_ignore_ascii_case(n.as_str()))
            })
        {
            return false;
        }

        if let (Some(required), Some(actual)) = (self.key_algorithm, credential.key_algorithm()) {
            if required != actual {
                return false;
            }
        }

        if self.min_key_size.is_some() || self.max_key_size.is_some() {
            if let Some(size) = credential.key_size() {
                if self.min_key_size.map_or(false, |min| size < min)
                    || self.max_key_size.map_or(false, |max| size > max)
                {
                    return false;
                }
            }
        }
        true
    }

    /// Restores default values for every field.
    pub fn reset(&mut self) {
        *self = CredentialCriteria::default();
    }
}

/// Access to a resolver's credentials while its lock is held
pub trait LockedResolver {
    /// Returns the credentials that match `criteria`, in the order they were published.
    fn resolve(&self, criteria: &CredentialCriteria) -> Vec<Credential>;
}

/// A source of credentials whose contents may change over time. Callers hold the lock, via the
/// guard returned by [`CredentialResolver::lock`], around calls to
/// [`LockedResolver::resolve`] and around use of anything derived from the results.
pub trait CredentialResolver: Send + Sync {
    /// Acquires the resolver's lock.
    fn lock(&self) -> Result<Box<dyn LockedResolver + '_>>;
}

/// [`StaticCredentialResolver`] publishes a list of credentials supplied by the application.
#[derive(Default)]
pub struct StaticCredentialResolver {
    credentials: RwLock<Vec<Credential>>,
}

impl StaticCredentialResolver {
    /// Creates a resolver publishing `credentials`.
    pub fn new(credentials: Vec<Credential>) -> Self {
        StaticCredentialResolver {
            credentials: RwLock::new(credentials),
        }
    }

    /// Publishes an additional credential. Blocks while any guard returned by `lock` is alive.
    pub fn add(&self, credential: Credential) -> Result<()> {
        match self.credentials.write() {
            Ok(mut g) => {
                g.push(credential);
                Ok(())
            }
            Err(_) => Err(Error::Unrecognized),
        }
    }

    /// Replaces all published credentials.
    pub fn replace(&self, credentials: Vec<Credential>) -> Result<()> {
        match self.credentials.write() {
            Ok(mut g) => {
                *g = credentials;
                Ok(())
            }
            Err(_) => Err(Error::Unrecognized),
        }
    }
}

struct StaticResolverGuard<'a> {
    credentials: RwLockReadGuard<'a, Vec<Credential>>,
}

impl LockedResolver for StaticResolverGuard<'_> {
    fn resolve(&self, criteria: &CredentialCriteria) -> Vec<Credential> {
        self.credentials
            .iter()
            .filter(|c| criteria.matches(c))
            .cloned()
            .collect()
    }
}

impl CredentialResolver for StaticCredentialResolver {
    fn lock(&self) -> Result<Box<dyn LockedResolver + '_>> {
        match self.credentials.read() {
            Ok(credentials) => Ok(Box::new(StaticResolverGuard { credentials })),
            Err(_) => {
                error!("Credential resolver lock is poisoned");
                Err(Error::Unrecognized)
            }
        }
    }
}
