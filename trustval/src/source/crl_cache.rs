//! File system backed cache of CRLs retrieved from distribution points
//!
//! Each distribution point URI maps to one file, `<cache_dir>/<sha256(uri) as hex>.crl`, holding
//! the DER encoding of the most recent usable CRL obtained from that URI. The time of the most
//! recent retrieval attempt is recorded next to it in `<sha256(uri) as hex>.ts` as decimal seconds
//! since the Unix epoch, so that the retry backoff survives process restarts.
//!
//! Disk access is serialized using a lock from a [`NamedLocks`] registry: reads happen under the
//! read side of the lock, while writes, renames and deletions happen under the write side. The
//! lock is never held while a CRL is being fetched.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::source::crl_fetcher::CrlFetcher;
use crate::source::named_locks::NamedLocks;
use crate::util::error::*;
use crate::util::file_utils::get_file_as_byte_vec;
use crate::util::time_of_interest::TimeOfInterest;
use crate::validator::pdv_crl::PdvCrl;

/// Tunables for a [`CrlCache`]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CrlCacheSettings {
    /// Folder in which cached CRLs are stored. It is created if it does not exist.
    pub cache_dir: String,
    /// Minimum number of seconds between retrieval attempts for a given URI
    pub min_refresh_delay: u64,
    /// A CRL whose nextUpdate is fewer than this many seconds away is not fresh
    pub min_seconds_remaining: u64,
    /// A CRL with less than this percentage of its validity period remaining is not fresh
    pub min_percent_remaining: u64,
    /// Timeout, in seconds, for retrieval of a CRL by the HTTP fetcher
    pub fetch_timeout: u64,
}

impl Default for CrlCacheSettings {
    fn default() -> Self {
        CrlCacheSettings {
            cache_dir: "crl_cache".to_string(),
            min_refresh_delay: 60,
            min_seconds_remaining: 86400,
            min_percent_remaining: 10,
            fetch_timeout: 30,
        }
    }
}

/// A CRL returned by [`CrlCache::get_crl`] along with the result of the freshness test at the time
/// it was returned.
#[derive(Clone, Debug)]
pub struct CachedCrl {
    /// The CRL. Its nextUpdate, if present, had not passed when it was returned.
    pub crl: Arc<PdvCrl>,
    /// True when the CRL satisfied the freshness test
    pub fresh: bool,
}

/// cache_file_name returns the name of the file used to cache the CRL retrieved from `uri`.
pub fn cache_file_name(uri: &str) -> String {
    format!("{}.crl", hex::encode(Sha256::digest(uri.as_bytes())))
}

fn timestamp_file_name(uri: &str) -> String {
    format!("{}.ts", hex::encode(Sha256::digest(uri.as_bytes())))
}

/// is_fresh determines whether a CRL with the given thisUpdate and nextUpdate values is recent
/// enough to be used without attempting to refresh it.
///
/// A CRL is fresh when more than `min_seconds_remaining` seconds remain before nextUpdate and more
/// than `min_percent_remaining` percent of the interval between thisUpdate and nextUpdate remains.
/// When that interval is empty or negative, only the first test applies. A CRL without nextUpdate
/// is never fresh.
pub fn is_fresh(
    this_update: u64,
    next_update: Option<u64>,
    now: u64,
    settings: &CrlCacheSettings,
) -> bool {
    let next_update = match next_update {
        Some(nu) => nu,
        None => return false,
    };
    let threshold = now.saturating_add(settings.min_seconds_remaining);
    if next_update <= this_update {
        return next_update > threshold;
    }
    if threshold >= next_update {
        return false;
    }
    let remaining = (next_update - now) as u128;
    let validity = (next_update - this_update) as u128;
    remaining * 100 > validity * settings.min_percent_remaining as u128
}

/// [`CrlCache`] retrieves CRLs from distribution points on demand and retains them in a folder.
///
/// [`CrlCache::get_crl`] returns a cached CRL when one is available and fresh. Otherwise, it
/// attempts to retrieve a new CRL, unless an attempt was made for the same URI within
/// `min_refresh_delay` seconds, and falls back to the cached CRL when retrieval fails. Expired
/// CRLs are deleted when encountered and never returned.
pub struct CrlCache {
    settings: CrlCacheSettings,
    cache_dir: PathBuf,
    fetcher: Box<dyn CrlFetcher>,
    lock: Arc<RwLock<()>>,
    attempts: Mutex<BTreeMap<String, u64>>,
}

impl CrlCache {
    /// Creates a cache that stores CRLs in `settings.cache_dir` and retrieves them using `fetcher`.
    /// The folder's lock is obtained from `locks` using a name derived from the folder.
    ///
    /// Fails with [`Error::Misconfiguration`] if the folder cannot be created or the settings are
    /// out of range.
    pub fn new(
        settings: CrlCacheSettings,
        fetcher: Box<dyn CrlFetcher>,
        locks: &NamedLocks,
    ) -> Result<Self> {
        if settings.min_percent_remaining > 100 {
            return Err(Error::Misconfiguration(format!(
                "min_percent_remaining must not exceed 100, found {}",
                settings.min_percent_remaining
            )));
        }
        if settings.cache_dir.is_empty() {
            return Err(Error::Misconfiguration(
                "cache_dir must not be empty".to_string(),
            ));
        }
        let cache_dir = PathBuf::from(&settings.cache_dir);
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            return Err(Error::Misconfiguration(format!(
                "unable to use {} as CRL cache folder: {}",
                settings.cache_dir, e
            )));
        }
        if !cache_dir.is_dir() {
            return Err(Error::Misconfiguration(format!(
                "{} is not a folder",
                settings.cache_dir
            )));
        }
        let lock = locks.get(format!("crl-cache:{}", cache_dir.display()).as_str())?;
        Ok(CrlCache {
            settings,
            cache_dir,
            fetcher,
            lock,
            attempts: Mutex::new(BTreeMap::new()),
        })
    }

    /// Settings in use by this cache
    pub fn settings(&self) -> &CrlCacheSettings {
        &self.settings
    }

    /// Path of the file used to cache the CRL retrieved from `uri`
    pub fn cache_path(&self, uri: &str) -> PathBuf {
        self.cache_dir.join(cache_file_name(uri))
    }

    fn timestamp_path(&self, uri: &str) -> PathBuf {
        self.cache_dir.join(timestamp_file_name(uri))
    }

    /// get_crl returns a CRL for `uri`, retrieving one when no fresh CRL is cached and the retry
    /// backoff permits.
    pub fn get_crl(&self, uri: &str) -> Option<CachedCrl> {
        let now = TimeOfInterest::now();
        let now_secs = now.as_unix_secs();

        let mut cached = self.read_cached(uri, now);
        if let Some(crl) = &cached {
            if is_fresh(crl.this_update(), crl.next_update(), now_secs, &self.settings) {
                debug!("Using fresh cached CRL for {}", uri);
                return Some(CachedCrl {
                    crl: crl.clone(),
                    fresh: true,
                });
            }
        }

        if self.claim_attempt(uri, now_secs) {
            if let Some(crl) = self.refresh(uri, now) {
                cached = Some(crl);
            }
        } else {
            debug!(
                "Skipping retrieval of CRL from {} due to recent attempt",
                uri
            );
        }

        cached.map(|crl| {
            let fresh = is_fresh(crl.this_update(), crl.next_update(), now_secs, &self.settings);
            CachedCrl { crl, fresh }
        })
    }

    // reads the cached CRL for uri, deleting it if it has expired or cannot be parsed
    fn read_cached(&self, uri: &str, now: TimeOfInterest) -> Option<Arc<PdvCrl>> {
        let path = self.cache_path(uri);
        {
            let _guard = match self.lock.read() {
                Ok(g) => g,
                Err(_) => {
                    error!("CRL cache lock is poisoned");
                    return None;
                }
            };
            if !path.exists() {
                return None;
            }
            match get_file_as_byte_vec(&path).and_then(|buf| PdvCrl::from_pem_or_der(&buf)) {
                Ok(crl) if !crl.is_expired(now) => return Some(Arc::new(crl)),
                Ok(_) => info!("Deleting expired CRL cached for {}", uri),
                Err(e) => warn!("Deleting unreadable CRL cached for {}: {}", uri, e),
            }
        }
        self.delete_cached(uri);
        None
    }

    fn delete_cached(&self, uri: &str) {
        let _guard = match self.lock.write() {
            Ok(g) => g,
            Err(_) => {
                error!("CRL cache lock is poisoned");
                return;
            }
        };
        for path in [self.cache_path(uri), self.timestamp_path(uri)] {
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    error!("Failed to delete {}: {}", path.display(), e);
                }
            }
        }
    }

    fn read_timestamp(&self, uri: &str) -> Option<u64> {
        let _guard = self.lock.read().ok()?;
        let buf = fs::read_to_string(self.timestamp_path(uri)).ok()?;
        buf.trim().parse::<u64>().ok()
    }

    // Returns true if a retrieval attempt for uri may be made now, recording the attempt. The
    // backoff check and the record happen under one acquisition of the attempts mutex so that
    // concurrent callers cannot both claim an attempt. The in-memory record is consulted first,
    // then the timestamp file left by earlier processes.
    fn claim_attempt(&self, uri: &str, now: u64) -> bool {
        {
            let mut attempts = self
                .attempts
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let last = match attempts.get(uri) {
                Some(t) => Some(*t),
                None => self.read_timestamp(uri),
            };
            if let Some(last) = last {
                if now < last.saturating_add(self.settings.min_refresh_delay) {
                    attempts.insert(uri.to_string(), last);
                    return false;
                }
            }
            attempts.insert(uri.to_string(), now);
        }

        let _guard = match self.lock.write() {
            Ok(g) => g,
            Err(_) => {
                error!("CRL cache lock is poisoned");
                return true;
            }
        };
        if let Err(e) = fs::write(self.timestamp_path(uri), now.to_string()) {
            warn!("Failed to record CRL retrieval time for {}: {}", uri, e);
        }
        true
    }

    // fetches a CRL from uri and, if usable, replaces the cached file
    fn refresh(&self, uri: &str, now: TimeOfInterest) -> Option<Arc<PdvCrl>> {
        let bytes = match self.fetcher.fetch(uri) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to retrieve CRL from {}: {}", uri, e);
                return None;
            }
        };
        let crl = match PdvCrl::from_pem_or_der(&bytes) {
            Ok(crl) => crl,
            Err(e) => {
                warn!("Discarding CRL retrieved from {}: {}", uri, e);
                return None;
            }
        };
        if crl.is_expired(now) {
            warn!("Discarding expired CRL retrieved from {}", uri);
            return None;
        }

        if let Err(e) = self.store(uri, &crl.encoded_crl) {
            warn!("Failed to cache CRL retrieved from {}: {}", uri, e);
        } else {
            info!("Cached CRL from {} retrieved from {}", crl.issuer_string(), uri);
        }
        Some(Arc::new(crl))
    }

    fn store(&self, uri: &str, encoded_crl: &[u8]) -> Result<()> {
        let path = self.cache_path(uri);
        let staging = staging_path(&path);
        let _guard = match self.lock.write() {
            Ok(g) => g,
            Err(_) => return Err(Error::Unrecognized),
        };
        fs::write(&staging, encoded_crl)?;
        if let Err(e) = fs::rename(&staging, &path) {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }
        Ok(())
    }

    /// purge_expired deletes cached CRLs that have expired or cannot be parsed, along with their
    /// timestamp files, and returns the number of CRLs deleted.
    pub fn purge_expired(&self) -> Result<usize> {
        let toi = TimeOfInterest::now();
        let _guard = match self.lock.write() {
            Ok(g) => g,
            Err(_) => return Err(Error::Unrecognized),
        };
        let mut count = 0;
        for entry in WalkDir::new(&self.cache_dir).max_depth(1) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    error!("Failed to read entry while purging CRL cache: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(OsStr::to_str) != Some("crl")
            {
                continue;
            }
            let keep = match get_file_as_byte_vec(path).and_then(|buf| PdvCrl::from_pem_or_der(&buf)) {
                Ok(crl) => !crl.is_expired(toi),
                Err(_) => false,
            };
            if keep {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => {
                    count += 1;
                    let ts = path.with_extension("ts");
                    if ts.exists() {
                        let _ = fs::remove_file(ts);
                    }
                }
                Err(e) => error!("Failed to delete stale CRL at {}: {}", path.display(), e),
            }
        }
        Ok(count)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}.tmp", std::process::id()));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use hex_literal::hex;
    use rcgen::{
        BasicConstraints, CertificateParams, CertificateRevocationListParams, DnType, IsCa,
        KeyIdMethod, KeyPair, KeyUsagePurpose, SerialNumber,
    };
    use time::{Duration, OffsetDateTime};

    const URI: &str = "http://crl.example.org/ca.crl";

    struct MockFetcher {
        count: Arc<AtomicUsize>,
        response: Option<Vec<u8>>,
        delay: std::time::Duration,
    }

    impl CrlFetcher for MockFetcher {
        fn fetch(&self, _uri: &str) -> Result<Vec<u8>> {
            self.count.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            match &self.response {
                Some(r) => Ok(r.clone()),
                None => Err(Error::NetworkError),
            }
        }
    }

    fn make_crl(this_update: OffsetDateTime, next_update: OffsetDateTime) -> Vec<u8> {
        let kp = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec![]).unwrap();
        params.distinguished_name.push(DnType::CommonName, "Cache Test CA");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let ca = params.self_signed(&kp).unwrap();
        CertificateRevocationListParams {
            this_update,
            next_update,
            crl_number: SerialNumber::from(1u64),
            issuing_distribution_point: None,
            revoked_certs: vec![],
            key_identifier_method: KeyIdMethod::Sha256,
        }
        .signed_by(&ca, &kp)
        .unwrap()
        .der()
        .to_vec()
    }

    fn cache_for(
        dir: &Path,
        response: Option<Vec<u8>>,
        locks: &NamedLocks,
    ) -> (CrlCache, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let settings = CrlCacheSettings {
            cache_dir: dir.to_str().unwrap().to_string(),
            ..Default::default()
        };
        let fetcher = MockFetcher {
            count: count.clone(),
            response,
            delay: std::time::Duration::ZERO,
        };
        (
            CrlCache::new(settings, Box::new(fetcher), locks).unwrap(),
            count,
        )
    }

    #[test]
    fn cache_file_name_test() {
        assert_eq!(
            cache_file_name("abc"),
            format!(
                "{}.crl",
                hex::encode(hex!(
                    "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
                ))
            )
        );
        assert_ne!(cache_file_name(URI), cache_file_name("http://crl.example.org/other.crl"));
    }

    #[test]
    fn freshness_test() {
        let s = CrlCacheSettings::default();
        let now = 1_700_000_000;
        // 7 day CRL issued an hour ago
        assert!(is_fresh(now - 3600, Some(now + 7 * 86400 - 3600), now, &s));
        // less than a day remaining
        assert!(!is_fresh(now - 6 * 86400, Some(now + 3600), now, &s));
        // more than a day remaining but under 10 percent of a 30 day window
        assert!(!is_fresh(now - 28 * 86400, Some(now + 2 * 86400), now, &s));
        // 11 percent of a 30 day window remaining
        assert!(is_fresh(
            now - 26 * 86400 - 86400 * 7 / 10,
            Some(now + 3 * 86400 + 86400 * 3 / 10),
            now,
            &s
        ));
        // expired
        assert!(!is_fresh(now - 7 * 86400, Some(now - 1), now, &s));
        // degenerate window falls back to seconds remaining
        assert!(is_fresh(now + 10 * 86400, Some(now + 2 * 86400), now, &s));
        assert!(!is_fresh(now + 10 * 86400, Some(now + 3600), now, &s));
        // no nextUpdate
        assert!(!is_fresh(now - 3600, None, now, &s));
    }

    #[test]
    fn backoff_test() {
        let dir = tempfile::tempdir().unwrap();
        let locks = NamedLocks::new();
        let (cache, count) = cache_for(dir.path(), None, &locks);
        assert!(cache.get_crl(URI).is_none());
        assert!(cache.get_crl(URI).is_none());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // a second instance sharing the folder honors the recorded attempt
        let (cache2, count2) = cache_for(dir.path(), None, &locks);
        assert!(cache2.get_crl(URI).is_none());
        assert_eq!(count2.load(Ordering::SeqCst), 0);

        // other URIs are unaffected
        assert!(cache.get_crl("http://crl.example.org/other.crl").is_none());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_callers_fetch_once() {
        let dir = tempfile::tempdir().unwrap();
        let locks = NamedLocks::new();
        let count = Arc::new(AtomicUsize::new(0));
        let settings = CrlCacheSettings {
            cache_dir: dir.path().to_str().unwrap().to_string(),
            ..Default::default()
        };
        let fetcher = MockFetcher {
            count: count.clone(),
            response: None,
            delay: std::time::Duration::from_millis(100),
        };
        let cache = CrlCache::new(settings, Box::new(fetcher), &locks).unwrap();
        let barrier = std::sync::Barrier::new(8);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    barrier.wait();
                    assert!(cache.get_crl(URI).is_none());
                });
            }
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(dir.path().join(timestamp_file_name(URI)).exists());
    }

    #[test]
    fn fetch_and_cache_fresh_crl() {
        let dir = tempfile::tempdir().unwrap();
        let locks = NamedLocks::new();
        let now = OffsetDateTime::now_utc();
        let crl = make_crl(now - Duration::hours(1), now + Duration::days(7));
        let (cache, count) = cache_for(dir.path(), Some(crl.clone()), &locks);

        let cached = cache.get_crl(URI).unwrap();
        assert!(cached.fresh);
        assert_eq!(cached.crl.encoded_crl, crl);
        assert_eq!(fs::read(cache.cache_path(URI)).unwrap(), crl);

        let again = cache.get_crl(URI).unwrap();
        assert!(again.fresh);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // fresh CRL is served from disk by a new instance without fetching
        let (cache2, count2) = cache_for(dir.path(), None, &locks);
        assert!(cache2.get_crl(URI).unwrap().fresh);
        assert_eq!(count2.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stale_crl_returned_when_refresh_fails() {
        let dir = tempfile::tempdir().unwrap();
        let locks = NamedLocks::new();
        let now = OffsetDateTime::now_utc();
        let crl = make_crl(now - Duration::days(6), now + Duration::hours(2));
        let (cache, count) = cache_for(dir.path(), Some(crl), &locks);

        let cached = cache.get_crl(URI).unwrap();
        assert!(!cached.fresh);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // within the backoff window the stale CRL is returned without another fetch
        let cached = cache.get_crl(URI).unwrap();
        assert!(!cached.fresh);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expired_cached_crl_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let locks = NamedLocks::new();
        let now = OffsetDateTime::now_utc();
        let expired = make_crl(now - Duration::days(10), now - Duration::days(1));
        let (cache, count) = cache_for(dir.path(), None, &locks);
        fs::write(cache.cache_path(URI), &expired).unwrap();

        assert!(cache.get_crl(URI).is_none());
        assert!(!cache.cache_path(URI).exists());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expired_fetched_crl_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let locks = NamedLocks::new();
        let now = OffsetDateTime::now_utc();
        let expired = make_crl(now - Duration::days(10), now - Duration::days(1));
        let (cache, _) = cache_for(dir.path(), Some(expired), &locks);
        assert!(cache.get_crl(URI).is_none());
        assert!(!cache.cache_path(URI).exists());
    }

    #[test]
    fn purge_expired_test() {
        let dir = tempfile::tempdir().unwrap();
        let locks = NamedLocks::new();
        let now = OffsetDateTime::now_utc();
        let (cache, _) = cache_for(dir.path(), None, &locks);
        fs::write(
            cache.cache_path("http://a.example.org/a.crl"),
            make_crl(now - Duration::days(10), now - Duration::days(1)),
        )
        .unwrap();
        fs::write(
            cache.cache_path("http://b.example.org/b.crl"),
            make_crl(now - Duration::hours(1), now + Duration::days(7)),
        )
        .unwrap();
        fs::write(cache.cache_path("http://c.example.org/c.crl"), b"garbage").unwrap();

        assert_eq!(cache.purge_expired().unwrap(), 2);
        assert!(cache.cache_path("http://b.example.org/b.crl").exists());
        assert!(!cache.cache_path("http://a.example.org/a.crl").exists());
    }

    #[test]
    fn misconfiguration_test() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not_a_folder");
        fs::write(&file, b"x").unwrap();
        let locks = NamedLocks::new();
        let settings = CrlCacheSettings {
            cache_dir: file.to_str().unwrap().to_string(),
            ..Default::default()
        };
        let fetcher = MockFetcher {
            count: Arc::new(AtomicUsize::new(0)),
            response: None,
            delay: std::time::Duration::ZERO,
        };
        assert!(matches!(
            CrlCache::new(settings, Box::new(fetcher), &locks),
            Err(Error::Misconfiguration(_))
        ));

        let settings = CrlCacheSettings {
            cache_dir: dir.path().to_str().unwrap().to_string(),
            min_percent_remaining: 101,
            ..Default::default()
        };
        let fetcher = MockFetcher {
            count: Arc::new(AtomicUsize::new(0)),
            response: None,
            delay: std::time::Duration::ZERO,
        };
        assert!(matches!(
            CrlCache::new(settings, Box::new(fetcher), &locks),
            Err(Error::Misconfiguration(_))
        ));
    }
}
