//! Assembles trust engines from command line options and evaluates the presented chain

use std::fs;
use std::sync::Arc;

use der::Decode;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use spki::SubjectPublicKeyInfoOwned;

use trustval::*;

use crate::args::TrustvArgs;

/// Contents of the JSON settings file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustvSettings {
    /// Path validation settings
    pub pkix: PkixSettings,
    /// CRL cache settings. When absent, the cache is only used if a cache folder is given on the
    /// command line.
    pub crl_cache: Option<CrlCacheSettings>,
}

/// Outcome of a run, mapped to the process exit code
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The chain is trusted
    Valid,
    /// The chain is not trusted
    Invalid,
    /// The options or configuration could not be used
    ConfigurationError,
}

impl Outcome {
    /// Process exit code
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Valid => 0,
            Outcome::Invalid => 1,
            Outcome::ConfigurationError => 2,
        }
    }
}

fn read_settings(args: &TrustvArgs) -> Result<TrustvSettings> {
    let mut settings = match &args.settings {
        Some(path) => {
            let json = fs::read_to_string(path)?;
            serde_json::from_str::<TrustvSettings>(&json).map_err(|e| {
                Error::Misconfiguration(format!("failed to parse settings from {}: {}", path, e))
            })?
        }
        None => TrustvSettings::default(),
    };
    if let Some(cache_dir) = &args.cache_dir {
        let mut cache_settings = settings.crl_cache.unwrap_or_default();
        cache_settings.cache_dir = cache_dir.clone();
        settings.crl_cache = Some(cache_settings);
    }
    Ok(settings)
}

cfg_if! {
    if #[cfg(feature = "remote")] {
        fn prepare_crl_cache(settings: &Option<CrlCacheSettings>, locks: &NamedLocks) -> Result<Option<Arc<CrlCache>>> {
            let settings = match settings {
                Some(s) => s.clone(),
                None => return Ok(None),
            };
            let fetcher = HttpCrlFetcher::new(settings.fetch_timeout)?;
            let cache = CrlCache::new(settings, Box::new(fetcher), locks)?;
            if let Err(e) = cache.purge_expired() {
                error!("Failed to purge expired CRLs from cache: {}", e);
            }
            Ok(Some(Arc::new(cache)))
        }
    } else {
        fn prepare_crl_cache(settings: &Option<CrlCacheSettings>, _locks: &NamedLocks) -> Result<Option<Arc<CrlCache>>> {
            if settings.is_some() {
                error!("CRL retrieval is not available without the remote feature; ignoring CRL cache settings");
            }
            Ok(None)
        }
    }
}

fn explicit_key_credentials(folder: &str) -> Result<Vec<Credential>> {
    let mut retval = vec![];
    for cert in cert_folder_to_vec(folder)? {
        let spki = SubjectPublicKeyInfoOwned::from_der(&cert.spki_der()?)?;
        retval.push(Credential::from_public_key(spki).with_key_names(&[&cert.subject_string()]));
    }
    Ok(retval)
}

/// Engines and credentials assembled from the command line
pub struct Evaluation {
    engine: Box<dyn TrustEngine>,
    resolver: StaticCredentialResolver,
    criteria: CredentialCriteria,
}

/// prepare reads the settings, trust anchors, CRLs and explicit keys named by `args` and builds
/// the trust engine used to evaluate the chain. Any failure is a configuration error.
pub fn prepare(args: &TrustvArgs) -> Result<Evaluation> {
    let settings = read_settings(args)?;
    let locks = NamedLocks::new();
    let crl_cache = prepare_crl_cache(&settings.crl_cache, &locks)?;

    let mut pkix = PkixTrustEngine::new(settings.pkix.clone(), crl_cache)?;
    if let Some(toi) = args.time_of_interest {
        pkix = pkix.with_time_of_interest(TimeOfInterest::from_unix_secs(toi));
    }

    let tas = cert_folder_to_vec(&args.ta_folder)?;
    if tas.is_empty() {
        return Err(Error::Misconfiguration(format!(
            "no trust anchors found in {}",
            args.ta_folder
        )));
    }
    info!("Read {} trust anchors from {}", tas.len(), args.ta_folder);
    let crls = match &args.crl_folder {
        Some(folder) => crl_folder_to_vec(folder)?,
        None => vec![],
    };
    let mut credentials = vec![Credential::from_certificates(tas).with_crls(crls)];

    let engine: Box<dyn TrustEngine> = match &args.explicit_key_folder {
        Some(folder) => {
            let keys = explicit_key_credentials(folder)?;
            debug!("Read {} explicitly trusted keys from {}", keys.len(), folder);
            credentials.extend(keys);
            let mut chain = ChainingTrustEngine::new();
            chain.add_engine(Box::new(pkix));
            chain.add_engine(Box::new(ExplicitKeyTrustEngine::new()));
            Box::new(chain)
        }
        None => Box::new(pkix),
    };

    Ok(Evaluation {
        engine,
        resolver: StaticCredentialResolver::new(credentials),
        criteria: CredentialCriteria {
            peer_name: args.peer_name.clone(),
            ..Default::default()
        },
    })
}

/// Reads the chain named by `args` and evaluates it.
pub fn evaluate(args: &TrustvArgs, mut evaluation: Evaluation) -> Outcome {
    let mut chain = vec![];
    for path in &args.chain {
        match fs::read(path) {
            Ok(b) => chain.push(b),
            Err(e) => {
                error!("Failed to read {}: {}", path, e);
                return Outcome::ConfigurationError;
            }
        }
    }
    if validate_encoded_chain(
        evaluation.engine.as_ref(),
        &chain,
        &evaluation.resolver,
        &mut evaluation.criteria,
    ) {
        Outcome::Valid
    } else {
        Outcome::Invalid
    }
}

/// Runs trustv with the given arguments.
pub fn run(args: &TrustvArgs) -> Outcome {
    let evaluation = match prepare(args) {
        Ok(e) => e,
        Err(e) => {
            error!("Configuration error: {}", e);
            return Outcome::ConfigurationError;
        }
    };
    evaluate(args, evaluation)
}
