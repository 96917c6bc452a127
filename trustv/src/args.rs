//! Command line arguments for trustv

use clap::Parser;

/// Trust validation tool (trustv)
#[derive(Parser, Debug, Default)]
#[command(arg_required_else_help(true))]
#[clap(author, version, about, long_about = None)]
pub struct TrustvArgs {
    /// Full path of folder containing binary DER or PEM encoded trust anchor certificates.
    #[clap(short, long, help_heading = "COMMON OPTIONS")]
    pub ta_folder: String,

    /// Full path and filename of JSON-formatted settings with optional "pkix" and "crl_cache"
    /// members.
    #[clap(short, long, help_heading = "COMMON OPTIONS")]
    pub settings: Option<String>,

    /// Time to use for validation expressed as the number of seconds since Unix epoch (defaults
    /// to current system time).
    #[clap(short = 'i', long, help_heading = "COMMON OPTIONS")]
    pub time_of_interest: Option<u64>,

    /// Full path and filename of YAML-formatted configuration file for log4rs logging mechanism.
    /// See <https://docs.rs/log4rs/latest/log4rs/> for details.
    #[clap(short, long, help_heading = "COMMON OPTIONS")]
    pub logging_config: Option<String>,

    /// Full path and filename of a certificate to validate followed by any intermediate CA
    /// certificates, end entity first. May be repeated.
    #[clap(short, long, required = true, num_args = 1.., help_heading = "VALIDATION")]
    pub chain: Vec<String>,

    /// Name expected to match the end entity certificate.
    #[clap(short, long, help_heading = "VALIDATION")]
    pub peer_name: Option<String>,

    /// Full path of folder containing CRLs to supply alongside the trust anchors.
    #[clap(long, help_heading = "REVOCATION")]
    pub crl_folder: Option<String>,

    /// Full path of folder in which CRLs retrieved from distribution points are cached. Overrides
    /// the cache_dir value from the settings file.
    #[clap(long, help_heading = "REVOCATION")]
    pub cache_dir: Option<String>,

    /// Full path of folder containing certificates whose public keys are trusted directly. When
    /// present, explicit key matching is attempted when path validation fails.
    #[clap(short = 'k', long, help_heading = "EXPLICIT KEYS")]
    pub explicit_key_folder: Option<String>,
}
