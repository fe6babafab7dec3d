use crate::verbosity::Verbosity;
use anyhow::{Context, Result};
use clap::Parser;
use const_format::{concatcp, formatcp};
use quotagate_lib::ratelimit::{ConservationPolicy, RateLimitConfig};
use quotagate_lib::transport::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use quotagate_lib::{DEFAULT_API_KEY_HEADER, DEFAULT_MAX_RETRIES, RetryBudget};
use secrecy::SecretString;
use serde::Deserialize;
use std::convert::Infallible;
use std::{fs, path::Path, path::PathBuf, time::Duration};
use url::Url;

pub(crate) const QUOTAGATE_CONFIG_FILE: &str = "quotagate.toml";

const DEFAULT_REGION: &str = "global";
const DEFAULT_METHOD: &str = "default";

// clap requires `&str` type values for defaults
// whereas serde expects owned `String` types
const MAX_RETRIES_STR: &str = concatcp!(DEFAULT_MAX_RETRIES);
const TIMEOUT_STR: &str = concatcp!(DEFAULT_TIMEOUT);
// Show the default config file, but keep the field empty so that a missing
// default file is not an error
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    QUOTAGATE_CONFIG_FILE,
);

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

// Generate the functions for serde defaults
default_function! {
    api_key_header: String = DEFAULT_API_KEY_HEADER.to_string();
    region: String = DEFAULT_REGION.to_string();
    method: String = DEFAULT_METHOD.to_string();
    max_retries: RetryBudget = RetryBudget::default();
    timeout: u64 = DEFAULT_TIMEOUT;
    user_agent: String = DEFAULT_USER_AGENT.to_string();
    verbosity: Verbosity = Verbosity::default();
}

// Macro for merging configuration values
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

#[allow(clippy::unnecessary_wraps)]
fn parse_secret(secret: &str) -> Result<SecretString, Infallible> {
    Ok(SecretString::from(secret.to_string()))
}

/// A command-line client for HTTP APIs which advertise their rate limits in
/// response headers. Fetches every URL without tripping the limits of its
/// region and method.
#[derive(Parser, Debug)]
#[command(version, about)]
pub(crate) struct QuotagateOptions {
    /// The URLs to fetch
    #[arg(required = true)]
    pub(crate) urls: Vec<Url>,

    #[arg(short, long = "config")]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,
}

/// The main configuration, shared by the command line and the config file
#[allow(clippy::struct_excessive_bools)]
#[derive(Parser, Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Verbose program output
    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// API key sent with every request
    #[arg(long, env = "QUOTAGATE_API_KEY", hide_env_values = true, value_parser = parse_secret)]
    #[serde(default)]
    pub(crate) api_key: Option<SecretString>,

    /// Name of the header carrying the API key
    #[arg(long, default_value = DEFAULT_API_KEY_HEADER)]
    #[serde(default = "api_key_header")]
    pub(crate) api_key_header: String,

    /// Region scope the requests are counted against
    #[arg(short, long, default_value = DEFAULT_REGION)]
    #[serde(default = "region")]
    pub(crate) region: String,

    /// Method scope within the region, e.g. `match-v5.getMatch`
    #[arg(short, long, default_value = DEFAULT_METHOD)]
    #[serde(default = "method")]
    pub(crate) method: String,

    /// Priority of the requests. Higher values are admitted first
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) priority: i32,

    /// Maximum number of retries per request, `-1` retries until success
    #[arg(long, default_value = MAX_RETRIES_STR, allow_negative_numbers = true)]
    #[serde(default = "max_retries")]
    pub(crate) max_retries: RetryBudget,

    /// Percentage of the advertised region capacity to leave unused
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
    #[serde(default)]
    pub(crate) region_conservation: u8,

    /// Percentage of the advertised method capacity to leave unused
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
    #[serde(default)]
    pub(crate) method_conservation: u8,

    /// Method exempt from method conservation. Can be given multiple times
    #[arg(long = "exempt-method")]
    #[serde(default)]
    pub(crate) exempt_methods: Vec<String>,

    /// Response timeout per request in seconds
    #[arg(short, long, default_value = TIMEOUT_STR)]
    #[serde(default = "timeout")]
    pub(crate) timeout: u64,

    /// Give up on all requests which did not finish within this duration,
    /// e.g. `30s` or `2m`
    #[arg(long, value_parser = humantime::parse_duration)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) deadline: Option<Duration>,

    /// User agent
    #[arg(short, long, default_value = DEFAULT_USER_AGENT)]
    #[serde(default = "user_agent")]
    pub(crate) user_agent: String,

    /// Print the response bodies instead of status lines
    #[arg(short, long)]
    #[serde(default)]
    pub(crate) body: bool,

    /// Print statistics per region scope when done
    #[arg(long)]
    #[serde(default)]
    pub(crate) scope_stats: bool,

    /// Number of threads to utilize.
    /// Defaults to number of cores available to the system
    #[arg(short = 'T', long)]
    #[serde(default)]
    pub(crate) threads: Option<usize>,

    /// Rate limiter delays and initial capacity from config file
    #[arg(skip)]
    #[serde(default)]
    pub(crate) rate_limit: RateLimitConfig,
}

impl Config {
    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        // SecretBox doesn't implement Eq, so the key is handled outside of fold_in!
        if self.api_key.is_none() && toml.api_key.is_some() {
            self.api_key = toml.api_key;
        }

        // Rate limiter settings can only be given in the config file
        self.rate_limit = toml.rate_limit;

        // NOTE: a compile error within this macro call means the keys below no
        // longer match the fields of `Config`
        fold_in! {
            // Destination and source configs
            self, toml;

            Config {
                // Keys which are handled outside of fold_in
                ..api_key,
                ..rate_limit,

                // Keys with defaults to assign
                api_key_header: DEFAULT_API_KEY_HEADER,
                body: false,
                deadline: None,
                exempt_methods: Vec::<String>::new(),
                max_retries: RetryBudget::default(),
                method: DEFAULT_METHOD,
                method_conservation: 0,
                priority: 0,
                region: DEFAULT_REGION,
                region_conservation: 0,
                scope_stats: false,
                threads: None,
                timeout: DEFAULT_TIMEOUT,
                user_agent: DEFAULT_USER_AGENT,
                verbose: Verbosity::default(),
            }
        }
    }

    /// The conservation policy described by the percentages and exemptions
    pub(crate) fn conservation(&self) -> Result<ConservationPolicy> {
        ConservationPolicy::new(
            self.region_conservation,
            self.method_conservation,
            self.exempt_methods.iter().cloned(),
        )
        .context("Invalid usage conservation")
    }
}
