//! `quotagate` fetches URLs from HTTP APIs which advertise their rate limits
//! in response headers, without tripping those limits.
//!
//! The quotagate binary is a wrapper around quotagate-lib, which provides
//! convenience functions for calling quotagate from the command-line.
//!
//! Fetch a single resource:
//! ```sh
//! quotagate --api-key "$KEY" --region na1 --method status-v4.getPlatformData \
//!   https://na1.api.example.com/lol/status/v4/platform-data
//! ```
//!
//! Fetch several resources of the same method and print their bodies:
//! ```sh
//! quotagate -r euw1 -m match-v5.getMatch --body \
//!   https://europe.api.example.com/lol/match/v5/matches/EUW1_1 \
//!   https://europe.api.example.com/lol/match/v5/matches/EUW1_2
//! ```
//!
//! The API key can also be passed through the `QUOTAGATE_API_KEY` environment
//! variable or the `api_key` entry of a `quotagate.toml` file.
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use clap::Parser;
use futures::future::join_all;
use log::{error, info};
use quotagate_lib::{Client, ClientBuilder, Context, Exchange};
use url::Url;

mod logging;
mod options;
mod scope_stats;
mod verbosity;

use crate::logging::init_logging;
use crate::options::{Config, QUOTAGATE_CONFIG_FILE, QuotagateOptions};
use crate::scope_stats::ScopeStatsTable;

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator, e.g. when the request client cannot be built.
    #[allow(unused)]
    UnexpectedFailure = 1,
    RequestFailure = 2,
    ConfigFile = 3,
}

/// Parse the command line and merge it with the config file, if any.
fn load_config() -> Result<QuotagateOptions> {
    let mut opts = QuotagateOptions::parse();

    init_logging(&opts.config.verbose);

    // An explicitly given config file must exist, the default one is optional
    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        let default_config = PathBuf::from(QUOTAGATE_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }

    // Percentages from the config file are only checked here
    opts.config.conservation()?;

    Ok(opts)
}

fn main() -> Result<()> {
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

fn run_main() -> Result<i32> {
    use std::process::exit;

    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!("Error while loading config: {e}");
            exit(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = match opts.config.threads {
        Some(threads) => {
            // We define our own runtime instead of the `tokio::main` attribute
            // since we want to make the number of threads configurable
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(threads)
                .enable_all()
                .build()?
        }
        None => tokio::runtime::Runtime::new()?,
    };

    runtime.block_on(run(&opts))
}

fn build_client(config: &Config) -> Result<Client> {
    ClientBuilder::builder()
        .api_key(config.api_key.clone())
        .api_key_header(config.api_key_header.clone())
        .max_retries(config.max_retries)
        .conservation(config.conservation()?)
        .rate_limit(config.rate_limit)
        .timeout(Some(Duration::from_secs(config.timeout)))
        .user_agent(config.user_agent.clone())
        .build()
        .client()
        .context("Failed to create request client")
}

/// Root context of all requests, cancelled on Ctrl-C
fn root_context(config: &Config) -> Context {
    let ctx = match config.deadline {
        Some(deadline) => Context::with_timeout(deadline),
        None => Context::new(),
    };

    let on_interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling outstanding requests");
            on_interrupt.cancel();
        }
    });
    ctx
}

async fn fetch(
    client: &Client,
    ctx: Context,
    config: &Config,
    url: Url,
) -> (Url, quotagate_lib::Result<Exchange>) {
    let result = client
        .get(
            ctx,
            config.priority,
            config.region.clone(),
            config.method.clone(),
            url.clone(),
        )
        .await;
    (url, result)
}

/// Fetch all URLs concurrently and print one line per result
async fn run(opts: &QuotagateOptions) -> Result<i32> {
    let config = &opts.config;
    let client = build_client(config)?;
    let ctx = root_context(config);

    let requests = opts
        .urls
        .iter()
        .map(|url| fetch(&client, ctx.child(), config, url.clone()));

    let mut failures = 0;
    for (url, result) in join_all(requests).await {
        match result {
            Ok(exchange) if config.body => println!("{}", exchange.body),
            Ok(exchange) => println!("{} {url}", exchange.status.as_u16()),
            Err(e) => {
                failures += 1;
                if let Some(status) = e.status()
                    && !config.body
                {
                    println!("{} {url}", status.as_u16());
                }
                error!("{url}: {e}");
            }
        }
    }

    if config.scope_stats {
        print!("{}", ScopeStatsTable::new(&client.scope_stats()));
    }

    if failures == 0 {
        Ok(ExitCode::Success as i32)
    } else {
        info!("{failures} of {} requests failed", opts.urls.len());
        Ok(ExitCode::RequestFailure as i32)
    }
}
