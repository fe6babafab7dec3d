//! `quotagate` is a library for calling HTTP APIs which advertise their rate
//! limits in response headers.
//!
//! Requests are counted against a coarse region scope and a fine method scope.
//! Each scope starts small, learns its real limits from the responses and is
//! blocked outright when the remote side answers `429 Too Many Requests`.
//! Waiting requests are admitted by priority, first come first served within a
//! priority.
//!
//! ```no_run
//! use quotagate_lib::{ClientBuilder, Context, Result};
//! use secrecy::SecretString;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let client = ClientBuilder::builder()
//!       .api_key(SecretString::from("my-api-key".to_string()))
//!       .build()
//!       .client()?;
//!   let url = "https://na1.api.example.com/lol/status/v4/platform-data".parse().unwrap();
//!   let exchange = client
//!       .get(Context::new(), 0, "na1", "lol-status-v4.getPlatformData", url)
//!       .await?;
//!   println!("{}", exchange.status);
//!   Ok(())
//! }
//! ```
//!
//! The building blocks can be used on their own as well, for example the
//! [`ratelimit::AdmissionLimiter`] is a general purpose priority-aware
//! concurrency gate.
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
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod dispatcher;
mod retry;
mod settings;
mod types;

pub mod ratelimit;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::{
    client::{Client, ClientBuilder},
    dispatcher::Dispatcher,
    settings::{DEFAULT_API_KEY_HEADER, Settings, Snapshot},
    types::{
        Context, DEFAULT_MAX_RETRIES, ErrorKind, Exchange, Request, Result, ResultReceiver,
        RetryBudget,
    },
};
