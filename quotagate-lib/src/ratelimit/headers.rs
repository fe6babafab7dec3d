//! Handle rate limiting headers.
//!
//! Limits are advertised as comma-separated `limit:window` entries (window in
//! seconds), the matching usage as `count:window` entries, e.g.
//!
//! ```text
//! X-App-Rate-Limit: 20:1,100:120
//! X-App-Rate-Limit-Count: 3:1,41:120
//! X-Method-Rate-Limit: 50:10
//! X-Method-Rate-Limit-Count: 7:10
//! ```

use http::{HeaderMap, HeaderValue};
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use strum::{Display, EnumString};
use thiserror::Error;

/// Limits of the coarse (region) scope
pub(crate) const APP_RATE_LIMIT: &str = "x-app-rate-limit";
/// Usage of the coarse (region) scope
pub(crate) const APP_RATE_LIMIT_COUNT: &str = "x-app-rate-limit-count";
/// Limits of the fine (method) scope
pub(crate) const METHOD_RATE_LIMIT: &str = "x-method-rate-limit";
/// Usage of the fine (method) scope
pub(crate) const METHOD_RATE_LIMIT_COUNT: &str = "x-method-rate-limit-count";
/// Which limit a `429` response refers to
pub(crate) const RATE_LIMIT_TYPE: &str = "x-rate-limit-type";

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum RetryAfterParseError {
    #[error("Unable to parse value '{0}'")]
    ValueError(String),

    #[error("Header value contains invalid chars")]
    HeaderValueError,

    #[error("Date '{0}' lies in the past")]
    PastDate(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum QuotaParseError {
    #[error("Header value contains invalid chars")]
    HeaderValueError,

    #[error("Malformed rate limit entry '{0}'")]
    MalformedEntry(String),
}

/// The limit a `429 Too Many Requests` response was caused by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub(crate) enum LimitType {
    /// The coarse (region) limit of the application
    Application,
    /// The fine (method) limit
    Method,
    /// A limit of the backing service, not tied to our usage
    Service,
}

/// One advertised limit together with the usage reported for its window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Quota {
    pub(crate) limit: usize,
    pub(crate) count: usize,
    pub(crate) window: Duration,
}

/// Parse the "Retry-After" header as specified per
/// [RFC 7231 section 7.1.3](https://www.rfc-editor.org/rfc/rfc7231#section-7.1.3)
pub(crate) fn parse_retry_after(value: &HeaderValue) -> Result<Duration, RetryAfterParseError> {
    let value = value
        .to_str()
        .map_err(|_| RetryAfterParseError::HeaderValueError)?;

    // RFC 7231: Retry-After = HTTP-date / delay-seconds
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    let date = httpdate::parse_http_date(value)
        .map_err(|_| RetryAfterParseError::ValueError(value.into()))?;
    date.duration_since(SystemTime::now())
        .map_err(|_| RetryAfterParseError::PastDate(value.into()))
}

/// The wait mandated by a `429` response, or `default` if the header is
/// missing or unusable
pub(crate) fn retry_after(headers: &HeaderMap, default: Duration) -> Duration {
    match headers.get(http::header::RETRY_AFTER).map(parse_retry_after) {
        Some(Ok(duration)) => duration,
        Some(Err(e)) => {
            log::debug!("Ignoring Retry-After header: {e}");
            default
        }
        None => default,
    }
}

/// The limit type a `429` response refers to
pub(crate) fn limit_type(headers: &HeaderMap) -> Option<LimitType> {
    headers
        .get(RATE_LIMIT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| LimitType::from_str(value.trim()).ok())
}

/// Combine the limits in `limit_header` with the usage in `count_header`.
///
/// Usage is matched to a limit by window; an entry without reported usage
/// counts as unused. Returns an empty list if the limits are absent or
/// malformed.
pub(crate) fn parse_quotas(
    headers: &HeaderMap,
    limit_header: &str,
    count_header: &str,
) -> Vec<Quota> {
    let Some(limits) = headers.get(limit_header) else {
        return Vec::new();
    };
    let limits = match parse_entries(limits) {
        Ok(limits) => limits,
        Err(e) => {
            log::debug!("Ignoring {limit_header} header: {e}");
            return Vec::new();
        }
    };
    let counts = headers
        .get(count_header)
        .map(parse_entries)
        .and_then(Result::ok)
        .unwrap_or_default();

    limits
        .into_iter()
        .map(|(limit, window)| {
            let count = counts
                .iter()
                .find(|(_, w)| *w == window)
                .map_or(0, |(count, _)| *count);
            Quota {
                limit,
                count,
                window,
            }
        })
        .collect()
}

/// Parse `a:b,c:d` into `[(a, b seconds), (c, d seconds)]`
fn parse_entries(value: &HeaderValue) -> Result<Vec<(usize, Duration)>, QuotaParseError> {
    let value = value
        .to_str()
        .map_err(|_| QuotaParseError::HeaderValueError)?;

    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let malformed = || QuotaParseError::MalformedEntry(entry.to_string());
            let (amount, window) = entry.split_once(':').ok_or_else(malformed)?;
            let amount = amount.trim().parse::<usize>().map_err(|_| malformed())?;
            let window = window.trim().parse::<u64>().map_err(|_| malformed())?;
            Ok((amount, Duration::from_secs(window)))
        })
        .collect()
}
