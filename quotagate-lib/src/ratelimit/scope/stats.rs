use std::collections::HashMap;
use std::time::Instant;

use http::StatusCode;

/// A [`HashMap`] mapping scope keys to their [`ScopeStats`]
#[derive(Debug, Default, Clone)]
pub struct ScopeStatsMap(HashMap<String, ScopeStats>);

impl ScopeStatsMap {
    /// Sort scope statistics by request count (descending order)
    #[must_use]
    pub fn sorted(&self) -> Vec<(String, ScopeStats)> {
        let mut sorted: Vec<_> = self.0.clone().into_iter().collect();
        sorted.sort_by(|(a_key, a), (b_key, b)| {
            b.total_requests
                .cmp(&a.total_requests)
                .then_with(|| a_key.cmp(b_key))
        });
        sorted
    }

    /// Statistics of a single scope
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ScopeStats> {
        self.0.get(key)
    }

    /// Number of scopes with statistics
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no scope has been used yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, ScopeStats>> for ScopeStatsMap {
    fn from(value: HashMap<String, ScopeStats>) -> Self {
        Self(value)
    }
}

impl Extend<(String, ScopeStats)> for ScopeStatsMap {
    fn extend<T: IntoIterator<Item = (String, ScopeStats)>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

/// Record and report statistics for a [`crate::ratelimit::ScopeLimit`]
#[derive(Debug, Clone, Default)]
pub struct ScopeStats {
    /// Total number of exchanges performed in this scope
    pub total_requests: u64,
    /// Number of successful responses (2xx status)
    pub successful_requests: u64,
    /// Number of `429 Too Many Requests` responses
    pub rate_limited: u64,
    /// Number of server error responses (5xx)
    pub server_errors: u64,
    /// Number of client error responses (4xx, excluding 429)
    pub client_errors: u64,
    /// Number of attempts that got no response at all
    pub transport_errors: u64,
    /// Number of times the scope was blocked
    pub blocks: u64,
    /// Timestamp of the last successful request
    pub last_success: Option<Instant>,
    /// Timestamp of the last rate limit response
    pub last_rate_limit: Option<Instant>,
    /// Status code counts
    pub status_codes: HashMap<u16, u64>,
}

impl ScopeStats {
    /// Record a response with the given status code
    pub fn record_response(&mut self, status: StatusCode) {
        self.total_requests += 1;
        *self.status_codes.entry(status.as_u16()).or_insert(0) += 1;

        match status.as_u16() {
            200..=299 => {
                self.successful_requests += 1;
                self.last_success = Some(Instant::now());
            }
            429 => {
                self.rate_limited += 1;
                self.last_rate_limit = Some(Instant::now());
            }
            400..=499 => self.client_errors += 1,
            500..=599 => self.server_errors += 1,
            _ => {}
        }
    }

    /// Record an attempt which got no response
    pub const fn record_transport_error(&mut self) {
        self.total_requests += 1;
        self.transport_errors += 1;
    }

    /// Record that the scope was blocked
    pub const fn record_block(&mut self) {
        self.blocks += 1;
    }

    /// Get the success rate (0.0 to 1.0)
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0 // Assume success until proven otherwise
        } else {
            #[allow(clippy::cast_precision_loss)]
            let rate = self.successful_requests as f64 / self.total_requests as f64;
            rate
        }
    }

    /// Whether this scope was ever rate limited by the remote side
    #[must_use]
    pub const fn was_rate_limited(&self) -> bool {
        self.rate_limited > 0
    }
}
