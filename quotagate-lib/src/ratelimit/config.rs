use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::ratelimit::{RateLimitError, ScopeKind};

/// Default capacity of a scope before the remote side told us its limits
const DEFAULT_INITIAL_CAPACITY: usize = 1;

/// Default delay before slots return to the pool after a failed request
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(15);

/// Default delay before a slot returns when the response carried no limits
const DEFAULT_FALLBACK_RELEASE: Duration = Duration::from_secs(15);

/// Default wait after a `429` response without a usable `Retry-After`
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(15);

/// Timing and sizing knobs of the rate limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Capacity of each limiter of a freshly created scope
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,

    /// Delay before slots are returned after a non-success response
    #[serde(default = "default_cooldown", with = "humantime_serde")]
    pub cooldown: Duration,

    /// Delay before a slot is returned when the success response carried no
    /// rate limit headers for its scope
    #[serde(default = "default_fallback_release", with = "humantime_serde")]
    pub fallback_release: Duration,

    /// Wait after a `429` response without a usable `Retry-After` header
    #[serde(default = "default_retry_after", with = "humantime_serde")]
    pub default_retry_after: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_initial_capacity(),
            cooldown: default_cooldown(),
            fallback_release: default_fallback_release(),
            default_retry_after: default_retry_after(),
        }
    }
}

const fn default_initial_capacity() -> usize {
    DEFAULT_INITIAL_CAPACITY
}

const fn default_cooldown() -> Duration {
    DEFAULT_COOLDOWN
}

const fn default_fallback_release() -> Duration {
    DEFAULT_FALLBACK_RELEASE
}

const fn default_retry_after() -> Duration {
    DEFAULT_RETRY_AFTER
}

impl RateLimitConfig {
    /// Check that the configuration can be used
    ///
    /// # Errors
    ///
    /// Returns an error if `initial_capacity` is zero, which would block
    /// every scope before its first response.
    pub const fn validate(&self) -> Result<(), RateLimitError> {
        if self.initial_capacity == 0 {
            return Err(RateLimitError::ZeroInitialCapacity);
        }
        Ok(())
    }
}

/// Share of the advertised capacity that is deliberately left unused.
///
/// The region percentage applies to the coarse scope, the method percentage
/// to the fine scope unless the method is exempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedPolicy")]
pub struct ConservationPolicy {
    region_percent: u8,
    method_percent: u8,
    exempt_methods: HashSet<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UncheckedPolicy {
    #[serde(default)]
    region_percent: u8,
    #[serde(default)]
    method_percent: u8,
    #[serde(default)]
    exempt_methods: HashSet<String>,
}

impl TryFrom<UncheckedPolicy> for ConservationPolicy {
    type Error = RateLimitError;

    fn try_from(policy: UncheckedPolicy) -> Result<Self, Self::Error> {
        Self::new(
            policy.region_percent,
            policy.method_percent,
            policy.exempt_methods,
        )
    }
}

impl ConservationPolicy {
    /// Create a policy holding back `region_percent` of the coarse capacity
    /// and `method_percent` of the fine capacity for all methods except
    /// `exempt_methods`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidConservation`] if a percentage is
    /// above 100.
    pub fn new<I, S>(
        region_percent: u8,
        method_percent: u8,
        exempt_methods: I,
    ) -> Result<Self, RateLimitError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for (scope, percent) in [
            (ScopeKind::Region, region_percent),
            (ScopeKind::Method, method_percent),
        ] {
            if percent > 100 {
                return Err(RateLimitError::InvalidConservation { scope, percent });
            }
        }
        Ok(Self {
            region_percent,
            method_percent,
            exempt_methods: exempt_methods.into_iter().map(Into::into).collect(),
        })
    }

    /// Percentage held back from the coarse scope
    #[must_use]
    pub const fn region_percent(&self) -> u8 {
        self.region_percent
    }

    /// Percentage held back from the fine scope
    #[must_use]
    pub const fn method_percent(&self) -> u8 {
        self.method_percent
    }

    /// Methods whose fine scope is never held back
    #[must_use]
    pub const fn exempt_methods(&self) -> &HashSet<String> {
        &self.exempt_methods
    }

    /// The holdback percentage that applies to a scope, if any
    fn holdback(&self, kind: ScopeKind, method: &str) -> Option<u8> {
        let percent = match kind {
            ScopeKind::Region => self.region_percent,
            ScopeKind::Method if self.exempt_methods.contains(method) => 0,
            ScopeKind::Method => self.method_percent,
        };
        (percent > 0).then_some(percent)
    }

    /// The capacity to use for an advertised `limit`.
    ///
    /// With a holdback the ceiling is `limit - limit * percent / 100`,
    /// otherwise one slot of headroom is kept. The result is never below 1.
    #[must_use]
    pub fn effective_ceiling(&self, limit: usize, kind: ScopeKind, method: &str) -> usize {
        let ceiling = match self.holdback(kind, method) {
            Some(percent) => {
                let percent = usize::from(percent);
                // `limit * percent / 100` without overflowing
                limit - (limit / 100 * percent + limit % 100 * percent / 100)
            }
            None => limit.saturating_sub(1),
        };
        ceiling.max(1)
    }
}
