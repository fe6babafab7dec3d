use thiserror::Error;

use crate::ratelimit::ScopeKind;

/// Errors in rate limiting settings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// A usage conservation percentage is outside of `0..=100`
    #[error("Invalid {scope} conservation percentage {percent}, expected a value from 0 to 100")]
    InvalidConservation {
        /// The scope the percentage applies to
        scope: ScopeKind,
        /// The rejected value
        percent: u8,
    },

    /// A retry budget below `-1`
    #[error("Invalid retry budget {0}, expected -1 (unlimited) or a non-negative number")]
    InvalidRetryBudget(i64),

    /// A retry budget that is not a number
    #[error("Cannot parse retry budget from '{0}'")]
    InvalidRetryBudgetString(String),

    /// The initial capacity of a scope must allow at least one request
    #[error("Initial scope capacity must be at least 1")]
    ZeroInitialCapacity,
}
