use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ratelimit::RateLimitError;

/// Default number of retries before a request is deemed as failed, 3.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The value that stands for "retry forever" in configuration files and on
/// the command line.
const UNLIMITED_SENTINEL: i64 = -1;

/// How often a request may be retried before its failure is delivered.
///
/// Configuration uses a plain integer: `0` and up is a limited budget,
/// `-1` means unlimited.
///
/// ```
/// use quotagate_lib::RetryBudget;
///
/// assert_eq!(RetryBudget::try_from(-1).unwrap(), RetryBudget::Unlimited);
/// assert!(RetryBudget::Limited(2).allows(1));
/// assert!(!RetryBudget::Limited(2).allows(2));
/// assert!(RetryBudget::try_from(-2).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum RetryBudget {
    /// At most this many retries
    Limited(u32),
    /// Retry until the request succeeds or is cancelled
    Unlimited,
}

impl RetryBudget {
    /// Whether another attempt is allowed after `retries` retries
    #[must_use]
    pub const fn allows(self, retries: u32) -> bool {
        match self {
            Self::Limited(max) => retries < max,
            Self::Unlimited => true,
        }
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::Limited(DEFAULT_MAX_RETRIES)
    }
}

impl TryFrom<i64> for RetryBudget {
    type Error = RateLimitError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value == UNLIMITED_SENTINEL {
            return Ok(Self::Unlimited);
        }
        u32::try_from(value)
            .map(Self::Limited)
            .map_err(|_| RateLimitError::InvalidRetryBudget(value))
    }
}

impl From<RetryBudget> for i64 {
    fn from(budget: RetryBudget) -> Self {
        match budget {
            RetryBudget::Limited(max) => i64::from(max),
            RetryBudget::Unlimited => UNLIMITED_SENTINEL,
        }
    }
}

impl FromStr for RetryBudget {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<i64>()
            .map_err(|_| RateLimitError::InvalidRetryBudgetString(s.to_string()))?;
        Self::try_from(value)
    }
}

impl fmt::Display for RetryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", i64::from(*self))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::RetryBudget;

    #[rstest]
    #[case("0", RetryBudget::Limited(0))]
    #[case("5", RetryBudget::Limited(5))]
    #[case(" -1 ", RetryBudget::Unlimited)]
    fn test_parse_budget(#[case] input: &str, #[case] expected: RetryBudget) {
        assert_eq!(input.parse::<RetryBudget>().unwrap(), expected);
    }

    #[rstest]
    #[case("-2")]
    #[case("many")]
    #[case("99999999999")]
    fn test_parse_invalid_budget(#[case] input: &str) {
        assert!(input.parse::<RetryBudget>().is_err());
    }

    #[test]
    fn test_zero_budget_never_retries() {
        assert!(!RetryBudget::Limited(0).allows(0));
    }

    #[test]
    fn test_unlimited_budget_has_no_ceiling() {
        assert!(RetryBudget::Unlimited.allows(u32::MAX));
    }

    #[test]
    fn test_budget_from_toml() {
        #[derive(serde::Deserialize)]
        struct Config {
            max_retries: RetryBudget,
        }
        let config: Config = toml::from_str("max_retries = -1").unwrap();
        assert_eq!(config.max_retries, RetryBudget::Unlimited);
        assert!(toml::from_str::<Config>("max_retries = -7").is_err());
    }
}
