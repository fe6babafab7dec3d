use serde::{Deserialize, Serialize};
use std::fmt;
use strum::Display;

/// Separates the region from the method in a method scope key
const METHOD_SEPARATOR: char = ':';

/// Which of the two scope levels a key or limit belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// The coarse scope shared by all methods of a region
    Region,
    /// The fine scope of a single method within a region
    Method,
}

/// A type-safe representation of a rate limit scope.
///
/// Region keys are normalized to lowercase so that `NA1` and `na1` share a
/// scope. A method key is the region key followed by the method identifier.
///
/// # Examples
///
/// ```
/// use quotagate_lib::ratelimit::ScopeKey;
///
/// let region = ScopeKey::from("EUW1");
/// assert_eq!(region.as_str(), "euw1");
///
/// let method = ScopeKey::method(&region, "match-v5.getMatch");
/// assert_eq!(method.as_str(), "euw1:match-v5.getMatch");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeKey(String);

impl ScopeKey {
    /// The fine scope key of `method` within `region`
    #[must_use]
    pub fn method(region: &ScopeKey, method: &str) -> Self {
        ScopeKey(format!("{}{METHOD_SEPARATOR}{method}", region.0))
    }

    /// Get the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the key as an owned String
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ScopeKey {
    fn from(region: String) -> Self {
        ScopeKey(region.to_lowercase())
    }
}

impl From<&str> for ScopeKey {
    fn from(region: &str) -> Self {
        ScopeKey(region.to_lowercase())
    }
}
