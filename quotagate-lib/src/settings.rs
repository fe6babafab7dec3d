use http::header::{HeaderName, HeaderValue};
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

use crate::ratelimit::ConservationPolicy;
use crate::{Result, RetryBudget};

/// Default name of the header carrying the API key
pub const DEFAULT_API_KEY_HEADER: &str = "X-Api-Key";

/// A consistent view of the runtime-tunable settings.
///
/// Readers always see a whole snapshot; a writer replaces it atomically.
#[derive(Debug)]
pub struct Snapshot {
    api_key: SecretString,
    api_key_header: HeaderName,
    max_retries: RetryBudget,
    conservation: ConservationPolicy,
}

impl Snapshot {
    /// The API key attached to every exchange
    #[must_use]
    pub const fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    /// Name of the header carrying the API key
    #[must_use]
    pub const fn api_key_header(&self) -> &HeaderName {
        &self.api_key_header
    }

    /// How often a failed request may be retried
    #[must_use]
    pub const fn max_retries(&self) -> RetryBudget {
        self.max_retries
    }

    /// The usage conservation policy applied when ceilings are recomputed
    #[must_use]
    pub const fn conservation(&self) -> &ConservationPolicy {
        &self.conservation
    }

    /// The credential header as it is sent.
    /// An empty API key sends no header at all.
    pub(crate) fn credential(&self) -> Option<(HeaderName, HeaderValue)> {
        let key = self.api_key.expose_secret();
        if key.is_empty() {
            return None;
        }
        // Checked when the key is set
        let mut value = HeaderValue::from_str(key).ok()?;
        value.set_sensitive(true);
        Some((self.api_key_header.clone(), value))
    }

    fn rebuild(&self) -> Self {
        Self {
            api_key: SecretString::from(self.api_key.expose_secret().to_owned()),
            api_key_header: self.api_key_header.clone(),
            max_retries: self.max_retries,
            conservation: self.conservation.clone(),
        }
    }
}

/// Holder of the settings shared by the dispatcher and its callers.
///
/// Settings can be changed at any time; in-flight requests pick up the new
/// values at their next decision point.
///
/// # Examples
///
/// ```
/// use quotagate_lib::{RetryBudget, Settings};
///
/// # fn main() -> Result<(), quotagate_lib::ErrorKind> {
/// let settings = Settings::new("my-key", "X-Api-Key", RetryBudget::default(), Default::default())?;
/// settings.set_max_retries(RetryBudget::Unlimited);
/// assert_eq!(settings.load().max_retries(), RetryBudget::Unlimited);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Settings {
    current: RwLock<Arc<Snapshot>>,
}

impl Settings {
    /// Create settings from their initial values.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the API key or the header name cannot be used in
    /// an HTTP header.
    pub fn new(
        api_key: impl Into<String>,
        api_key_header: &str,
        max_retries: RetryBudget,
        conservation: ConservationPolicy,
    ) -> Result<Self> {
        let api_key = api_key.into();
        HeaderValue::from_str(&api_key)?;
        let snapshot = Snapshot {
            api_key: SecretString::from(api_key),
            api_key_header: HeaderName::try_from(api_key_header)?,
            max_retries,
            conservation,
        };
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// The current snapshot
    #[must_use]
    pub fn load(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Replace the API key
    ///
    /// # Errors
    ///
    /// Returns [`crate::ErrorKind::InvalidHeader`] if the key cannot be sent in a
    /// header. The previous key stays in effect.
    pub fn set_api_key(&self, api_key: impl Into<String>) -> Result<()> {
        let api_key = api_key.into();
        HeaderValue::from_str(&api_key)?;
        self.update(|current| Snapshot {
            api_key: SecretString::from(api_key),
            ..current.rebuild()
        });
        Ok(())
    }

    /// Replace the retry budget
    pub fn set_max_retries(&self, max_retries: RetryBudget) {
        self.update(|current| Snapshot {
            max_retries,
            ..current.rebuild()
        });
    }

    /// Replace the usage conservation policy.
    ///
    /// Percentages are validated when the [`ConservationPolicy`] is created,
    /// so an out-of-range value never reaches the settings.
    pub fn set_conservation(&self, conservation: ConservationPolicy) {
        self.update(|current| Snapshot {
            conservation,
            ..current.rebuild()
        });
    }

    fn update(&self, change: impl FnOnce(&Snapshot) -> Snapshot) {
        let mut current = self.current.write();
        *current = Arc::new(change(&current));
        log::debug!("Settings updated");
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot {
                api_key: SecretString::from(String::new()),
                api_key_header: HeaderName::from_static("x-api-key"),
                max_retries: RetryBudget::default(),
                conservation: ConservationPolicy::default(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;
    use crate::ErrorKind;
    use crate::ratelimit::ScopeKind;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        let snapshot = settings.load();
        assert_eq!(snapshot.max_retries(), RetryBudget::Limited(3));
        assert_eq!(snapshot.api_key_header().as_str(), "x-api-key");
        assert!(snapshot.credential().is_none());
    }

    #[test]
    fn test_credential_header() {
        let settings = Settings::new(
            "RGAPI-123",
            "X-Riot-Token",
            RetryBudget::default(),
            ConservationPolicy::default(),
        )
        .unwrap();
        let (name, value) = settings.load().credential().unwrap();
        assert_eq!(name.as_str(), "x-riot-token");
        assert_eq!(value.to_str().unwrap(), "RGAPI-123");
        assert!(value.is_sensitive());
    }

    #[test]
    fn test_invalid_header_name() {
        let settings = Settings::new(
            "key",
            "not a header",
            RetryBudget::default(),
            ConservationPolicy::default(),
        );
        assert!(matches!(settings, Err(ErrorKind::InvalidHeaderName(_))));
    }

    #[test]
    fn test_invalid_api_key_keeps_previous() {
        let settings = Settings::default();
        settings.set_api_key("first").unwrap();
        assert!(settings.set_api_key("bad\nkey").is_err());
        assert_eq!(settings.load().api_key().expose_secret(), "first");
    }

    #[test]
    fn test_snapshots_are_stable() {
        let settings = Settings::default();
        let before = settings.load();
        settings.set_max_retries(RetryBudget::Unlimited);
        let policy = ConservationPolicy::new(30, 10, ["match-v5.getMatch"]).unwrap();
        settings.set_conservation(policy.clone());

        assert_eq!(before.max_retries(), RetryBudget::Limited(3));
        let after = settings.load();
        assert_eq!(after.max_retries(), RetryBudget::Unlimited);
        assert_eq!(after.conservation(), &policy);
        assert_eq!(
            after
                .conservation()
                .effective_ceiling(100, ScopeKind::Region, "any"),
            70
        );
    }
}
