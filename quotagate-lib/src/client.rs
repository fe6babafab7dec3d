//! Rate limited access to the remote API.
//!
//! This module defines two structs, [`Client`] and [`ClientBuilder`].
//! `Client` sends requests through the [`Dispatcher`] and returns their
//! outcome. `ClientBuilder` exposes a finer level of granularity for building
//! a `Client`.
#![allow(clippy::module_name_repetitions)]

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use typed_builder::TypedBuilder;
use url::Url;

use crate::dispatcher::Dispatcher;
use crate::ratelimit::{ConservationPolicy, RateLimitConfig, ScopeKey, ScopeStatsMap};
use crate::settings::DEFAULT_API_KEY_HEADER;
use crate::transport::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, ReqwestTransport, Transport};
use crate::{Context, ErrorKind, Exchange, Request, Result, RetryBudget, Settings};

/// Builder for [`Client`].
///
/// See crate-level documentation for usage example.
#[derive(TypedBuilder, Debug)]
#[builder(field_defaults(default, setter(into)))]
#[builder(builder_method(doc = "
Create a builder for building `ClientBuilder`.

On the builder call, call methods with same name as its fields to set their values.

Finally, call `.build()` to create the instance of `ClientBuilder`.
"))]
pub struct ClientBuilder {
    /// API key sent with every request.
    ///
    /// Without a key no credential header is sent.
    api_key: Option<SecretString>,
    /// Name of the header carrying the API key
    #[builder(default_code = "String::from(DEFAULT_API_KEY_HEADER)")]
    api_key_header: String,
    /// How often a failed request is retried before its error is returned.
    ///
    /// Requests rejected as malformed or unauthorized are never retried.
    max_retries: RetryBudget,
    /// Share of the advertised capacity to leave unused
    conservation: ConservationPolicy,
    /// Delays and initial capacities of the rate limiter
    rate_limit: RateLimitConfig,
    /// Response timeout per exchange.
    #[builder(default = Some(Duration::from_secs(DEFAULT_TIMEOUT)))]
    timeout: Option<Duration>,
    /// User-agent sent with every request
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)")]
    user_agent: String,
}

impl Default for ClientBuilder {
    #[must_use]
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientBuilder {
    /// Instantiates a [`Client`].
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The user-agent, the API key or its header name is invalid.
    /// - The rate limit configuration is invalid.
    /// - The request client cannot be created.
    ///   See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn client(self) -> Result<Client> {
        let transport = ReqwestTransport::new(self.timeout, &self.user_agent)?;
        self.client_with_transport(Arc::new(transport))
    }

    /// Instantiates a [`Client`] which performs its exchanges with the given
    /// [`Transport`]. Timeout and user agent are left to the transport.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the API key, its header name or the rate limit
    /// configuration is invalid.
    pub fn client_with_transport(self, transport: Arc<dyn Transport>) -> Result<Client> {
        self.rate_limit.validate()?;

        let api_key = self
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().to_owned())
            .unwrap_or_default();
        let settings = Settings::new(
            api_key,
            &self.api_key_header,
            self.max_retries,
            self.conservation,
        )?;

        let dispatcher = Dispatcher::new(transport, Arc::new(settings), self.rate_limit);
        Ok(Client {
            dispatcher: Arc::new(dispatcher),
        })
    }
}

/// Sends requests through the rate limiter and returns their outcome.
///
/// Cloning a client is cheap; all clones share the same limits and settings.
///
/// See [`ClientBuilder`] which contains sane defaults for all configuration options.
#[derive(Debug, Clone)]
pub struct Client {
    dispatcher: Arc<Dispatcher>,
}

impl Client {
    /// Fetch `url`, counted against the `region` scope and the `method` scope
    /// within it. Higher `priority` values are served first.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the request was cancelled through `ctx`, if no
    /// response could be obtained within the retry budget, or if the remote
    /// side answered with a non-success status. See [`ErrorKind`].
    pub async fn get(
        &self,
        ctx: Context,
        priority: i32,
        region: impl Into<ScopeKey>,
        method: impl Into<String>,
        url: Url,
    ) -> Result<Exchange> {
        let (request, receiver) = Request::new(ctx, priority, region, method, url);
        self.dispatcher.submit(request);
        receiver.await.map_err(|_| ErrorKind::DispatcherClosed)?
    }

    /// Submit a request without waiting for it.
    /// The outcome arrives on the request's receiver.
    pub fn submit(&self, request: Request) {
        self.dispatcher.submit(request);
    }

    /// Runtime-tunable settings shared with the dispatcher
    #[must_use]
    pub fn settings(&self) -> &Settings {
        self.dispatcher.settings()
    }

    /// Statistics per region scope
    #[must_use]
    pub fn scope_stats(&self) -> ScopeStatsMap {
        self.dispatcher.region_stats()
    }

    /// Statistics per method scope
    #[must_use]
    pub fn method_stats(&self) -> ScopeStatsMap {
        self.dispatcher.method_stats()
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;
    use std::time::Duration;
    use test_utils::mock_server;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::ClientBuilder;
    use crate::ratelimit::{ConservationPolicy, RateLimitConfig, RateLimitError};
    use crate::{Context, ErrorKind, RetryBudget};

    fn fast() -> RateLimitConfig {
        RateLimitConfig {
            cooldown: Duration::from_millis(50),
            fallback_release: Duration::from_millis(50),
            ..RateLimitConfig::default()
        }
    }

    #[tokio::test]
    async fn test_get() {
        let mock_server = mock_server!(StatusCode::OK, set_body_string("{\"id\":7}"));
        let client = ClientBuilder::builder()
            .rate_limit(fast())
            .build()
            .client()
            .unwrap();

        let exchange = client
            .get(
                Context::new(),
                0,
                "na1",
                "status-v4.getPlatformData",
                mock_server.uri().parse().unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(exchange.status, StatusCode::OK);
        assert_eq!(exchange.body, "{\"id\":7}");

        let stats = client.scope_stats();
        assert_eq!(stats.get("na1").unwrap().successful_requests, 1);
        assert_eq!(
            client
                .method_stats()
                .get("na1:status-v4.getPlatformData")
                .unwrap()
                .total_requests,
            1
        );
    }

    #[tokio::test]
    async fn test_api_key_header() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-riot-token", "RGAPI-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = ClientBuilder::builder()
            .api_key(SecretString::from("RGAPI-1".to_string()))
            .api_key_header("X-Riot-Token")
            .rate_limit(fast())
            .build()
            .client()
            .unwrap();
        client
            .get(
                Context::new(),
                0,
                "kr",
                "league-v4.getChallengerLeague",
                mock_server.uri().parse().unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_forbidden_is_delivered() {
        let mock_server = mock_server!(StatusCode::FORBIDDEN);
        let client = ClientBuilder::builder()
            .max_retries(RetryBudget::Unlimited)
            .rate_limit(fast())
            .build()
            .client()
            .unwrap();

        let err = client
            .get(
                Context::new(),
                0,
                "euw1",
                "match-v5.getMatch",
                mock_server.uri().parse().unwrap(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_invalid_rate_limit_config() {
        let result = ClientBuilder::builder()
            .rate_limit(RateLimitConfig {
                initial_capacity: 0,
                ..RateLimitConfig::default()
            })
            .build()
            .client();
        assert_eq!(
            result.unwrap_err(),
            ErrorKind::RateLimit(RateLimitError::ZeroInitialCapacity)
        );
    }

    #[tokio::test]
    async fn test_runtime_settings() {
        let client = ClientBuilder::default().client().unwrap();
        let policy = ConservationPolicy::new(20, 0, Vec::<String>::new()).unwrap();
        client.settings().set_conservation(policy.clone());
        client.settings().set_max_retries(RetryBudget::Limited(0));

        let snapshot = client.settings().load();
        assert_eq!(snapshot.conservation(), &policy);
        assert_eq!(snapshot.max_retries(), RetryBudget::Limited(0));
    }
}
