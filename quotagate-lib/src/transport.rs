//! Performing a single HTTP exchange.
//!
//! The dispatcher only needs to send one GET request and look at the status,
//! headers and body of the answer. [`Transport`] is that seam; the default
//! [`ReqwestTransport`] sends requests with [`reqwest`].

use async_trait::async_trait;
use http::header::{self, HeaderMap, HeaderValue};
use std::fmt::Debug;
use std::time::Duration;
use url::Url;

use crate::{ErrorKind, Exchange, Result};

/// Default timeout in seconds before a single exchange is abandoned, 20.
pub const DEFAULT_TIMEOUT: u64 = 20;

/// Default user agent, `quotagate/<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("quotagate/", env!("CARGO_PKG_VERSION"));

/// Failure to obtain any response from the remote side
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Sends a single GET request and returns whatever the remote side answered.
///
/// Non-success status codes are *not* errors at this level; they are returned
/// as an [`Exchange`] and interpreted by the dispatcher. An `Err` means that
/// no response was received at all.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Perform one exchange with the given extra request headers
    async fn get(
        &self,
        url: &Url,
        headers: HeaderMap,
    ) -> std::result::Result<Exchange, TransportError>;
}

/// [`Transport`] backed by a [`reqwest::Client`]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the given response timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The user-agent is invalid.
    /// - The request client cannot be created.
    ///   See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn new(timeout: Option<Duration>, user_agent: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_str(user_agent)?);

        let builder = reqwest::ClientBuilder::new()
            .gzip(true)
            .default_headers(headers);

        let client = (match timeout {
            Some(t) => builder.timeout(t),
            None => builder,
        })
        .build()
        .map_err(ErrorKind::BuildRequestClient)?;

        Ok(Self { client })
    }

    /// Wrap an already configured [`reqwest::Client`]
    #[must_use]
    pub const fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(
        &self,
        url: &Url,
        headers: HeaderMap,
    ) -> std::result::Result<Exchange, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .headers(headers)
            .send()
            .await?;
        Ok(Exchange::from_response(response).await?)
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, HeaderValue, StatusCode};
    use std::time::Duration;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{ReqwestTransport, Transport};
    use test_utils::mock_server;

    #[tokio::test]
    async fn test_non_success_is_not_an_error() {
        let mock_server = mock_server!(StatusCode::NOT_FOUND, set_body_string("missing"));
        let transport = ReqwestTransport::new(None, "quotagate-test").unwrap();

        let exchange = transport
            .get(&mock_server.uri().parse().unwrap(), HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(exchange.status, StatusCode::NOT_FOUND);
        assert_eq!(exchange.body, "missing");
    }

    #[tokio::test]
    async fn test_extra_headers_are_sent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-api-key", "secret"))
            .and(header("user-agent", "quotagate-test"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new(None, "quotagate-test").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("secret"));
        let exchange = transport
            .get(&mock_server.uri().parse().unwrap(), headers)
            .await
            .unwrap();
        assert_eq!(exchange.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_timeout_is_a_transport_error() {
        // Note: this checks response timeout, not connect timeout.
        let mock_delay = Duration::from_millis(200);
        let timeout = Duration::from_millis(10);
        assert!(mock_delay > timeout);

        let mock_server = mock_server!(StatusCode::OK, set_delay(mock_delay));
        let transport = ReqwestTransport::new(Some(timeout), "quotagate-test").unwrap();
        let result = transport
            .get(&mock_server.uri().parse().unwrap(), HeaderMap::new())
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_user_agent() {
        assert!(ReqwestTransport::new(None, "bad\nagent").is_err());
    }
}
