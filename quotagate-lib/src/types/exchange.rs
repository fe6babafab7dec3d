use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::{ErrorKind, Result};

/// The outcome of one HTTP exchange with the remote API.
///
/// The dispatcher only looks at the status code and the rate limit headers;
/// decoding the body is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Response status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: String,
    /// The URL the request was sent to
    pub url: Url,
}

impl Exchange {
    /// Read status, headers and body from a [`reqwest::Response`]
    pub(crate) async fn from_response(response: reqwest::Response) -> reqwest::Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.text().await?;

        Ok(Self {
            status,
            headers,
            body,
            url,
        })
    }

    /// Decode the JSON body into `T`
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Decode`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|source| ErrorKind::Decode {
            url: self.url.clone(),
            source,
        })
    }
}
