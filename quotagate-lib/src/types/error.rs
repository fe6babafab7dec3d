use http::StatusCode;
use std::hash::Hash;
use thiserror::Error;

use crate::ratelimit::{Cancelled, RateLimitError};
use crate::transport::TransportError;
use crate::Exchange;

/// Possible errors when dispatching requests through `quotagate_lib`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The request context was cancelled or its deadline passed
    #[error("Request was cancelled before it completed")]
    Cancelled,

    /// No response was obtained from the remote side
    #[error("Network error while sending request: {0}")]
    Transport(#[source] TransportError),

    /// The remote side rejected the request and it won't be retried
    #[error("Request to {} was rejected with status code {}", .0.url, .0.status)]
    RejectedStatusCode(Box<Exchange>),

    /// The remote side answered `429 Too Many Requests` and the retry budget is spent
    #[error("Rate limit exceeded for {} after all retries", .0.url)]
    RateLimitExceeded(Box<Exchange>),

    /// The response body could not be decoded into the requested type
    #[error("Cannot decode response body from {url}: {source}")]
    Decode {
        /// The URL the body was fetched from
        url: url::Url,
        /// The underlying decoding error
        #[source]
        source: serde_json::Error,
    },

    /// The given header could not be parsed.
    /// A possible error when converting a `HeaderValue` from a string or byte
    /// slice.
    #[error("Header could not be parsed.")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// The given header name is not valid
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// The request client cannot be built
    #[error("Error creating request client: {0}")]
    BuildRequestClient(#[source] reqwest::Error),

    /// Invalid rate limit settings
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    /// The dispatcher no longer accepts requests
    #[error("The dispatcher was shut down and cannot accept requests")]
    DispatcherClosed,
}

impl ErrorKind {
    /// Return the HTTP status code of the rejected exchange, if there is one
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.exchange().map(|exchange| exchange.status)
    }

    /// Return the rejected exchange, if the remote side answered at all
    #[must_use]
    pub fn exchange(&self) -> Option<&Exchange> {
        match self {
            Self::RejectedStatusCode(exchange) | Self::RateLimitExceeded(exchange) => {
                Some(exchange)
            }
            _ => None,
        }
    }
}

impl From<Cancelled> for ErrorKind {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Transport(e1), Self::Transport(e2)) => e1.to_string() == e2.to_string(),
            (Self::RejectedStatusCode(e1), Self::RejectedStatusCode(e2))
            | (Self::RateLimitExceeded(e1), Self::RateLimitExceeded(e2)) => {
                e1.status == e2.status && e1.url == e2.url
            }
            (Self::Decode { url: u1, .. }, Self::Decode { url: u2, .. }) => u1 == u2,
            (Self::RateLimit(e1), Self::RateLimit(e2)) => e1 == e2,
            (Self::Cancelled, Self::Cancelled)
            | (Self::InvalidHeader(_), Self::InvalidHeader(_))
            | (Self::InvalidHeaderName(_), Self::InvalidHeaderName(_))
            | (Self::DispatcherClosed, Self::DispatcherClosed) => true,
            _ => false,
        }
    }
}

impl Eq for ErrorKind {}

impl Hash for ErrorKind {
    fn hash<H>(&self, state: &mut H)
    where
        H: std::hash::Hasher,
    {
        match self {
            Self::Transport(e) => e.to_string().hash(state),
            Self::RejectedStatusCode(e) | Self::RateLimitExceeded(e) => {
                (e.status, &e.url).hash(state);
            }
            Self::Decode { url, .. } => url.hash(state),
            Self::InvalidHeader(e) => e.to_string().hash(state),
            Self::InvalidHeaderName(e) => e.to_string().hash(state),
            Self::BuildRequestClient(e) => e.to_string().hash(state),
            Self::RateLimit(e) => e.to_string().hash(state),
            Self::Cancelled | Self::DispatcherClosed => {
                std::mem::discriminant(self).hash(state);
            }
        }
    }
}
