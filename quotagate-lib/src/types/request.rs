use tokio::sync::oneshot;
use url::Url;

use crate::ratelimit::ScopeKey;
use crate::{Context, Exchange, Result};

/// Receiving end of a [`Request`]'s result
pub type ResultReceiver = oneshot::Receiver<Result<Exchange>>;

/// A single GET request travelling through the dispatcher.
///
/// A request is submitted once. Retries reuse the same value with an
/// incremented retry counter, so the caller sees exactly one result on the
/// [`ResultReceiver`] returned by [`Request::new`].
#[derive(Debug)]
pub struct Request {
    pub(crate) ctx: Context,
    pub(crate) priority: i32,
    pub(crate) region: ScopeKey,
    pub(crate) method: String,
    pub(crate) url: Url,
    pub(crate) retries: u32,
    sink: oneshot::Sender<Result<Exchange>>,
}

impl Request {
    /// Create a request for `url` in the given `region` scope, calling the
    /// remote operation `method`. Higher `priority` values are served first.
    #[must_use]
    pub fn new(
        ctx: Context,
        priority: i32,
        region: impl Into<ScopeKey>,
        method: impl Into<String>,
        url: Url,
    ) -> (Self, ResultReceiver) {
        let (sink, receiver) = oneshot::channel();
        let request = Self {
            ctx,
            priority,
            region: region.into(),
            method: method.into(),
            url,
            retries: 0,
            sink,
        };
        (request, receiver)
    }

    /// The coarse scope this request counts against
    #[must_use]
    pub const fn region(&self) -> &ScopeKey {
        &self.region
    }

    /// The fine scope this request counts against: region and method combined
    #[must_use]
    pub fn method_scope(&self) -> ScopeKey {
        ScopeKey::method(&self.region, &self.method)
    }

    /// Identifier of the remote operation
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Target URL
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Priority of this request; higher is served sooner
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Number of retries performed so far
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    /// The execution context of this request
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.ctx
    }

    /// Deliver the terminal outcome to the caller
    pub(crate) fn deliver(self, result: Result<Exchange>) {
        if self.sink.send(result).is_err() {
            log::debug!("Caller stopped waiting for the result of {}", self.url);
        }
    }
}
