//! The single entry point that moves requests through the rate limiter.
//!
//! Every submitted [`Request`] runs through the same steps in its own task:
//!
//! 1. Resolve the region scope and the method scope.
//! 2. Wait until neither scope is blocked.
//! 3. Obtain a slot in the region's short and long window and in the method's
//!    short window, in that order.
//! 4. Perform the exchange with the credential header attached.
//! 5. Interpret the response: deliver it, adapt the limits from its headers,
//!    block scopes, retry, or give up.
//!
//! Slots are returned with a delay matching the window they were counted in,
//! so the number of requests in flight plus those recently finished never
//! exceeds what the remote side advertised.

use http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ratelimit::headers::{self, LimitType};
use crate::ratelimit::{
    AdmissionLimiter, Cancelled, RateLimitConfig, ScopeKind, ScopeLimit, ScopeRegistry,
    ScopeStatsMap, wait_unblocked,
};
use crate::retry::{Disposition, RetryExt};
use crate::transport::Transport;
use crate::{Context, ErrorKind, Request, Settings};

/// Slots held by one request, in acquisition order.
/// Whatever is still held when this is dropped is released right away.
#[derive(Debug)]
struct Slots(Vec<Arc<AdmissionLimiter>>);

impl Slots {
    /// Obtain one slot from each limiter in order. On failure the slots
    /// obtained so far are given back.
    async fn obtain(
        ctx: &Context,
        priority: i32,
        limiters: [&Arc<AdmissionLimiter>; 3],
    ) -> Result<Self, Cancelled> {
        let mut slots = Self(Vec::with_capacity(limiters.len()));
        for limiter in limiters {
            limiter.obtain(ctx, priority).await?;
            slots.0.push(Arc::clone(limiter));
        }
        Ok(slots)
    }

    /// Give all slots back once `delay` has passed
    fn release_after(mut self, delay: Duration) {
        for limiter in self.0.drain(..) {
            limiter.release_after(delay);
        }
    }

    /// Stop tracking the slots; the caller takes over releasing them
    fn forget(mut self) {
        self.0.clear();
    }
}

impl Drop for Slots {
    fn drop(&mut self) {
        for limiter in self.0.drain(..) {
            limiter.release();
        }
    }
}

/// What the intake and every request task share
#[derive(Debug)]
struct Shared {
    transport: Arc<dyn Transport>,
    settings: Arc<Settings>,
    config: RateLimitConfig,
    regions: ScopeRegistry,
    methods: ScopeRegistry,
    intake: mpsc::UnboundedSender<Request>,
}

/// Admits, executes and retries requests against the rate limits of their
/// scopes.
///
/// The dispatcher must be created inside a tokio runtime. Dropping it stops
/// the intake; requests that are still queued or want to be retried after
/// that are answered with [`ErrorKind::DispatcherClosed`].
#[derive(Debug)]
pub struct Dispatcher {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// Create a dispatcher and start its intake
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        settings: Arc<Settings>,
        config: RateLimitConfig,
    ) -> Self {
        let (intake, requests) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            transport,
            settings,
            config,
            regions: ScopeRegistry::new(ScopeKind::Region, config.initial_capacity),
            methods: ScopeRegistry::new(ScopeKind::Method, config.initial_capacity),
            intake,
        });
        let shutdown = CancellationToken::new();
        tokio::spawn(run_intake(
            Arc::clone(&shared),
            requests,
            shutdown.clone(),
        ));
        Self { shared, shutdown }
    }

    /// Submit a request. Its outcome arrives on the receiver returned by
    /// [`Request::new`], exactly once.
    pub fn submit(&self, request: Request) {
        self.shared.enqueue(request);
    }

    /// The settings used by this dispatcher
    #[must_use]
    pub fn settings(&self) -> &Arc<Settings> {
        &self.shared.settings
    }

    /// Statistics per region scope
    #[must_use]
    pub fn region_stats(&self) -> ScopeStatsMap {
        self.shared.regions.stats()
    }

    /// Statistics per method scope
    #[must_use]
    pub fn method_stats(&self) -> ScopeStatsMap {
        self.shared.methods.stats()
    }

    /// The region scopes known so far
    #[must_use]
    pub fn regions(&self) -> &ScopeRegistry {
        &self.shared.regions
    }

    /// The method scopes known so far
    #[must_use]
    pub fn methods(&self) -> &ScopeRegistry {
        &self.shared.methods
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Hand each incoming request to its own task until the dispatcher is gone
async fn run_intake(
    shared: Arc<Shared>,
    mut requests: mpsc::UnboundedReceiver<Request>,
    shutdown: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };
        tokio::spawn(Arc::clone(&shared).dispatch(request));
    }

    requests.close();
    while let Ok(request) = requests.try_recv() {
        request.deliver(Err(ErrorKind::DispatcherClosed));
    }
    log::debug!("Dispatcher intake stopped");
}

impl Shared {
    fn enqueue(&self, request: Request) {
        if let Err(mpsc::error::SendError(request)) = self.intake.send(request) {
            request.deliver(Err(ErrorKind::DispatcherClosed));
        }
    }

    /// Send a request through the intake once more
    fn resubmit(&self, mut request: Request) {
        request.retries += 1;
        log::debug!(
            "Retrying {} (attempt {})",
            request.url(),
            request.retries + 1
        );
        self.enqueue(request);
    }

    fn may_retry(&self, request: &Request) -> bool {
        self.settings.load().max_retries().allows(request.retries())
    }

    async fn dispatch(self: Arc<Self>, request: Request) {
        let region = self.regions.get_or_create(request.region());
        let method = self.methods.get_or_create(&request.method_scope());

        let slots = match self.admit(&request, &region, &method).await {
            Ok(slots) => slots,
            Err(Cancelled) => {
                log::debug!("Request to {} cancelled while waiting", request.url());
                request.deliver(Err(ErrorKind::Cancelled));
                return;
            }
        };
        log::trace!(
            "Admitted {} in {} with priority {}",
            request.url(),
            method.key(),
            request.priority()
        );

        self.execute(request, &region, &method, slots).await;
    }

    async fn admit(
        &self,
        request: &Request,
        region: &ScopeLimit,
        method: &ScopeLimit,
    ) -> Result<Slots, Cancelled> {
        let ctx = request.context();
        wait_unblocked(ctx, &[region, method]).await?;
        Slots::obtain(
            ctx,
            request.priority(),
            [region.short(), region.long(), method.short()],
        )
        .await
    }

    /// Perform the exchange until the request reaches a terminal state or
    /// goes back through the intake
    async fn execute(
        &self,
        mut request: Request,
        region: &ScopeLimit,
        method: &ScopeLimit,
        slots: Slots,
    ) {
        loop {
            if wait_unblocked(request.context(), &[region, method])
                .await
                .is_err()
            {
                drop(slots);
                request.deliver(Err(ErrorKind::Cancelled));
                return;
            }

            let mut extra = HeaderMap::new();
            if let Some((name, value)) = self.settings.load().credential() {
                extra.insert(name, value);
            }

            let ctx = request.context().clone();
            let result = tokio::select! {
                biased;
                () = ctx.done() => None,
                result = self.transport.get(request.url(), extra) => Some(result),
            };

            let exchange = match result {
                Some(Ok(exchange)) => exchange,
                None => {
                    // The remote side may have counted the request already
                    slots.release_after(self.config.fallback_release);
                    request.deliver(Err(ErrorKind::Cancelled));
                    return;
                }
                Some(Err(e)) => {
                    region.record_transport_error();
                    method.record_transport_error();
                    log::debug!("No response from {}: {e}", request.url());
                    drop(slots);
                    if self.may_retry(&request) {
                        self.resubmit(request);
                    } else {
                        request.deliver(Err(ErrorKind::Transport(e)));
                    }
                    return;
                }
            };

            region.record_response(exchange.status);
            method.record_response(exchange.status);

            match exchange.status.disposition() {
                Disposition::Success => {
                    let headers = exchange.headers.clone();
                    let method_id = request.method().to_owned();
                    request.deliver(Ok(exchange));
                    self.adapt(&headers, region, method, &method_id, slots);
                    return;
                }
                Disposition::Rejected => {
                    log::debug!(
                        "Request to {} rejected with {}",
                        exchange.url,
                        exchange.status
                    );
                    slots.release_after(self.config.cooldown);
                    request.deliver(Err(ErrorKind::RejectedStatusCode(Box::new(exchange))));
                    return;
                }
                Disposition::Retry => {
                    slots.release_after(self.config.cooldown);
                    if self.may_retry(&request) {
                        self.resubmit(request);
                    } else {
                        request.deliver(Err(ErrorKind::RejectedStatusCode(Box::new(exchange))));
                    }
                    return;
                }
                Disposition::RateLimited => {
                    let retry_after =
                        headers::retry_after(&exchange.headers, self.config.default_retry_after);
                    self.block(&exchange.headers, region, method, retry_after);

                    if !self.may_retry(&request) {
                        log::warn!(
                            "Rate limit exceeded for {}, giving up after {} retries",
                            exchange.url,
                            request.retries()
                        );
                        slots.release_after(retry_after);
                        request.deliver(Err(ErrorKind::RateLimitExceeded(Box::new(exchange))));
                        return;
                    }

                    // Keep the slots and try again once the wait is over
                    let resume_at = Instant::now() + retry_after;
                    tokio::select! {
                        biased;
                        () = ctx.done() => {
                            slots.release_after(resume_at.saturating_duration_since(Instant::now()));
                            request.deliver(Err(ErrorKind::Cancelled));
                            return;
                        }
                        () = tokio::time::sleep_until(resume_at) => {}
                    }
                    request.retries += 1;
                }
            }
        }
    }

    /// Block the scope named by the response for `retry_after`
    fn block(
        &self,
        headers: &HeaderMap,
        region: &ScopeLimit,
        method: &ScopeLimit,
        retry_after: Duration,
    ) {
        match headers::limit_type(headers) {
            Some(LimitType::Application) => region.block_for(retry_after),
            Some(LimitType::Method) => method.block_for(retry_after),
            limit_type => {
                log::warn!(
                    "Rate limited in {} with limit type {}, waiting {}ms without a block",
                    method.key(),
                    limit_type.map_or_else(|| "unknown".to_string(), |t| t.to_string()),
                    retry_after.as_millis()
                );
                return;
            }
        }
        log::warn!(
            "Rate limited in {}, retrying after {}ms",
            method.key(),
            retry_after.as_millis()
        );
    }

    /// Resize the limiters from the limits advertised in a successful
    /// response and schedule the release of each slot after its window
    fn adapt(
        &self,
        headers: &HeaderMap,
        region: &ScopeLimit,
        method: &ScopeLimit,
        method_id: &str,
        slots: Slots,
    ) {
        let snapshot = self.settings.load();
        let conservation = snapshot.conservation();

        let app = headers::parse_quotas(
            headers,
            headers::APP_RATE_LIMIT,
            headers::APP_RATE_LIMIT_COUNT,
        );
        let per_method = headers::parse_quotas(
            headers,
            headers::METHOD_RATE_LIMIT,
            headers::METHOD_RATE_LIMIT_COUNT,
        );

        // Same order the slots were obtained in
        let targets = [
            (region, region.short(), app.first()),
            (region, region.long(), app.get(1)),
            (method, method.short(), per_method.first()),
        ];
        slots.forget();

        for (scope, limiter, quota) in targets {
            match quota {
                Some(quota) => {
                    let ceiling =
                        conservation.effective_ceiling(quota.limit, scope.kind(), method_id);
                    scope.apply_quota(limiter, quota, ceiling);
                    limiter.release_after(quota.window);
                }
                None => limiter.release_after(self.config.fallback_release),
            }
        }
    }
}
