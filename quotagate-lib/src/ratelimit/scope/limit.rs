use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{ScopeKey, ScopeKind, ScopeStats};
use crate::Context;
use crate::ratelimit::headers::Quota;
use crate::ratelimit::{AdmissionLimiter, Cancelled};

/// Rate limiting state of one scope.
///
/// Each scope owns:
/// - A limiter for the short rate limit window
/// - A limiter for the long rate limit window
/// - A deadline before which no request may be admitted, set when the remote
///   side reports the scope as saturated
/// - Statistics about the responses seen in this scope
#[derive(Debug)]
pub struct ScopeLimit {
    key: ScopeKey,
    kind: ScopeKind,
    short: Arc<AdmissionLimiter>,
    long: Arc<AdmissionLimiter>,
    blocked_until: Mutex<Option<Instant>>,
    stats: Mutex<ScopeStats>,
}

impl ScopeLimit {
    /// Create the state of a scope nobody has used yet
    #[must_use]
    pub fn new(key: ScopeKey, kind: ScopeKind, initial_capacity: usize) -> Self {
        Self {
            key,
            kind,
            short: Arc::new(AdmissionLimiter::new(initial_capacity)),
            long: Arc::new(AdmissionLimiter::new(initial_capacity)),
            blocked_until: Mutex::new(None),
            stats: Mutex::new(ScopeStats::default()),
        }
    }

    /// The key of this scope
    #[must_use]
    pub const fn key(&self) -> &ScopeKey {
        &self.key
    }

    /// Whether this is a region or a method scope
    #[must_use]
    pub const fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Limiter of the short window
    #[must_use]
    pub const fn short(&self) -> &Arc<AdmissionLimiter> {
        &self.short
    }

    /// Limiter of the long window
    #[must_use]
    pub const fn long(&self) -> &Arc<AdmissionLimiter> {
        &self.long
    }

    /// The instant the current block ends, if the scope is blocked right now
    #[must_use]
    pub fn blocked_until(&self) -> Option<Instant> {
        let blocked_until = *self.blocked_until.lock();
        blocked_until.filter(|until| *until > Instant::now())
    }

    /// Whether the scope is blocked right now
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.blocked_until().is_some()
    }

    /// Block the scope for `duration` from now. An existing block that ends
    /// later is kept.
    pub fn block_for(&self, duration: Duration) {
        let until = Instant::now() + duration;
        {
            let mut blocked_until = self.blocked_until.lock();
            if blocked_until.is_some_and(|current| current >= until) {
                return;
            }
            *blocked_until = Some(until);
        }
        self.stats.lock().record_block();
        log::debug!(
            "Blocking {} scope {} for {}ms",
            self.kind,
            self.key,
            duration.as_millis()
        );
    }

    /// Block the scope for `duration` unless it is blocked already
    fn block_unless_blocked(&self, duration: Duration) -> bool {
        let now = Instant::now();
        let mut blocked_until = self.blocked_until.lock();
        if blocked_until.is_some_and(|until| until > now) {
            return false;
        }
        *blocked_until = Some(now + duration);
        true
    }

    /// Apply an advertised quota to one of this scope's limiters.
    ///
    /// The limiter is resized to `ceiling`. If the reported usage already
    /// reached the ceiling, the scope is blocked for the quota's window.
    pub(crate) fn apply_quota(&self, limiter: &AdmissionLimiter, quota: &Quota, ceiling: usize) {
        if quota.count >= ceiling && self.block_unless_blocked(quota.window) {
            self.stats.lock().record_block();
            log::debug!(
                "{} scope {} used {} of {} requests within {}s, blocking until the window ends",
                self.kind,
                self.key,
                quota.count,
                ceiling,
                quota.window.as_secs()
            );
        }
        limiter.set_capacity(ceiling);
    }

    /// Get scope statistics
    #[must_use]
    pub fn stats(&self) -> ScopeStats {
        self.stats.lock().clone()
    }

    pub(crate) fn record_response(&self, status: http::StatusCode) {
        self.stats.lock().record_response(status);
    }

    pub(crate) fn record_transport_error(&self) {
        self.stats.lock().record_transport_error();
    }
}

/// Wait until none of `scopes` is blocked.
///
/// Blocks can be extended while waiting, so the check is repeated after
/// every wake-up.
pub(crate) async fn wait_unblocked(
    ctx: &Context,
    scopes: &[&ScopeLimit],
) -> Result<(), Cancelled> {
    loop {
        let Some(until) = scopes.iter().filter_map(|scope| scope.blocked_until()).max() else {
            return Ok(());
        };
        tokio::select! {
            biased;
            () = ctx.done() => return Err(Cancelled),
            () = tokio::time::sleep_until(until) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn scope() -> ScopeLimit {
        ScopeLimit::new(ScopeKey::from("na1"), ScopeKind::Region, 1)
    }

    #[test]
    fn test_new_scope_is_unblocked() {
        let scope = scope();
        assert!(!scope.is_blocked());
        assert_eq!(scope.short().capacity(), 1);
        assert_eq!(scope.long().capacity(), 1);
        assert_eq!(scope.kind(), ScopeKind::Region);
    }

    #[tokio::test]
    async fn test_block_is_never_shortened() {
        let scope = scope();
        scope.block_for(Duration::from_secs(10));
        let until = scope.blocked_until().unwrap();
        scope.block_for(Duration::from_secs(1));
        assert_eq!(scope.blocked_until(), Some(until));
        assert_eq!(scope.stats().blocks, 1);
    }

    #[tokio::test]
    async fn test_conservation_ceiling_limits_admission() {
        let scope = scope();
        let quota = Quota {
            limit: 100,
            count: 100,
            window: Duration::from_secs(10),
        };
        scope.apply_quota(scope.short(), &quota, 70);
        assert_eq!(scope.short().capacity(), 70);
        assert!(scope.is_blocked(), "usage reached the ceiling");

        let ctx = Context::new();
        for _ in 0..70 {
            scope.short().obtain(&ctx, 0).await.unwrap();
        }
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), scope.short().obtain(&ctx, 0)).await;
        assert!(blocked.is_err(), "71st admission must wait");

        scope.short().release();
        scope.short().obtain(&ctx, 0).await.unwrap();
    }

    #[tokio::test]
    async fn test_quota_below_ceiling_does_not_block() {
        let scope = scope();
        let quota = Quota {
            limit: 20,
            count: 3,
            window: Duration::from_secs(1),
        };
        scope.apply_quota(scope.short(), &quota, 19);
        assert!(!scope.is_blocked());
        assert_eq!(scope.short().capacity(), 19);
    }

    #[tokio::test]
    async fn test_existing_block_is_kept_when_quota_is_exhausted() {
        let scope = scope();
        scope.block_for(Duration::from_secs(30));
        let until = scope.blocked_until();
        let quota = Quota {
            limit: 20,
            count: 20,
            window: Duration::from_secs(1),
        };
        scope.apply_quota(scope.short(), &quota, 19);
        assert_eq!(scope.blocked_until(), until);
    }

    #[tokio::test]
    async fn test_wait_unblocked() {
        let region = scope();
        let method = ScopeLimit::new(ScopeKey::from("na1:m"), ScopeKind::Method, 1);
        region.block_for(Duration::from_millis(50));
        method.block_for(Duration::from_millis(120));

        let start = Instant::now();
        wait_unblocked(&Context::new(), &[&region, &method])
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_wait_unblocked_is_cancellable() {
        let region = scope();
        region.block_for(Duration::from_secs(60));
        let ctx = Context::with_timeout(Duration::from_millis(20));
        assert_eq!(wait_unblocked(&ctx, &[&region]).await, Err(Cancelled));
    }
}
