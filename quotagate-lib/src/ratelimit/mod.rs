//! Per-scope rate limiting and admission control.
//!
//! The remote API advertises its capacity per scope in response headers and
//! changes it at runtime. This module keeps the local view of those limits and
//! gates every outgoing request against it.
//!
//! # Architecture
//!
//! - [`AdmissionLimiter`]: Resizable concurrency gate with priority-ordered waiters
//! - [`ScopeKey`]: Identifies a region scope or a region+method scope
//! - [`ScopeLimit`]: Short and long window limiters plus a hard block for one scope
//! - [`ScopeRegistry`]: Creates and memoizes the [`ScopeLimit`] of each key
//! - [`ConservationPolicy`]: How much advertised capacity to hold back
//! - [`RateLimitConfig`]: Static tuning of delays and initial capacities
//! - [`ScopeStats`]: Statistics tracking for each scope

mod config;
mod error;
pub(crate) mod headers;
mod limiter;
mod scope;

pub use config::{ConservationPolicy, RateLimitConfig};
pub use error::RateLimitError;
pub use limiter::{AdmissionLimiter, Cancelled};
pub(crate) use scope::wait_unblocked;
pub use scope::{ScopeKey, ScopeKind, ScopeLimit, ScopeRegistry, ScopeStats, ScopeStatsMap};
