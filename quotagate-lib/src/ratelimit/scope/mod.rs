mod key;
mod limit;
mod registry;
mod stats;

pub use key::{ScopeKey, ScopeKind};
pub use limit::ScopeLimit;
pub(crate) use limit::wait_unblocked;
pub use registry::ScopeRegistry;
pub use stats::{ScopeStats, ScopeStatsMap};
