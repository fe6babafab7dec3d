#![allow(unreachable_pub)]

mod context;
mod error;
mod exchange;
mod request;
mod retry_budget;

pub use context::Context;
pub use error::ErrorKind;
pub use exchange::Exchange;
pub use request::{Request, ResultReceiver};
pub use retry_budget::{DEFAULT_MAX_RETRIES, RetryBudget};

/// The quotagate `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
