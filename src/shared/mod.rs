pub mod errors;
pub mod retry;
pub mod shutdown;
pub mod time;

pub use errors::*;
pub use retry::{retry_with_backoff, RetryConfig};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
pub use time::now_utc;
