pub mod dedup;
pub mod delay;
pub mod retry;
pub mod tasks;

pub use dedup::{DedupGuard, PathDedupSet};
pub use delay::ShutdownToken;
pub use retry::RetryPolicy;
pub use tasks::TaskGroup;
