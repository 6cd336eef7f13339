pub mod lock;
pub mod secure_delete;

pub use lock::{FileLockState, FlockProbe, LockProbe};
pub use secure_delete::secure_delete;
