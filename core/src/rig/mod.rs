//! Remote host plumbing: SSH coordinates, rsync transfers and remote command
//! records.
//!
//! Everything here is pure state and argument building. External commands
//! are built as argument vectors and handed to a
//! [`CommandRunner`](crate::infrastructure::CommandRunner) by the runners.

pub mod config;
pub mod remote;
pub mod sync;

pub use config::RemoteConfig;
pub use remote::{ExecStatus, RemoteExecution, RemoteExecutor};
pub use sync::{SyncDirection, SyncJob, SyncManager, SyncStatus};
