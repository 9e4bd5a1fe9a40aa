//! Cordoning and draining Kubernetes Nodes.
//!
//! A drain marks the Node unschedulable, selects the Pods that have to leave it, and removes them
//! through the Eviction API (or plain deletion when the cluster lacks it) under a single deadline.
mod client;
pub mod drain;
mod error;
pub mod eviction;
#[cfg(any(feature = "mockall", test))]
pub mod fake;
pub mod pods;
pub mod provider;

pub use self::client::*;
pub use self::drain::{CordonOutcome, Drainer, NodeDrainer, RemovalOutcome};
pub use self::error::{DrainError, Result};
pub use self::pods::RemovalSet;

#[cfg(any(feature = "mockall", test))]
pub use self::drain::MockDrainer;

use tokio::time::Duration;

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Controls which Pods a drain removes and how long it may take.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrainOptions {
    /// Remove Pods without a controller, and Pods of DaemonSets which no longer exist.
    pub force: bool,
    /// Leave DaemonSet-managed Pods in place instead of failing the drain.
    pub ignore_all_daemon_sets: bool,
    /// Remove Pods using `emptyDir` volumes. Their data is lost.
    pub delete_local_data: bool,
    /// Overrides each Pod's termination grace period. `None` uses the Pod's own value.
    pub grace_period_seconds: Option<u32>,
    /// Bounds the whole removal phase. Zero waits indefinitely.
    pub timeout: Duration,
    /// Label selector restricting which Nodes may be drained.
    pub selector: Option<String>,
    /// Label selector restricting which Pods are removed.
    pub pod_selector: Option<String>,
    /// Pause between cordoning and removing Pods.
    pub drain_delay: Duration,
}

impl Default for DrainOptions {
    fn default() -> Self {
        DrainOptions {
            force: false,
            ignore_all_daemon_sets: true,
            delete_local_data: true,
            grace_period_seconds: None,
            timeout: DEFAULT_DRAIN_TIMEOUT,
            selector: None,
            pod_selector: None,
            drain_delay: Duration::ZERO,
        }
    }
}
