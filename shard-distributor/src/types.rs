use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

/// Snapshot of this node's view of the shard space.
///
/// `owned_shards` is always the complete result of one assignment pass; it is
/// replaced as a whole and never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardConfig {
    pub identity: String,
    pub num_shards: u32,
    /// Stringified shard indices in ascending order.
    pub owned_shards: Vec<String>,
}

impl ShardConfig {
    pub fn new(identity: impl Into<String>, num_shards: u32) -> Self {
        Self {
            identity: identity.into(),
            num_shards,
            owned_shards: Vec::new(),
        }
    }

    pub fn owns(&self, shard: u32) -> bool {
        let shard = shard.to_string();
        self.owned_shards.iter().any(|s| *s == shard)
    }
}

/// Consumer side of the distributor's update channel.
///
/// Every clone reads from the same underlying channel, so each published
/// `ShardConfig` is delivered to exactly one reader.
#[derive(Clone)]
pub struct ShardUpdates {
    rx: Arc<Mutex<mpsc::Receiver<ShardConfig>>>,
}

impl ShardUpdates {
    pub(crate) fn new(rx: mpsc::Receiver<ShardConfig>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Wait for the next ownership change. Returns `None` once the channel is
    /// closed, which happens when the distributor has been dropped.
    pub async fn recv(&self) -> Option<ShardConfig> {
        self.rx.lock().await.recv().await
    }

    /// Non-blocking variant of [`recv`](ShardUpdates::recv). Returns `None` if
    /// nothing is queued or another reader currently holds the channel.
    pub fn try_recv(&self) -> Option<ShardConfig> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

/// Health of the background membership watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherStatus {
    Running,
    /// Exited after `stop()`.
    Stopped,
    /// Exited on a panic. Ownership will not change again for the lifetime of
    /// the distributor.
    Failed { reason: String },
}

impl WatcherStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, WatcherStatus::Running)
    }
}
