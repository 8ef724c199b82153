//! Per-node shard distributor.
//!
//! Given the peers a membership source reports as alive and a total shard
//! count, every node independently computes the shards it owns and publishes
//! each change of that set on a channel. Peers that observe the same alive set
//! agree on a complete, non-overlapping partition without talking to each other.

pub mod assignment;
pub mod config;
pub mod distributor;
pub mod error;
mod metrics_consts;
pub mod node_state;
pub mod types;
mod watcher;

pub use distributor::Distributor;
pub use error::{Error, Result};
pub use node_state::{InMemoryNodeState, NodeStateSource};
pub use types::{ShardConfig, ShardUpdates, WatcherStatus};
