//! Shard assignment engine.
//!
//! Pure functions from (sorted alive peers, local identity, shard count) to the
//! shards the local node owns. Every peer observing the same alive list and the
//! same shard count computes the same partition, so no coordination is needed
//! beyond agreeing on membership.

use std::str::FromStr;
use std::sync::Arc;

use crate::error::Error;

/// Maps a shard to the position of its owner in the sorted alive list.
///
/// Implementations must be deterministic and return a value in
/// `0..num_nodes` for any `num_nodes > 0`.
pub trait ShardStrategy: Send + Sync {
    fn owner_index(&self, shard: u32, num_nodes: usize) -> usize;
}

/// Shard `j` belongs to the peer at position `j mod len(alive)`.
///
/// Perfectly balanced, but adding or removing a peer shifts the index of every
/// peer after it, so most shards change owner on churn.
pub struct ModuloStrategy;

impl ShardStrategy for ModuloStrategy {
    fn owner_index(&self, shard: u32, num_nodes: usize) -> usize {
        shard as usize % num_nodes
    }
}

/// Places shards with jump consistent hash.
///
/// Going from N to N+1 peers moves only ~1/(N+1) of the shards. Peers are still
/// addressed by position, so removing a peer from the middle of the sorted list
/// moves more than that.
pub struct JumpHashStrategy;

impl ShardStrategy for JumpHashStrategy {
    fn owner_index(&self, shard: u32, num_nodes: usize) -> usize {
        jump_consistent_hash(u64::from(shard), num_nodes)
    }
}

/// Lamping & Veach, "A Fast, Minimal Memory, Consistent Hash Algorithm".
fn jump_consistent_hash(mut key: u64, num_buckets: usize) -> usize {
    let mut bucket: i64 = -1;
    let mut next: i64 = 0;

    while next < num_buckets as i64 {
        bucket = next;
        key = key.wrapping_mul(2862933555777941757).wrapping_add(1);
        next = ((bucket + 1) as f64 * ((1u64 << 31) as f64 / ((key >> 33) + 1) as f64)) as i64;
    }

    bucket.max(0) as usize
}

/// Strategy selector, parsed from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignmentStrategy {
    #[default]
    Modulo,
    JumpHash,
}

impl AssignmentStrategy {
    pub fn build(self) -> Arc<dyn ShardStrategy> {
        match self {
            AssignmentStrategy::Modulo => Arc::new(ModuloStrategy),
            AssignmentStrategy::JumpHash => Arc::new(JumpHashStrategy),
        }
    }
}

impl FromStr for AssignmentStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_ref() {
            "modulo" => Ok(AssignmentStrategy::Modulo),
            "jump_hash" | "jumphash" => Ok(AssignmentStrategy::JumpHash),
            _ => Err(Error::UnknownStrategy(s.to_string())),
        }
    }
}

/// Position of `identity` in the alive list, if present.
pub fn peer_index(alive: &[String], identity: &str) -> Option<usize> {
    alive.iter().position(|peer| peer == identity)
}

/// Shards owned by `identity` given the sorted alive list.
///
/// An empty alive list owns nothing. If `identity` is not in the list it is
/// treated as the peer at position 0; callers that need a stricter contract
/// check [`peer_index`] first.
pub fn assign(
    strategy: &dyn ShardStrategy,
    alive: &[String],
    identity: &str,
    num_shards: u32,
) -> Vec<String> {
    if alive.is_empty() {
        return Vec::new();
    }
    let my_index = peer_index(alive, identity).unwrap_or(0);
    shards_for_index(strategy, alive.len(), my_index, num_shards)
}

/// Shards owned by the peer at `index` among `num_nodes` peers.
pub fn shards_for_index(
    strategy: &dyn ShardStrategy,
    num_nodes: usize,
    index: usize,
    num_shards: u32,
) -> Vec<String> {
    if num_nodes == 0 {
        return Vec::new();
    }
    (0..num_shards)
        .filter(|&shard| strategy.owner_index(shard, num_nodes) == index)
        .map(|shard| shard.to_string())
        .collect()
}
