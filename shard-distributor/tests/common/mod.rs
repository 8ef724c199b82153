#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use shard_distributor::config::DistributorConfig;
use shard_distributor::error::{Error, Result};
use shard_distributor::{Distributor, InMemoryNodeState, NodeStateSource, ShardConfig, ShardUpdates};

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long to listen before concluding that nothing was published.
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

pub fn fast_config() -> DistributorConfig {
    DistributorConfig {
        max_poll_delay: Duration::from_millis(10),
        update_buffer: 16,
        ..Default::default()
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub async fn wait_for_condition<F, Fut>(timeout: Duration, interval: Duration, f: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if f().await {
            return;
        }
        tokio::time::sleep(interval).await;
    }
    panic!("condition not met within {timeout:?}");
}

pub async fn next_update(updates: &ShardUpdates) -> ShardConfig {
    tokio::time::timeout(WAIT_TIMEOUT, updates.recv())
        .await
        .expect("no shard update within timeout")
        .expect("update channel closed")
}

/// Read updates until one matches `f`, returning it.
pub async fn next_update_matching<F>(updates: &ShardUpdates, f: F) -> ShardConfig
where
    F: Fn(&ShardConfig) -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    loop {
        let update = tokio::time::timeout_at(deadline, updates.recv())
            .await
            .expect("no matching shard update within timeout")
            .expect("update channel closed");
        if f(&update) {
            return update;
        }
    }
}

pub async fn assert_no_update(updates: &ShardUpdates) {
    if let Ok(Some(update)) = tokio::time::timeout(QUIET_PERIOD, updates.recv()).await {
        panic!("unexpected shard update {update:?}");
    }
}

// ── Node state sources ──────────────────────────────────────────

/// Start one distributor per identity, all watching the same membership table.
pub fn start_cluster(
    membership: &InMemoryNodeState,
    identities: &[&str],
    num_shards: u32,
) -> Vec<Distributor> {
    identities
        .iter()
        .map(|identity| {
            Distributor::with_source(
                *identity,
                num_shards,
                Arc::new(membership.clone()),
                &fast_config(),
            )
            .expect("failed to start distributor")
        })
        .collect()
}

/// Fails the first `failures` queries, then delegates.
pub struct FlakySource {
    inner: InMemoryNodeState,
    failures: usize,
    pub calls: Arc<AtomicUsize>,
}

impl FlakySource {
    pub fn new(inner: InMemoryNodeState, failures: usize) -> Self {
        Self {
            inner,
            failures,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl NodeStateSource for FlakySource {
    async fn active_nodes(&self) -> Result<Vec<String>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(Error::node_query(format!("membership unavailable ({call})")));
        }
        self.inner.active_nodes().await
    }
}

/// Answers normally `healthy_calls` times, then panics.
pub struct PanickingSource {
    inner: InMemoryNodeState,
    healthy_calls: usize,
    calls: AtomicUsize,
}

impl PanickingSource {
    pub fn new(inner: InMemoryNodeState, healthy_calls: usize) -> Self {
        Self {
            inner,
            healthy_calls,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl NodeStateSource for PanickingSource {
    async fn active_nodes(&self) -> Result<Vec<String>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.healthy_calls {
            panic!("membership backend exploded");
        }
        self.inner.active_nodes().await
    }
}

/// Returns the alive list with duplicates and in reverse order.
pub struct UnsortedSource {
    pub nodes: Vec<String>,
}

#[async_trait]
impl NodeStateSource for UnsortedSource {
    async fn active_nodes(&self) -> Result<Vec<String>> {
        let mut nodes = self.nodes.clone();
        nodes.extend(self.nodes.iter().cloned());
        nodes.sort();
        nodes.reverse();
        Ok(nodes)
    }
}
