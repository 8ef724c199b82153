use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::assignment::{self, ShardStrategy};
use crate::config::DistributorConfig;
use crate::error::{Error, Result};
use crate::metrics_consts;
use crate::node_state::{self, NodeStateSource};
use crate::types::{ShardConfig, ShardUpdates, WatcherStatus};
use crate::watcher;

const TRIGGER_MEMBERSHIP: &str = "membership";
const TRIGGER_NUM_SHARDS: &str = "num_shards";

/// Computes and publishes the set of shards owned by the local node.
///
/// A background watcher polls the node state source at jittered intervals.
/// Whenever the sorted alive list changes, ownership is recomputed and, if the
/// owned shards differ from the previous snapshot, the new [`ShardConfig`] is
/// sent on the update channel returned by [`updates`](Distributor::updates).
///
/// The update channel is bounded. A consumer that stops reading blocks the
/// watcher, and therefore any further membership tracking, until it reads
/// again or [`stop`](Distributor::stop) is called.
///
/// Dropping the distributor stops the watcher.
pub struct Distributor {
    inner: Arc<Inner>,
    updates: ShardUpdates,
    status: watch::Receiver<WatcherStatus>,
}

/// State shared between the public handle and the watcher task.
pub(crate) struct Inner {
    identity: String,
    strategy: Arc<dyn ShardStrategy>,
    strict_membership: bool,
    pub(crate) cancel: CancellationToken,
    state: Mutex<DistributorState>,
    /// Held from recomputation until the snapshot has been handed to the
    /// channel, so updates leave in the order they were computed.
    publisher: tokio::sync::Mutex<mpsc::Sender<ShardConfig>>,
}

struct DistributorState {
    /// Last observed alive peers, sorted.
    nodes: Vec<String>,
    config: ShardConfig,
}

impl Distributor {
    /// Create a distributor backed by the node state source named in
    /// `config.node_state`, and start watching membership.
    ///
    /// Fails with [`Error::NoRuntime`] outside a Tokio runtime.
    pub fn new(
        identity: impl Into<String>,
        num_shards: u32,
        config: &DistributorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let identity = identity.into();
        let source = node_state::provide(&identity, &config.node_state)?;
        Self::with_source(identity, num_shards, source, config)
    }

    /// Create a distributor that polls `source` for membership.
    ///
    /// Fails with [`Error::NoRuntime`] outside a Tokio runtime.
    pub fn with_source(
        identity: impl Into<String>,
        num_shards: u32,
        source: Arc<dyn NodeStateSource>,
        config: &DistributorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let identity = identity.into();
        let (tx, rx) = mpsc::channel(config.update_buffer);
        let (status_tx, status_rx) = watch::channel(WatcherStatus::Running);

        let inner = Arc::new(Inner {
            identity: identity.clone(),
            strategy: config.strategy.build(),
            strict_membership: config.strict_membership,
            cancel: CancellationToken::new(),
            state: Mutex::new(DistributorState {
                nodes: Vec::new(),
                config: ShardConfig::new(identity, num_shards),
            }),
            publisher: tokio::sync::Mutex::new(tx),
        });

        watcher::spawn(
            &handle,
            Arc::clone(&inner),
            source,
            config.max_poll_delay,
            status_tx,
        );

        tracing::info!(
            op = "sharder.new",
            identity = %inner.identity,
            num_shards,
            strategy = ?config.strategy,
            "started shard distributor"
        );

        Ok(Self {
            inner,
            updates: ShardUpdates::new(rx),
            status: status_rx,
        })
    }

    /// Signal the watcher to terminate. Returns immediately and may be called
    /// any number of times. Nothing is published after the first call.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    /// The channel carrying one [`ShardConfig`] per ownership change.
    pub fn updates(&self) -> ShardUpdates {
        self.updates.clone()
    }

    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    /// Change the total number of shards and publish the resulting ownership
    /// right away, using the last observed alive set.
    ///
    /// Publishes when the owned shards or the shard count changed, or when the
    /// alive set is empty. Waits for channel capacity like the watcher does.
    pub async fn update_number_shards(&self, num_shards: u32) {
        let publisher = self.inner.publisher.lock().await;
        let update = {
            let mut state = self.inner.state();
            let resized = state.config.num_shards != num_shards;
            state.config.num_shards = num_shards;
            self.inner.publish_changes(&mut state, resized)
        };
        if let Some(config) = update {
            self.inner
                .send(&publisher, config, TRIGGER_NUM_SHARDS)
                .await;
        }
    }

    /// Last observed alive peers, sorted.
    pub fn nodes(&self) -> Vec<String> {
        self.inner.state().nodes.clone()
    }

    /// Current ownership snapshot.
    pub fn shard_config(&self) -> ShardConfig {
        self.inner.state().config.clone()
    }

    pub fn watcher_status(&self) -> WatcherStatus {
        self.status.borrow().clone()
    }

    /// True once the watcher has exited for any reason. A stale distributor
    /// keeps answering queries but its ownership no longer follows membership.
    pub fn is_stale(&self) -> bool {
        !self.watcher_status().is_running()
    }

    /// Wait until the watcher has exited and return its final status.
    pub async fn watcher_exited(&self) -> WatcherStatus {
        let mut status = self.status.clone();
        let final_status = match status.wait_for(|s| !s.is_running()).await {
            Ok(final_status) => final_status.clone(),
            Err(_) => self.watcher_status(),
        };
        final_status
    }
}

impl Drop for Distributor {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, DistributorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a freshly polled alive list. `alive` must already be sorted.
    pub(crate) async fn observe_nodes(&self, alive: Vec<String>) {
        let publisher = self.publisher.lock().await;
        let update = {
            let mut state = self.state();
            if state.nodes == alive {
                return;
            }
            tracing::info!(
                op = "sharder.node_monitor",
                identity = %self.identity,
                previous = ?state.nodes,
                current = ?alive,
                "alive nodes changed"
            );
            metrics_consts::emit_membership_change(alive.len());
            state.nodes = alive;
            self.publish_changes(&mut state, false)
        };
        if let Some(config) = update {
            self.send(&publisher, config, TRIGGER_MEMBERSHIP).await;
        }
    }

    /// Recompute ownership in place. Returns the snapshot to publish, if any.
    ///
    /// An empty alive set always yields a snapshot. Otherwise one is returned
    /// when the owned shards changed, or unconditionally when `force` is set.
    fn publish_changes(&self, state: &mut DistributorState, force: bool) -> Option<ShardConfig> {
        if state.nodes.is_empty() {
            state.config.owned_shards = Vec::new();
            return Some(state.config.clone());
        }

        let owned = self.hash_shards(&state.nodes, state.config.num_shards);
        if owned != state.config.owned_shards {
            state.config.owned_shards = owned;
            return Some(state.config.clone());
        }

        force.then(|| state.config.clone())
    }

    fn hash_shards(&self, nodes: &[String], num_shards: u32) -> Vec<String> {
        if assignment::peer_index(nodes, &self.identity).is_none() {
            metrics_consts::emit_self_not_alive();
            tracing::warn!(
                op = "sharder.hash_shards",
                identity = %self.identity,
                nodes = ?nodes,
                strict = self.strict_membership,
                "local node is not in the alive set"
            );
            if self.strict_membership {
                return Vec::new();
            }
        }
        assignment::assign(self.strategy.as_ref(), nodes, &self.identity, num_shards)
    }

    async fn send(&self, publisher: &mpsc::Sender<ShardConfig>, config: ShardConfig, trigger: &str) {
        if self.cancel.is_cancelled() {
            return;
        }
        let owned = config.owned_shards.len();
        let num_shards = config.num_shards;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(op = "sharder.publish_changes", trigger, "stopped while publishing, update dropped");
            }
            result = publisher.send(config) => match result {
                Ok(()) => {
                    metrics_consts::emit_update_published(trigger, owned);
                    tracing::info!(
                        op = "sharder.publish_changes",
                        identity = %self.identity,
                        trigger,
                        num_shards,
                        owned,
                        "published shard ownership"
                    );
                }
                Err(e) => {
                    tracing::warn!(op = "sharder.publish_changes", error = %e, "update channel closed");
                }
            },
        }
    }
}
