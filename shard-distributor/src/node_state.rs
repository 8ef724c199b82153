//! Cluster membership as seen by the distributor.
//!
//! The distributor only needs to ask "who is alive right now?". How liveness
//! is actually detected is up to the implementation.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;

use crate::config::NodeStateConfig;
use crate::error::{Error, Result};

pub const IN_MEMORY: &str = "inmemory";

#[async_trait]
pub trait NodeStateSource: Send + Sync {
    /// Identities of the nodes currently considered alive, in any order.
    ///
    /// Called repeatedly from the membership watcher. Errors are treated as
    /// transient.
    async fn active_nodes(&self) -> Result<Vec<String>>;
}

/// Process-local membership table.
///
/// Useful for single-node deployments, for embedding the distributor behind a
/// membership layer that pushes changes, and for tests.
#[derive(Clone, Default)]
pub struct InMemoryNodeState {
    nodes: Arc<RwLock<BTreeSet<String>>>,
}

impl InMemoryNodeState {
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: Arc::new(RwLock::new(nodes.into_iter().map(Into::into).collect())),
        }
    }

    /// Replace the whole alive set.
    pub fn set_active<I, S>(&self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.write() = nodes.into_iter().map(Into::into).collect();
    }

    pub fn mark_alive(&self, node: impl Into<String>) {
        self.write().insert(node.into());
    }

    pub fn mark_dead(&self, node: &str) {
        self.write().remove(node);
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeSet<String>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl NodeStateSource for InMemoryNodeState {
    async fn active_nodes(&self) -> Result<Vec<String>> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        Ok(nodes.iter().cloned().collect())
    }
}

/// Build the node state source named by `config.node_state_type`.
///
/// The local identity is always registered as alive in the in-memory table.
pub fn provide(identity: &str, config: &NodeStateConfig) -> Result<Arc<dyn NodeStateSource>> {
    match config.node_state_type.trim().to_lowercase().as_ref() {
        IN_MEMORY => {
            let state = InMemoryNodeState::new(config.seed_nodes.iter().cloned());
            state.mark_alive(identity);
            Ok(Arc::new(state))
        }
        _ => Err(Error::UnsupportedNodeStateType(
            config.node_state_type.clone(),
        )),
    }
}
