use std::time::Duration;

use envconfig::Envconfig;

use crate::assignment::AssignmentStrategy;
use crate::error::{Error, Result};
use crate::node_state::IN_MEMORY;

/// Upper bound of the jittered wait between two membership polls.
pub const DEFAULT_MAX_POLL_DELAY: Duration = Duration::from_secs(5);

/// Jitter is drawn in whole milliseconds, a shorter window would poll in a
/// tight loop.
pub const MIN_MAX_POLL_DELAY: Duration = Duration::from_millis(1);

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    /// Identity of this node among its peers. Must be unique in the cluster.
    #[envconfig(from = "IDENTITY", default = "node-0")]
    pub identity: String,

    #[envconfig(default = "16")]
    pub num_shards: u32,

    /// Upper bound of the jittered poll delay in milliseconds
    #[envconfig(default = "5000")]
    pub max_poll_delay_ms: u64,

    /// Capacity of the update channel. A full channel blocks the watcher until
    /// a consumer reads.
    #[envconfig(default = "1")]
    pub update_buffer: usize,

    #[envconfig(default = "inmemory")]
    pub node_state_type: String,

    /// Comma separated peers registered as alive at startup.
    #[envconfig(default = "")]
    pub seed_nodes: String,

    #[envconfig(default = "modulo")]
    pub assignment_strategy: AssignmentStrategy,

    #[envconfig(default = "false")]
    pub strict_membership: bool,
}

impl Config {
    pub fn max_poll_delay(&self) -> Duration {
        Duration::from_millis(self.max_poll_delay_ms)
    }

    pub fn seed_node_list(&self) -> Vec<String> {
        self.seed_nodes
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn distributor_config(&self) -> DistributorConfig {
        DistributorConfig {
            max_poll_delay: self.max_poll_delay(),
            update_buffer: self.update_buffer,
            strategy: self.assignment_strategy,
            strict_membership: self.strict_membership,
            node_state: NodeStateConfig {
                node_state_type: self.node_state_type.clone(),
                seed_nodes: self.seed_node_list(),
            },
        }
    }
}

/// Settings for the node state source built by [`crate::node_state::provide`].
#[derive(Debug, Clone)]
pub struct NodeStateConfig {
    pub node_state_type: String,
    pub seed_nodes: Vec<String>,
}

impl Default for NodeStateConfig {
    fn default() -> Self {
        Self {
            node_state_type: IN_MEMORY.to_string(),
            seed_nodes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DistributorConfig {
    pub max_poll_delay: Duration,
    pub update_buffer: usize,
    pub strategy: AssignmentStrategy,
    /// When set, a node missing from a non-empty alive set owns no shards
    /// instead of taking the shards of the first peer.
    pub strict_membership: bool,
    pub node_state: NodeStateConfig,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            max_poll_delay: DEFAULT_MAX_POLL_DELAY,
            update_buffer: 1,
            strategy: AssignmentStrategy::default(),
            strict_membership: false,
            node_state: NodeStateConfig::default(),
        }
    }
}

impl DistributorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.update_buffer == 0 {
            return Err(Error::InvalidConfig(
                "update_buffer must be at least 1".to_string(),
            ));
        }
        if self.max_poll_delay < MIN_MAX_POLL_DELAY {
            return Err(Error::InvalidConfig(format!(
                "max_poll_delay must be at least {MIN_MAX_POLL_DELAY:?}, got {:?}",
                self.max_poll_delay
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();
        assert_eq!(config.identity, "node-0");
        assert_eq!(config.num_shards, 16);
        assert_eq!(config.max_poll_delay(), DEFAULT_MAX_POLL_DELAY);
        assert_eq!(config.assignment_strategy, AssignmentStrategy::Modulo);
        assert!(config.seed_node_list().is_empty());
        assert!(!config.strict_membership);

        let distributor = config.distributor_config();
        assert_eq!(distributor.node_state.node_state_type, IN_MEMORY);
        assert!(distributor.validate().is_ok());
    }

    #[test]
    fn reads_overrides() {
        let env: HashMap<String, String> = [
            ("IDENTITY", "node-b"),
            ("NUM_SHARDS", "6"),
            ("MAX_POLL_DELAY_MS", "250"),
            ("SEED_NODES", "node-a, node-c,,"),
            ("ASSIGNMENT_STRATEGY", "jump_hash"),
            ("STRICT_MEMBERSHIP", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = Config::init_from_hashmap(&env).unwrap();
        assert_eq!(config.identity, "node-b");
        assert_eq!(config.num_shards, 6);
        assert_eq!(config.max_poll_delay(), Duration::from_millis(250));
        assert_eq!(config.seed_node_list(), vec!["node-a", "node-c"]);
        assert_eq!(
            config.distributor_config().node_state.seed_nodes,
            vec!["node-a", "node-c"]
        );
        assert_eq!(config.assignment_strategy, AssignmentStrategy::JumpHash);
        assert!(config.strict_membership);
    }

    #[test]
    fn zero_update_buffer_is_invalid() {
        let config = DistributorConfig {
            update_buffer: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn sub_millisecond_poll_delay_is_invalid() {
        for max_poll_delay in [Duration::ZERO, Duration::from_micros(999)] {
            let config = DistributorConfig {
                max_poll_delay,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }

        let config = DistributorConfig {
            max_poll_delay: MIN_MAX_POLL_DELAY,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let env: HashMap<String, String> =
            [("MAX_POLL_DELAY_MS".to_string(), "0".to_string())].into();
        let config = Config::init_from_hashmap(&env).unwrap();
        assert!(config.distributor_config().validate().is_err());
    }
}
