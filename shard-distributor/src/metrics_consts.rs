pub(crate) const METRIC_MEMBERSHIP_CHANGES: &str = "shard_distributor_membership_changes_total";
pub(crate) const METRIC_NODE_QUERY_FAILURES: &str = "shard_distributor_node_query_failures_total";
pub(crate) const METRIC_UPDATES_PUBLISHED: &str = "shard_distributor_updates_published_total";
pub(crate) const METRIC_OWNED_SHARDS: &str = "shard_distributor_owned_shards";
pub(crate) const METRIC_ALIVE_NODES: &str = "shard_distributor_alive_nodes";
pub(crate) const METRIC_SELF_NOT_ALIVE: &str = "shard_distributor_self_not_alive_total";
pub(crate) const METRIC_WATCHER_PANICS: &str = "shard_distributor_watcher_panics_total";

pub(crate) fn emit_membership_change(alive_nodes: usize) {
    metrics::counter!(METRIC_MEMBERSHIP_CHANGES).increment(1);
    metrics::gauge!(METRIC_ALIVE_NODES).set(alive_nodes as f64);
}

pub(crate) fn emit_node_query_failure() {
    metrics::counter!(METRIC_NODE_QUERY_FAILURES).increment(1);
}

pub(crate) fn emit_update_published(trigger: &str, owned_shards: usize) {
    metrics::counter!(
        METRIC_UPDATES_PUBLISHED,
        "trigger" => trigger.to_string()
    )
    .increment(1);
    metrics::gauge!(METRIC_OWNED_SHARDS).set(owned_shards as f64);
}

pub(crate) fn emit_self_not_alive() {
    metrics::counter!(METRIC_SELF_NOT_ALIVE).increment(1);
}

pub(crate) fn emit_watcher_panic() {
    metrics::counter!(METRIC_WATCHER_PANICS).increment(1);
}
