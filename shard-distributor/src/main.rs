//! Run a shard distributor and log every ownership change until interrupted.
use envconfig::Envconfig;
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use shard_distributor::config::Config;
use shard_distributor::Distributor;

async fn shutdown_signal() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::init_from_env().expect("Invalid configuration");

    let log_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(log_layer)
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    tracing::info!("Starting shard-distributor");
    tracing::info!("Identity: {}", config.identity);
    tracing::info!("Shards: {}", config.num_shards);
    tracing::info!("Node state: {}", config.node_state_type);

    let distributor = Distributor::new(
        config.identity.clone(),
        config.num_shards,
        &config.distributor_config(),
    )?;
    let updates = distributor.updates();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            update = updates.recv() => match update {
                Some(shard_config) => {
                    tracing::info!(
                        shard_config = %serde_json::to_string(&shard_config)?,
                        "shard ownership changed"
                    );
                }
                None => break,
            },
        }
    }

    distributor.stop();
    let status = distributor.watcher_exited().await;
    tracing::info!(?status, "shard distributor stopped");

    Ok(())
}
