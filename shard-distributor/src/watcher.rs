//! Background membership watcher.
//!
//! The poll loop runs in its own task. A second task supervises it, so a panic
//! anywhere in the loop is contained, logged and reflected in the distributor's
//! [`WatcherStatus`] instead of taking the process down. A dead watcher is not
//! restarted.

use std::any::Any;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic;
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::distributor::Inner;
use crate::error::Error;
use crate::metrics_consts;
use crate::node_state::NodeStateSource;
use crate::types::WatcherStatus;

const OP: &str = "sharder.node_monitor";

tokio::task_local! {
    static PANIC_SITE: PanicSlot;
}

/// Where the node monitor panicked. Filled by the panic hook on the panicking
/// thread, read by the supervisor once the task has unwound.
type PanicSlot = Arc<Mutex<Option<PanicSite>>>;

struct PanicSite {
    location: Option<String>,
    backtrace: String,
}

static PANIC_HOOK: Once = Once::new();

/// Chain a hook in front of the current one. Panics outside a node monitor
/// task go straight to the previous hook.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let _ = PANIC_SITE.try_with(|slot| {
                *lock(slot) = Some(PanicSite {
                    location: info.location().map(ToString::to_string),
                    backtrace: Backtrace::force_capture().to_string(),
                });
            });
            previous(info);
        }));
    });
}

fn lock(slot: &PanicSlot) -> MutexGuard<'_, Option<PanicSite>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn spawn(
    handle: &Handle,
    inner: Arc<Inner>,
    source: Arc<dyn NodeStateSource>,
    max_poll_delay: Duration,
    status: watch::Sender<WatcherStatus>,
) {
    let (monitor, slot) = spawn_monitored(handle, node_monitor(inner, source, max_poll_delay));
    handle.spawn(supervise(monitor, slot, status));
}

fn spawn_monitored<F>(handle: &Handle, monitor: F) -> (JoinHandle<()>, PanicSlot)
where
    F: Future<Output = ()> + Send + 'static,
{
    install_panic_hook();
    let slot = PanicSlot::default();
    let task = handle.spawn(PANIC_SITE.scope(Arc::clone(&slot), monitor));
    (task, slot)
}

async fn node_monitor(inner: Arc<Inner>, source: Arc<dyn NodeStateSource>, max_poll_delay: Duration) {
    let cancel = inner.cancel.clone();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(jitter(max_poll_delay)) => {}
        }

        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            polled = source.active_nodes() => polled,
        };

        let mut alive = match polled {
            Ok(alive) => alive,
            Err(e) => {
                metrics_consts::emit_node_query_failure();
                tracing::debug!(op = OP, error = %e, "node query failed, retrying next tick");
                continue;
            }
        };
        alive.sort();
        alive.dedup();

        inner.observe_nodes(alive).await;
    }
    tracing::info!(op = OP, "stopping sharder node monitor");
}

async fn supervise(
    monitor: JoinHandle<()>,
    slot: PanicSlot,
    status: watch::Sender<WatcherStatus>,
) {
    let final_status = match monitor.await {
        Ok(()) => WatcherStatus::Stopped,
        Err(e) if e.is_panic() => {
            let site = lock(&slot).take();
            let err = panic_error(e.into_panic(), site);
            metrics_consts::emit_watcher_panic();
            tracing::error!(
                op = OP,
                error = %err,
                location = err.panic_location().unwrap_or("unknown"),
                stack_trace = err.stack_trace().unwrap_or_default(),
                "a panic has occurred in node monitor"
            );
            WatcherStatus::Failed {
                reason: err.to_string(),
            }
        }
        Err(e) => {
            tracing::warn!(op = OP, error = %e, "node monitor cancelled by the runtime");
            WatcherStatus::Stopped
        }
    };
    status.send_replace(final_status);
}

fn panic_error(payload: Box<dyn Any + Send>, site: Option<PanicSite>) -> Error {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    let (location, backtrace) = match site {
        Some(site) => (site.location, site.backtrace),
        // Another hook replaced ours after it was installed.
        None => (None, Backtrace::force_capture().to_string()),
    };
    Error::WatcherPanicked {
        message,
        location,
        backtrace,
    }
}

/// Uniform delay in `[0, max)`, so peers do not poll in lockstep.
fn jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}
