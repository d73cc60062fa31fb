//! Idle stream reclamation.
//!
//! Runs as a background task calling [`ConnectionRegistry::sweep_idle`] on
//! every tick. Reclamation is administrative: it is logged at info level,
//! never as an error.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use super::registry::ConnectionRegistry;

/// Spawn the idle sweep background task.
///
/// The task ticks every `idle_sweep_interval` until `cancel` fires.
#[must_use]
pub fn spawn_idle_sweeper(
    registry: Arc<ConnectionRegistry>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let period = registry.config().idle_sweep_interval();
    tokio::spawn(
        async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("idle sweeper shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let reclaimed = registry.sweep_idle();
                        if reclaimed.is_empty() {
                            debug!("idle sweep found nothing to reclaim");
                        } else {
                            info!(count = reclaimed.len(), "idle sweep reclaimed streams");
                        }
                    }
                }
            }
        }
        .instrument(info_span!("idle_sweeper")),
    )
}
