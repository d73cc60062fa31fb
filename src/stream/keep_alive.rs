//! Per-connection keep-alive timer.
//!
//! Each open stream gets a background task that writes an SSE comment every
//! `keep_alive_interval` so proxies do not drop an otherwise quiet
//! connection. The task stops when the record's cancellation token fires,
//! when the registry is dropped, or after the first failed ping (the failed
//! write has already closed the record).

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use super::registry::ConnectionRegistry;

/// Spawn the keep-alive loop for one connection on `handle`.
pub(crate) fn spawn(
    handle: &Handle,
    registry: Weak<ConnectionRegistry>,
    job_id: String,
    connection_id: Uuid,
    period: Duration,
    cancel: CancellationToken,
) {
    let span = info_span!("keep_alive", job_id = %job_id, %connection_id);
    handle.spawn(
        async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("keep-alive cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(registry) = registry.upgrade() else {
                            break;
                        };
                        if !registry.keep_alive_connection(&job_id, connection_id) {
                            debug!("keep-alive target gone; stopping");
                            break;
                        }
                    }
                }
            }
        }
        .instrument(span),
    );
}
