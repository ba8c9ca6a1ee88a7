//! Periodic expiration sweep for the ephemeral cache.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::Shared;

/// Sweep expired entries every `period` until shutdown is signalled or the
/// cache is dropped.
pub(crate) async fn sweep_loop<V>(
    cache: Weak<Shared<V>>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        sweep_interval_ms = period.as_millis() as u64,
        "Ephemeral cache sweeper started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // Sender dropped counts as shutdown
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Ephemeral cache sweeper shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                let Some(shared) = cache.upgrade() else {
                    tracing::debug!("Ephemeral cache dropped, sweeper exiting");
                    break;
                };

                let removed = shared.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "Ephemeral cache sweep completed");
                } else {
                    tracing::trace!("Ephemeral cache sweep completed with no expired entries");
                }
            }
        }
    }
}
