//! Network-state source backed by periodic health probes.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::remote::RemoteApi;

/// Default period between health probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(15);

/// Shortest probe period; shorter ones are raised to it.
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Probes [`RemoteApi::health`] and publishes reachability on a `watch` channel.
///
/// Subscribers only wake on changes. The probe loop stops on its own once
/// every receiver has been dropped.
pub struct ConnectivityMonitor<R: RemoteApi> {
    remote: R,
    interval: Duration,
}

impl<R: RemoteApi + 'static> ConnectivityMonitor<R> {
    /// Creates a monitor probing `remote` every `interval`.
    pub fn new(remote: R, interval: Duration) -> Self {
        Self {
            remote,
            interval: interval.max(MIN_PROBE_INTERVAL),
        }
    }

    /// Probes once and publishes the result if it changed. Returns the result.
    pub async fn probe(&self, tx: &watch::Sender<bool>) -> bool {
        let online = self.remote.health().await;
        let changed = tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "connectivity changed");
        }
        online
    }

    /// Starts probing in the background. The channel starts out `false`.
    pub fn spawn(self) -> (watch::Receiver<bool>, JoinHandle<()>) {
        let (tx, rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = tx.closed() => break,
                    _ = tick.tick() => {
                        self.probe(&tx).await;
                    }
                }
            }
            tracing::debug!("connectivity monitor stopped");
        });
        (rx, join)
    }
}
