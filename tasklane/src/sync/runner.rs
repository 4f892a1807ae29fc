//! Background driver for the [`SyncEngine`].
//!
//! [`spawn`] starts one task that drains on every connectivity
//! restoration, every timer tick and every manual refresh request, until
//! [`SyncHandle::shutdown`] tears it down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{MIN_SYNC_INTERVAL, SyncEngine, SyncState};
use crate::remote::RemoteApi;
use crate::storage::SnapshotStore;

/// Cloneable handle for requesting a drain.
///
/// Requests are coalesced: while one is pending, further requests are
/// dropped, and the engine ignores triggers that arrive mid-drain.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    tx: mpsc::Sender<()>,
}

impl SyncTrigger {
    /// Creates a trigger and the receiver a runner listens on.
    #[must_use]
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Requests a drain. Returns `false` if one is already pending or the
    /// runner has stopped.
    pub fn request(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

/// Owner of a running sync loop.
pub struct SyncHandle<S: SnapshotStore, R: RemoteApi> {
    engine: Arc<SyncEngine<S, R>>,
    trigger: SyncTrigger,
    shutdown_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl<S, R> SyncHandle<S, R>
where
    S: SnapshotStore + 'static,
    R: RemoteApi + 'static,
{
    /// Requests an immediate drain.
    pub fn refresh(&self) -> bool {
        self.trigger.request()
    }

    /// A trigger that can be handed to other components.
    #[must_use]
    pub fn trigger(&self) -> SyncTrigger {
        self.trigger.clone()
    }

    /// Current engine state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.engine.state()
    }

    /// The driven engine.
    #[must_use]
    pub const fn engine(&self) -> &Arc<SyncEngine<S, R>> {
        &self.engine
    }

    /// Stops the loop and waits for it to exit.
    ///
    /// A drain pass already in progress finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "sync loop ended abnormally");
        }
    }
}

/// Starts the background sync loop.
///
/// `connectivity` is the network-state source; the loop applies its
/// current value immediately and every change after that. `trigger` and
/// `requests` come from [`SyncTrigger::channel`], so components created
/// before the loop can already hold a trigger.
pub fn spawn<S, R>(
    engine: Arc<SyncEngine<S, R>>,
    connectivity: watch::Receiver<bool>,
    trigger: SyncTrigger,
    requests: mpsc::Receiver<()>,
) -> SyncHandle<S, R>
where
    S: SnapshotStore + 'static,
    R: RemoteApi + 'static,
{
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let interval = engine.config().interval.max(MIN_SYNC_INTERVAL);
    let join = tokio::spawn(run_loop(
        Arc::clone(&engine),
        connectivity,
        interval,
        requests,
        shutdown_rx,
    ));
    SyncHandle {
        engine,
        trigger,
        shutdown_tx,
        join,
    }
}

async fn run_loop<S, R>(
    engine: Arc<SyncEngine<S, R>>,
    mut connectivity: watch::Receiver<bool>,
    interval: Duration,
    mut requests: mpsc::Receiver<()>,
    mut shutdown_rx: oneshot::Receiver<()>,
) where
    S: SnapshotStore,
    R: RemoteApi,
{
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the initial drain comes from
    // the connectivity value below instead.
    tick.tick().await;
    let mut watching = true;

    let online = *connectivity.borrow_and_update();
    if engine.set_connectivity(online) {
        drive_drain(&engine, &mut connectivity, &mut watching).await;
    }

    loop {
        let wants_drain = tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            changed = connectivity.changed(), if watching => {
                if changed.is_ok() {
                    let online = *connectivity.borrow_and_update();
                    engine.set_connectivity(online)
                } else {
                    tracing::debug!("connectivity source closed");
                    watching = false;
                    false
                }
            }
            _ = tick.tick() => true,
            Some(()) = requests.recv() => true,
        };
        if wants_drain {
            drive_drain(&engine, &mut connectivity, &mut watching).await;
        }
    }
    tracing::debug!("sync loop stopped");
}

/// Runs drain passes while tracking connectivity changes, repeating the
/// pass if connectivity came back while it ran.
async fn drive_drain<S, R>(
    engine: &SyncEngine<S, R>,
    connectivity: &mut watch::Receiver<bool>,
    watching: &mut bool,
) where
    S: SnapshotStore,
    R: RemoteApi,
{
    loop {
        let mut restored = false;
        {
            let drain = engine.drain();
            tokio::pin!(drain);
            loop {
                tokio::select! {
                    _ = &mut drain => break,
                    changed = connectivity.changed(), if *watching => {
                        if changed.is_ok() {
                            let online = *connectivity.borrow_and_update();
                            restored |= engine.set_connectivity(online);
                        } else {
                            *watching = false;
                        }
                    }
                }
            }
        }
        if !restored {
            return;
        }
    }
}
