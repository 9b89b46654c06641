//! Watch-driven controller loop.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use operator_core::ResultExt;
use operator_store::{Error as StoreError, WatchBus, WatchPattern};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::controller::Controller;
use crate::error::Result;

/// Configuration for a controller loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Interval between full resyncs.
    pub resync_interval: Duration,
    /// Immediate retries of a reconcile that hit a write conflict.
    pub conflict_retries: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(10),
            conflict_retries: 3,
        }
    }
}

/// Runs one controller against store notifications.
///
/// Every notification is mapped to the keys it affects; on top of that all
/// keys are reconciled on a fixed interval and whenever notifications were
/// missed.
pub struct ControllerLoop {
    controller: Arc<dyn Controller>,
    bus: WatchBus,
    config: LoopConfig,
    stopper: LoopStopper,
}

impl ControllerLoop {
    pub fn new(controller: Arc<dyn Controller>, bus: WatchBus, config: LoopConfig) -> Self {
        Self {
            controller,
            bus,
            config,
            stopper: LoopStopper::new(),
        }
    }

    /// Share a stop signal with other loops.
    #[must_use]
    pub fn with_stopper(mut self, stopper: LoopStopper) -> Self {
        self.stopper = stopper;
        self
    }

    /// Get a stopper handle.
    pub fn stopper(&self) -> LoopStopper {
        self.stopper.clone()
    }

    /// Run until stopped or until the bus goes away.
    pub async fn run(self) -> Result<()> {
        let name = self.controller.name();
        info!(
            controller = name,
            resync_ms = self.config.resync_interval.as_millis(),
            "Starting controller loop"
        );

        let mut subscription = self
            .bus
            .subscribe(WatchPattern::ByKinds(self.controller.watches()));
        let mut stop_rx = self.stopper.signal();
        let mut resync = tokio::time::interval(self.config.resync_interval);

        loop {
            if *stop_rx.borrow() {
                info!(controller = name, "Controller loop stopped");
                return Ok(());
            }
            tokio::select! {
                _ = resync.tick() => {
                    self.resync().await;
                }
                event = subscription.recv() => match event {
                    Ok(event) => {
                        debug!(controller = name, kind = %event.kind, name = %event.name, change = %event.change, "Notification");
                        let keys = self
                            .controller
                            .keys_for(&event)
                            .await
                            .or_default_logged("Failed to map notification to keys");
                        self.reconcile_all(keys).await;
                    }
                    Err(StoreError::Lagged { missed }) => {
                        warn!(controller = name, missed, "Missed notifications, resyncing");
                        self.resync().await;
                    }
                    Err(e) => {
                        info!(controller = name, reason = %e, "Watch closed, stopping controller loop");
                        return Ok(());
                    }
                },
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        info!(controller = name, "Stop handle dropped, stopping controller loop");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn resync(&self) {
        let keys = self
            .controller
            .resync_keys()
            .await
            .or_default_logged("Failed to list keys for resync");
        self.reconcile_all(keys).await;
    }

    async fn reconcile_all(&self, keys: Vec<String>) {
        let keys: BTreeSet<String> = keys.into_iter().collect();
        for key in &keys {
            self.reconcile_key(key).await;
        }
    }

    async fn reconcile_key(&self, key: &str) {
        let name = self.controller.name();
        let mut attempt = 0_u32;
        loop {
            match self.controller.reconcile(key).await {
                Ok(()) => return,
                Err(e) if e.is_conflict() && attempt < self.config.conflict_retries => {
                    attempt = attempt.saturating_add(1);
                    debug!(controller = name, key, attempt, "Conflict, retrying");
                }
                Err(e) if e.is_conflict() => {
                    warn!(controller = name, key, "Conflict retries exhausted, waiting for next notification");
                    return;
                }
                Err(e) => {
                    error!(controller = name, key, error = %e, "Reconciliation error");
                    return;
                }
            }
        }
    }
}

/// Handle to stop one or more controller loops.
#[derive(Clone)]
pub struct LoopStopper {
    stop_tx: watch::Sender<bool>,
}

impl LoopStopper {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self { stop_tx }
    }

    /// Stop every loop sharing this handle.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Receiver that flips to `true` on stop.
    pub fn signal(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }
}

impl Default for LoopStopper {
    fn default() -> Self {
        Self::new()
    }
}
