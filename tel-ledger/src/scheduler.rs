//! Periodic anchoring of closed day windows

use std::sync::Arc;
use std::time::Duration;
use tel_types::{AnchorWindow, WindowKey};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, Result};
use crate::ledger::{Ledger, Reanchor};

/// Upper bound on closed days visited per tick
const CATCH_UP_DAYS: usize = 31;

/// An explicit anchoring request for one window
pub struct AnchorRequest {
    pub window: WindowKey,
    pub response_tx: oneshot::Sender<Result<Vec<AnchorWindow>>>,
}

/// Background task that anchors UTC days once they have closed.
///
/// On every tick it walks back from yesterday to the latest anchored window
/// and anchors each day that has no anchor yet. Explicit requests always
/// recompute.
pub struct AnchorScheduler {
    ledger: Arc<Ledger>,
    interval: Duration,
    request_rx: mpsc::Receiver<AnchorRequest>,
    shutdown_rx: oneshot::Receiver<()>,
}

/// Control side of a running [`AnchorScheduler`]
#[derive(Clone)]
pub struct AnchorHandle {
    request_tx: mpsc::Sender<AnchorRequest>,
    shutdown_tx: Arc<std::sync::Mutex<Option<oneshot::Sender<()>>>>,
}

impl AnchorHandle {
    /// Anchor `window` now and wait for the result
    pub async fn anchor(&self, window: WindowKey) -> Result<Vec<AnchorWindow>> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(AnchorRequest {
                window,
                response_tx,
            })
            .await
            .map_err(|_| LedgerError::Storage("anchor scheduler has stopped".to_string()))?;
        response_rx
            .await
            .map_err(|_| LedgerError::Storage("anchor scheduler dropped the request".to_string()))?
    }

    /// Ask the scheduler to stop after its current run
    pub fn shutdown(&self) {
        let sender = match self.shutdown_tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(tx) = sender {
            let _ = tx.send(());
        }
    }
}

impl AnchorScheduler {
    pub fn new(ledger: Arc<Ledger>, interval: Duration) -> (Self, AnchorHandle) {
        let (request_tx, request_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let scheduler = Self {
            ledger,
            interval,
            request_rx,
            shutdown_rx,
        };
        let handle = AnchorHandle {
            request_tx,
            shutdown_tx: Arc::new(std::sync::Mutex::new(Some(shutdown_tx))),
        };
        (scheduler, handle)
    }

    /// Start the scheduler on the current runtime
    pub fn spawn(ledger: Arc<Ledger>, interval: Duration) -> (AnchorHandle, JoinHandle<()>) {
        let (scheduler, handle) = Self::new(ledger, interval);
        (handle, tokio::spawn(scheduler.run()))
    }

    /// Run the scheduler loop
    pub async fn run(mut self) {
        info!("Anchor scheduler started (every {:?})", self.interval);

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut self.shutdown_rx => {
                    info!("Shutdown requested");
                    break;
                }

                _ = interval.tick() => {
                    self.anchor_closed_days().await;
                }

                Some(request) = self.request_rx.recv() => {
                    let result = self.anchor_window(request.window, Reanchor::Always).await;
                    // Ignore if the requester went away
                    let _ = request.response_tx.send(result);
                }

                else => break,
            }
        }

        info!("Anchor scheduler stopped");
    }

    /// Closed windows still to visit, oldest first: yesterday back to the
    /// most recently anchored window, at most `CATCH_UP_DAYS` of them
    fn closed_windows(&self) -> Result<Vec<WindowKey>> {
        let today = WindowKey::for_instant(self.ledger.now());
        let last_anchored = self
            .ledger
            .anchors()?
            .into_iter()
            .map(|anchor| anchor.window_key)
            .filter(|window| *window < today)
            .max();

        let mut windows = Vec::new();
        let mut cursor = today.previous();
        while let Some(window) = cursor {
            if windows.len() == CATCH_UP_DAYS {
                break;
            }
            windows.push(window);
            if Some(window) <= last_anchored {
                break;
            }
            cursor = window.previous();
        }
        windows.reverse();
        Ok(windows)
    }

    async fn anchor_closed_days(&self) {
        let windows = match self.closed_windows() {
            Ok(windows) => windows,
            Err(e) => {
                warn!("Listing anchors failed: {}", e);
                return;
            }
        };

        for window in windows {
            match self.anchor_window(window, Reanchor::IfMissing).await {
                Ok(anchors) => debug!("Window {} has {} anchor(s)", window, anchors.len()),
                Err(LedgerError::NoLeaves { .. }) => debug!("Window {} has no records", window),
                Err(e) => warn!("Anchoring {} failed: {}", window, e),
            }
        }
    }

    async fn anchor_window(&self, window: WindowKey, reanchor: Reanchor) -> Result<Vec<AnchorWindow>> {
        let ledger = self.ledger.clone();
        tokio::task::spawn_blocking(move || ledger.anchor_day(window, reanchor))
            .await
            .map_err(|e| LedgerError::Storage(format!("anchoring task failed: {}", e)))?
    }
}
