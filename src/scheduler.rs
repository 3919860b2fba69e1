// src/scheduler.rs

use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::AnchorEngine;
use crate::error::Result;

/// Background timer driving periodic batch cuts.
///
/// One scheduler per engine. Each tick asks the engine to cut if the queue
/// has reached `batch.min_batch_size`; the engine's cut lock serializes the
/// tick with size-triggered cuts and operator actions.
#[derive(Debug)]
pub struct AnchorScheduler {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl AnchorScheduler {
    /// Spawns the scheduler loop on the current tokio runtime, ticking at
    /// the configured `batch.interval`.
    pub fn spawn(engine: Arc<AnchorEngine>) -> Self {
        let interval = engine.config().batch.interval();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so a fresh engine
            // waits a full interval before its first timer-driven cut.
            ticker.tick().await;
            info!("anchor scheduler started, interval {}s", interval.as_secs());

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match engine.cut_if_ready().await {
                            Ok(Some(record)) => {
                                debug!(
                                    "scheduled cut produced anchor {} ({} transactions)",
                                    record.id, record.transaction_count
                                );
                            }
                            Ok(None) => {
                                debug!("scheduled tick: queue below minimum, nothing to cut");
                            }
                            Err(e) => {
                                error!("scheduled batch cut failed: {}", e);
                            }
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("anchor scheduler stopped");
        });

        Self { shutdown_tx, handle }
    }

    /// Signals the loop to stop and waits for it to finish.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.handle.await?;
        Ok(())
    }
}
