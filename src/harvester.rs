//! The fixed-interval main loop tying scanning, reconciliation, extraction,
//! and retention together.
//!
//! Cancellation is cooperative: the shutdown flag is polled once at the top
//! of each iteration, so an iteration already in progress always completes
//! before the loop stops. The inter-iteration sleep also watches the flag so
//! shutdown does not wait out the full interval.

use crate::catalog;
use crate::config::Config;
use crate::error::Result;
use crate::extract;
use crate::scanner;
use crate::store::Store;
use crate::sweeper;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// The harvester loop. Collaborators are injected at construction; there is
/// no global state.
pub struct Harvester {
    store: Store,
    config: Config,
    shutdown: watch::Receiver<bool>,
}

impl Harvester {
    pub fn new(store: Store, config: Config, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            store,
            config,
            shutdown,
        }
    }

    /// Run until cancelled or a fatal storage error occurs.
    ///
    /// Recoverable errors are logged and the loop proceeds to the next
    /// scheduled iteration; an error escaping a phase rolls back that
    /// phase's transaction, is logged at the highest severity, and stops
    /// the loop.
    pub async fn run(mut self) -> Result<()> {
        info!("Harvester started");

        loop {
            if *self.shutdown.borrow() {
                info!("Shutdown requested, stopping after current state is settled");
                break;
            }

            if let Err(e) = self.run_cycle().await {
                error!(error = %e, "Fatal error stopped the harvester");
                return Err(e);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.reading_interval()) => {}
                _ = self.shutdown.changed() => {}
            }
        }

        info!("Harvester stopped");
        Ok(())
    }

    /// One iteration: scan, reconcile, extract, sweep.
    ///
    /// Returns `Err` only for fatal conditions; everything recoverable is
    /// contained here.
    async fn run_cycle(&self) -> Result<()> {
        debug!("Starting cycle");

        // A failed scan produces no observations to reconcile against; the
        // catalog keeps its stale entries until the directory comes back.
        match scanner::scan_directory(&self.config.paths.logs_dir).await {
            Ok(snapshots) => {
                match catalog::reconcile(&self.store, &self.config, &snapshots).await {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        error!(error = %e, "Reconciliation rolled back, catalog unchanged this cycle");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Scan skipped, catalog left as-is this cycle");
            }
        }

        // Per-stream failures are already contained inside the extraction
        // cycle; what escapes is fatal.
        extract::run_extraction_cycle(&self.store, &self.config).await?;

        sweeper::sweep(&self.store, self.config.retention_window()).await?;

        Ok(())
    }
}
