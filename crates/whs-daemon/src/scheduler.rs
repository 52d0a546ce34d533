//! Periodic sweep scheduler.
//!
//! One background task ticks at the configured interval and asks the
//! shared state for a guarded sweep. Overlap handling lives in
//! [`AppState::run_sweep_guarded`]; this module only provides the clock
//! and the shutdown path.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::state::{AppState, SweepRun};
use whs_reconcile::{LedgerGateway, StateStore};

/// Spawn the sweep loop. Flipping the watch channel to `true` stops the
/// loop after the in-flight sweep (if any) finishes.
pub fn spawn_sweep_scheduler<L, S>(
    state: Arc<AppState<L, S>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    L: LedgerGateway + 'static,
    S: StateStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The immediate first tick is the startup sweep's job, not ours.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match state.run_sweep_guarded().await {
                        Ok(SweepRun::Completed(report)) => {
                            if !report.is_noop() {
                                info!(completed = report.completed, failed = report.failed, "sweep tick finished");
                            }
                        }
                        Ok(SweepRun::SkippedOverlap) => {}
                        Err(e) => {
                            // Transient by assumption; the next tick retries.
                            error!(error = %e, "sweep tick failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("sweep scheduler stopping");
                        return;
                    }
                }
            }
        }
    })
}

/// Resolves when the process receives Ctrl-C (SIGINT) or, on unix, SIGTERM.
/// Service managers stop daemons with SIGTERM, so both must drain the
/// server gracefully.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
