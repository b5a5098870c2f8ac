//! ---
//! sgrid_section: "01-core-functionality"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Primary orchestration and reconciliation core."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, trace};

use s_grid_msg::MemoryTaskBroker;
use s_grid_state::StateStore;

use crate::dispatch::TaskHandlerRegistry;
use crate::orchestrator::ServiceGridOrchestrator;

/// Handle over the periodic reconciliation loop.
#[derive(Debug)]
pub struct ReconcilerRuntime {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl ReconcilerRuntime {
    /// Signal the loop to stop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.task.await {
            error!(error = %err, "reconciler join error");
        }
    }
}

/// Spawn the reconciliation loop.
///
/// Each tick drains the orchestrator-addressed tasks through the handler
/// registry, then runs one `orchestrate` pass. The loop owns the
/// orchestrator, which keeps passes single-threaded and non-reentrant.
pub fn spawn_reconciler(
    mut orchestrator: ServiceGridOrchestrator,
    registry: TaskHandlerRegistry,
    broker: Arc<MemoryTaskBroker>,
    store: Arc<dyn StateStore>,
    tick_interval: Duration,
) -> ReconcilerRuntime {
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(4);
    let task = tokio::spawn(async move {
        let consumer_id = orchestrator.orchestrator_id().to_owned();
        let mut ticker = interval(tick_interval);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("reconciler shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    while let Some(task) = broker.take_next(&consumer_id) {
                        if let Err(err) = registry.dispatch(&mut orchestrator, store.as_ref(), &task) {
                            error!(kind = task.kind(), error = %err, "task handler failed");
                        }
                    }
                    match orchestrator.orchestrate() {
                        Ok(tasks) if !tasks.is_empty() => {
                            debug!(emitted = tasks.len(), "reconciliation pass emitted tasks");
                        }
                        Ok(_) => trace!("reconciliation pass found nothing to emit"),
                        Err(err) => error!(error = %err, "reconciliation pass failed"),
                    }
                }
            }
        }
        debug!("reconciler loop exited");
    });
    ReconcilerRuntime {
        shutdown: shutdown_tx,
        task,
    }
}
