//! ---
//! sgrid_section: "01-core-functionality"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Primary orchestration and reconciliation core."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
//! The S-GRID reconciliation core.
//!
//! [`ServiceGridOrchestrator`] compares the observed state of agents,
//! services, and instances against the installed deployment plan and
//! emits the minimal idempotent task set that makes progress toward it.
//! The design is fully level-triggered: no task result is awaited, every
//! pass re-derives its work from persisted state, and the transport
//! suppresses tasks that are already pending.

mod dispatch;
mod error;
mod orchestrator;
mod runtime;
mod state;

pub use dispatch::TaskHandlerRegistry;
pub use error::OrchestratorError;
pub use orchestrator::ServiceGridOrchestrator;
pub use runtime::{spawn_reconciler, ReconcilerRuntime};
pub use state::OrchestratorState;
