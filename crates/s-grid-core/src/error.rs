//! ---
//! sgrid_section: "01-core-functionality"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Primary orchestration and reconciliation core."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use thiserror::Error;

use s_grid_health::HealthError;
use s_grid_lifecycle::LifecycleError;
use s_grid_state::StateError;

/// Errors aborting a reconciliation pass or a task handler.
///
/// These surface defects in plan construction or in a collaborator and
/// are not retried; transient divergence never raises an error, it only
/// defers lifecycle progression to a later pass.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error(transparent)]
    State(#[from] StateError),

    /// Structural sync reported completeness, yet a planned agent has no
    /// state record.
    #[error("no observed state for planned agent {0}")]
    MissingAgentState(String),

    /// Structural sync reported completeness, yet a planned service has
    /// no state record.
    #[error("no observed state for planned service {0}")]
    MissingServiceState(String),

    /// A handler was asked to mutate an instance that was never seeded.
    #[error("no observed state for service instance {0}")]
    MissingInstanceState(String),

    /// An impersonating task arrived without a target state id.
    #[error("task kind {kind} requires an impersonated state id")]
    MissingImpersonatedId { kind: &'static str },

    /// A task was routed to a handler expecting a different payload.
    #[error("handler for {expected} received a {actual} payload")]
    UnexpectedPayload {
        expected: &'static str,
        actual: &'static str,
    },

    /// No handler is registered for the task kind.
    #[error("no handler registered for task kind {0}")]
    UnhandledTaskKind(&'static str),
}
