//! ---
//! sgrid_section: "01-core-functionality"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Primary orchestration and reconciliation core."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use indexmap::IndexMap;
use tracing::trace;

use s_grid_msg::Task;
use s_grid_state::{ImpersonatedState, StateStore};

use crate::error::OrchestratorError;
use crate::orchestrator::ServiceGridOrchestrator;

/// Handler acting on the orchestrator's own state.
pub type ConsumerHandler =
    fn(&mut ServiceGridOrchestrator, &Task) -> Result<(), OrchestratorError>;

/// Handler acting on another entity's state through a scoped capability.
pub type ImpersonatingHandler = fn(
    &mut ServiceGridOrchestrator,
    &Task,
    ImpersonatedState<'_>,
) -> Result<(), OrchestratorError>;

/// Explicit registry mapping task kinds to orchestrator handlers.
///
/// Two tables mirror the two handler shapes: plain consumers act on the
/// orchestrator itself, impersonating consumers receive an
/// [`ImpersonatedState`] capability that the dispatcher scopes to the
/// task's target id. The registry is the only place such capabilities
/// are constructed.
pub struct TaskHandlerRegistry {
    consumers: IndexMap<&'static str, ConsumerHandler>,
    impersonators: IndexMap<&'static str, ImpersonatingHandler>,
}

impl TaskHandlerRegistry {
    /// Registry wiring every task kind the orchestrator consumes.
    pub fn service_grid() -> Self {
        let mut consumers: IndexMap<&'static str, ConsumerHandler> = IndexMap::new();
        consumers.insert("update_deployment_plan", |orchestrator, task| {
            orchestrator.update_deployment_plan(task)
        });

        let mut impersonators: IndexMap<&'static str, ImpersonatingHandler> = IndexMap::new();
        impersonators.insert("plan_agent", |orchestrator, task, state| {
            orchestrator.plan_agent(task, state)
        });
        impersonators.insert("plan_service", |orchestrator, task, state| {
            orchestrator.plan_service(task, state)
        });
        impersonators.insert("plan_service_instance", |orchestrator, task, state| {
            orchestrator.plan_service_instance(task, state)
        });
        impersonators.insert("service_installing", |orchestrator, task, state| {
            orchestrator.service_installing(task, state)
        });
        impersonators.insert("service_installed", |orchestrator, task, state| {
            orchestrator.service_installed(task, state)
        });
        impersonators.insert("service_uninstalling", |orchestrator, task, state| {
            orchestrator.service_uninstalling(task, state)
        });
        impersonators.insert("service_uninstalled", |orchestrator, task, state| {
            orchestrator.service_uninstalled(task, state)
        });
        impersonators.insert(
            "service_instance_unreachable",
            |orchestrator, task, state| orchestrator.service_instance_unreachable(task, state),
        );
        impersonators.insert(
            "remove_service_instance_from_agent",
            |orchestrator, task, state| {
                orchestrator.remove_service_instance_from_agent(task, state)
            },
        );
        impersonators.insert(
            "remove_service_instance_from_service",
            |orchestrator, task, state| {
                orchestrator.remove_service_instance_from_service(task, state)
            },
        );

        Self {
            consumers,
            impersonators,
        }
    }

    pub fn handles(&self, kind: &str) -> bool {
        self.consumers.contains_key(kind) || self.impersonators.contains_key(kind)
    }

    /// Route one task to its handler, constructing the impersonated
    /// capability when the handler shape requires it.
    pub fn dispatch(
        &self,
        orchestrator: &mut ServiceGridOrchestrator,
        store: &dyn StateStore,
        task: &Task,
    ) -> Result<(), OrchestratorError> {
        let kind = task.kind();
        if let Some(handler) = self.consumers.get(kind) {
            trace!(kind, "dispatching consumer task");
            return handler(orchestrator, task);
        }
        if let Some(handler) = self.impersonators.get(kind) {
            let Some(target) = task.impersonated_id.as_deref() else {
                return Err(OrchestratorError::MissingImpersonatedId { kind });
            };
            trace!(kind, target, "dispatching impersonating task");
            return handler(orchestrator, task, ImpersonatedState::new(store, target));
        }
        Err(OrchestratorError::UnhandledTaskKind(kind))
    }
}
