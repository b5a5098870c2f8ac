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
use serde::{Deserialize, Serialize};

use s_grid_plan::{ServiceDeploymentPlan, ServiceGridDeploymentPlan};

/// Orchestrator-owned bookkeeping, persisted for crash recovery.
///
/// Everything else the orchestrator acts on lives in the external state
/// store; a restarted orchestrator resumes reconciliation from this
/// value plus the observed state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorState {
    /// The installed deployment plan, replaced wholesale on every
    /// planning update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_plan: Option<ServiceGridDeploymentPlan>,
    /// Services that left the plan and await graceful teardown, keyed by
    /// service id, carrying the plan entry they were last deployed
    /// under.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub pending_uninstall: IndexMap<String, ServiceDeploymentPlan>,
    /// Agents that left the plan and whose machines await termination.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_terminate: Vec<String>,
}

impl OrchestratorState {
    pub fn is_terminating_agent(&self, agent_id: &str) -> bool {
        self.pending_terminate.iter().any(|id| id == agent_id)
    }
}
