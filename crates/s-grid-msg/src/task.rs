//! ---
//! sgrid_section: "02-messaging-ipc-data-model"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Task schema and transport seams."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use s_grid_lifecycle::{LifecycleState, LifecycleStateMachine};
use s_grid_plan::{ServiceConfig, ServiceGridDeploymentPlan};
use uuid::Uuid;

/// Work order envelope flowing through the task transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for tracing; ping tasks double it as the
    /// challenge echoed by the agent.
    pub id: Uuid,
    /// Stamped from the producer's injected clock, never the wall clock.
    pub producer_timestamp: DateTime<Utc>,
    /// Consumer the task is addressed to.
    pub consumer_id: String,
    /// State-holder the consumer acts upon when it differs from the
    /// consumer itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonated_id: Option<String>,
    pub payload: TaskPayload,
}

impl Task {
    /// Task addressed to a consumer acting on its own state.
    pub fn new(
        producer_timestamp: DateTime<Utc>,
        consumer_id: impl Into<String>,
        payload: TaskPayload,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            producer_timestamp,
            consumer_id: consumer_id.into(),
            impersonated_id: None,
            payload,
        }
    }

    /// Task addressed to a consumer acting on another entity's state.
    pub fn impersonating(
        producer_timestamp: DateTime<Utc>,
        consumer_id: impl Into<String>,
        impersonated_id: impl Into<String>,
        payload: TaskPayload,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            producer_timestamp,
            consumer_id: consumer_id.into(),
            impersonated_id: Some(impersonated_id.into()),
            payload,
        }
    }

    /// Registry tag of the payload.
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    /// Equality ignoring producer identity (task id and timestamp); this
    /// is the transport's deduplication key.
    pub fn is_equivalent(&self, other: &Task) -> bool {
        self.consumer_id == other.consumer_id
            && self.impersonated_id == other.impersonated_id
            && self.payload == other.payload
    }
}

/// Payloads understood across the grid, tagged for registry dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Install a new deployment plan wholesale (orchestrator-consumed).
    UpdateDeploymentPlan { plan: ServiceGridDeploymentPlan },
    /// Seed the observed state of a planned agent (orchestrator-consumed,
    /// impersonating the agent).
    PlanAgent { instance_ids: Vec<String> },
    /// Align a service's observed membership with observed ∪ planned
    /// (orchestrator-consumed, impersonating the service).
    PlanService {
        config: ServiceConfig,
        instance_ids: Vec<String>,
    },
    /// Seed the observed state of a planned instance
    /// (orchestrator-consumed, impersonating the instance).
    PlanServiceInstance {
        agent_id: String,
        service_id: String,
        state_machine: LifecycleStateMachine,
    },
    /// Ask a returned agent to re-report an instance it should host
    /// (agent-consumed, impersonating the instance).
    RecoverServiceInstanceState {
        service_id: String,
        state_machine: LifecycleStateMachine,
    },
    /// Machine provisioning (provisioner-consumed, impersonating the
    /// agent).
    StartMachine,
    StartAgent,
    TerminateMachine,
    /// Termination variant for machines whose agent stopped answering
    /// pings; provisioners skip the graceful shutdown path.
    TerminateMachineOfNonResponsiveAgent,
    /// Liveness probe (agent-consumed). Generation-less pings probe
    /// agents not yet known to have started.
    PingAgent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_machine_starts: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_agent_starts: Option<u64>,
    },
    /// Move an instance one lifecycle hop (agent-consumed, impersonating
    /// the instance).
    ServiceInstanceLifecycle { desired_state: LifecycleState },
    /// Flag an instance whose hosting machine is down
    /// (orchestrator-consumed, impersonating the instance).
    ServiceInstanceUnreachable,
    /// Membership teardown (orchestrator-consumed, impersonating the
    /// agent or the service respectively).
    RemoveServiceInstanceFromAgent { instance_id: String },
    RemoveServiceInstanceFromService { instance_id: String },
    /// Service progress transitions (orchestrator-consumed, impersonating
    /// the service).
    ServiceInstalling,
    ServiceInstalled,
    ServiceUninstalling,
    ServiceUninstalled,
}

impl TaskPayload {
    /// Tag used by handler registries and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpdateDeploymentPlan { .. } => "update_deployment_plan",
            Self::PlanAgent { .. } => "plan_agent",
            Self::PlanService { .. } => "plan_service",
            Self::PlanServiceInstance { .. } => "plan_service_instance",
            Self::RecoverServiceInstanceState { .. } => "recover_service_instance_state",
            Self::StartMachine => "start_machine",
            Self::StartAgent => "start_agent",
            Self::TerminateMachine => "terminate_machine",
            Self::TerminateMachineOfNonResponsiveAgent => {
                "terminate_machine_of_non_responsive_agent"
            }
            Self::PingAgent { .. } => "ping_agent",
            Self::ServiceInstanceLifecycle { .. } => "service_instance_lifecycle",
            Self::ServiceInstanceUnreachable => "service_instance_unreachable",
            Self::RemoveServiceInstanceFromAgent { .. } => "remove_service_instance_from_agent",
            Self::RemoveServiceInstanceFromService { .. } => {
                "remove_service_instance_from_service"
            }
            Self::ServiceInstalling => "service_installing",
            Self::ServiceInstalled => "service_installed",
            Self::ServiceUninstalling => "service_uninstalling",
            Self::ServiceUninstalled => "service_uninstalled",
        }
    }
}
