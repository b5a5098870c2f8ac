//! ---
//! sgrid_section: "05-observed-state"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Observed state records and the versioned state store seam."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use s_grid_lifecycle::LifecycleStateMachine;
use uuid::Uuid;

use crate::error::StateError;
use crate::progress::{AgentProgress, ServiceProgress};

/// Observed status of one agent.
///
/// Created by the orchestrator's `plan_agent` handler and mutated by the
/// machine provisioner and the agent process itself. The restart
/// generation counters distinguish successive starts of the same machine
/// or agent process so stale health pings can be discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub progress: AgentProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Instance ids this agent currently hosts.
    #[serde(default)]
    pub instance_ids: Vec<String>,
    /// Machine restart generation.
    pub machine_starts: u64,
    /// Agent-process restart generation.
    pub agent_starts: u64,
    /// Producer timestamp of the newest answered ping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ping_source_timestamp: Option<DateTime<Utc>>,
    /// Task id of the newest answered ping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ping_challenge: Option<Uuid>,
}

impl AgentState {
    /// Seed a freshly planned agent: machine terminated, no starts yet.
    pub fn new_planned(instance_ids: Vec<String>) -> Self {
        Self {
            progress: AgentProgress::MachineTerminated,
            ip_address: None,
            instance_ids,
            machine_starts: 0,
            agent_starts: 0,
            last_ping_source_timestamp: None,
            last_ping_challenge: None,
        }
    }

    pub fn hosts_instance(&self, instance_id: &str) -> bool {
        self.instance_ids.iter().any(|id| id == instance_id)
    }

    pub fn add_instance(&mut self, instance_id: impl Into<String>) {
        let instance_id = instance_id.into();
        if !self.hosts_instance(&instance_id) {
            self.instance_ids.push(instance_id);
        }
    }

    pub fn remove_instance(&mut self, instance_id: &str) {
        self.instance_ids.retain(|id| id != instance_id);
    }

    /// Termination keeps the record and its generations, only the
    /// progress falls back.
    pub fn reset_to_terminated(&mut self) {
        self.progress = AgentProgress::MachineTerminated;
        self.ip_address = None;
    }
}

/// Observed status of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceState {
    pub progress: ServiceProgress,
    /// Instance ids currently belonging to the service; scale-in removals
    /// leave this list only after teardown completes.
    #[serde(default)]
    pub instance_ids: Vec<String>,
    /// Lifecycle template of the owning service config.
    pub lifecycle: LifecycleStateMachine,
}

impl ServiceState {
    pub fn new_planned(lifecycle: LifecycleStateMachine, instance_ids: Vec<String>) -> Self {
        Self {
            progress: ServiceProgress::InstallingService,
            instance_ids,
            lifecycle,
        }
    }

    pub fn contains_instance(&self, instance_id: &str) -> bool {
        self.instance_ids.iter().any(|id| id == instance_id)
    }

    pub fn remove_instance(&mut self, instance_id: &str) {
        self.instance_ids.retain(|id| id != instance_id);
    }
}

/// Observed status of one service instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstanceState {
    /// Agent hosting the instance.
    pub agent_id: String,
    /// Owning service.
    pub service_id: String,
    /// Lifecycle machine tracking the state the instance actually
    /// reached.
    pub state_machine: LifecycleStateMachine,
    /// Cleared when the hosting machine is presumed down; recovery flips
    /// it back once the agent re-reports the instance.
    pub reachable: bool,
    /// Free-form properties reported by lifecycle executors.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, JsonValue>,
}

impl ServiceInstanceState {
    pub fn new(
        agent_id: impl Into<String>,
        service_id: impl Into<String>,
        state_machine: LifecycleStateMachine,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            service_id: service_id.into(),
            state_machine,
            reachable: true,
            properties: IndexMap::new(),
        }
    }
}

/// Tagged union persisted in the state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StateRecord {
    Agent(AgentState),
    Service(ServiceState),
    ServiceInstance(ServiceInstanceState),
}

impl StateRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Agent(_) => "agent",
            Self::Service(_) => "service",
            Self::ServiceInstance(_) => "service_instance",
        }
    }

    pub fn as_agent(&self, id: &str) -> Result<&AgentState, StateError> {
        match self {
            Self::Agent(state) => Ok(state),
            other => Err(kind_mismatch(id, "agent", other)),
        }
    }

    pub fn as_service(&self, id: &str) -> Result<&ServiceState, StateError> {
        match self {
            Self::Service(state) => Ok(state),
            other => Err(kind_mismatch(id, "service", other)),
        }
    }

    pub fn as_service_instance(&self, id: &str) -> Result<&ServiceInstanceState, StateError> {
        match self {
            Self::ServiceInstance(state) => Ok(state),
            other => Err(kind_mismatch(id, "service_instance", other)),
        }
    }
}

fn kind_mismatch(id: &str, expected: &'static str, actual: &StateRecord) -> StateError {
    StateError::KindMismatch {
        id: id.to_owned(),
        expected,
        actual: actual.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_membership_is_idempotent() {
        let mut agent = AgentState::new_planned(vec!["i-1".to_owned()]);
        agent.add_instance("i-1");
        agent.add_instance("i-2");
        agent.add_instance("i-2");
        assert_eq!(agent.instance_ids, vec!["i-1", "i-2"]);
        agent.remove_instance("i-1");
        assert!(!agent.hosts_instance("i-1"));
    }

    #[test]
    fn termination_preserves_generations() {
        let mut agent = AgentState::new_planned(Vec::new());
        agent.progress = AgentProgress::AgentStarted;
        agent.machine_starts = 3;
        agent.agent_starts = 5;
        agent.ip_address = Some("10.0.0.7".to_owned());
        agent.reset_to_terminated();
        assert_eq!(agent.progress, AgentProgress::MachineTerminated);
        assert_eq!(agent.machine_starts, 3);
        assert_eq!(agent.agent_starts, 5);
        assert!(agent.ip_address.is_none());
    }

    #[test]
    fn typed_accessors_reject_foreign_kinds() {
        let record = StateRecord::Agent(AgentState::new_planned(Vec::new()));
        assert!(record.as_agent("agent-1").is_ok());
        let err = record.as_service("agent-1").expect_err("kind mismatch");
        assert_eq!(
            err,
            StateError::KindMismatch {
                id: "agent-1".to_owned(),
                expected: "service",
                actual: "agent",
            }
        );
    }
}
