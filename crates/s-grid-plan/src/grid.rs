//! ---
//! sgrid_section: "04-deployment-planning"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Declarative deployment plan model and validation."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use s_grid_lifecycle::LifecycleStateMachine;

use crate::error::PlanError;
use crate::service::{ServiceConfig, ServiceDeploymentPlan};

/// Declaration that one agent participates in the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentPlan {
    pub agent_id: String,
}

impl AgentPlan {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
        }
    }
}

/// Placement of one service instance onto one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstanceDeploymentPlan {
    pub instance_id: String,
    pub agent_id: String,
    pub service_id: String,
    /// Initial lifecycle machine installed with the instance.
    pub state_machine: LifecycleStateMachine,
}

impl ServiceInstanceDeploymentPlan {
    /// Place an instance of `config` onto an agent, stamping the service's
    /// lifecycle template.
    pub fn for_service(
        config: &ServiceConfig,
        instance_id: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            agent_id: agent_id.into(),
            service_id: config.service_id.clone(),
            state_machine: config.instance_lifecycle.clone(),
        }
    }
}

/// Serialized shape of a plan; validation reruns on deserialization so a
/// plan arriving over the task transport carries the same guarantees as
/// one built in process.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GridPlanSpec {
    services: Vec<ServiceDeploymentPlan>,
    instances: Vec<ServiceInstanceDeploymentPlan>,
    agents: Vec<AgentPlan>,
}

/// The full desired state of the service grid.
///
/// An immutable value: planning updates replace the whole plan, and every
/// lookup is computed on demand from the declaration lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GridPlanSpec", into = "GridPlanSpec")]
pub struct ServiceGridDeploymentPlan {
    services: Vec<ServiceDeploymentPlan>,
    instances: Vec<ServiceInstanceDeploymentPlan>,
    agents: Vec<AgentPlan>,
}

impl ServiceGridDeploymentPlan {
    /// Build a plan, enforcing the structural invariants.
    pub fn new(
        services: Vec<ServiceDeploymentPlan>,
        instances: Vec<ServiceInstanceDeploymentPlan>,
        agents: Vec<AgentPlan>,
    ) -> Result<Self, PlanError> {
        let plan = Self {
            services,
            instances,
            agents,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Plan with no services, instances, or agents.
    pub fn empty() -> Self {
        Self {
            services: Vec::new(),
            instances: Vec::new(),
            agents: Vec::new(),
        }
    }

    fn validate(&self) -> Result<(), PlanError> {
        let mut service_ids = HashSet::new();
        for service in &self.services {
            service.config.validate()?;
            if !service_ids.insert(service.service_id()) {
                return Err(PlanError::DuplicateService(
                    service.service_id().to_owned(),
                ));
            }
        }

        let mut agent_ids = HashSet::new();
        for agent in &self.agents {
            if !agent_ids.insert(agent.agent_id.as_str()) {
                return Err(PlanError::DuplicateAgent(agent.agent_id.clone()));
            }
        }

        let mut instance_ids = HashSet::new();
        for instance in &self.instances {
            if !instance_ids.insert(instance.instance_id.as_str()) {
                return Err(PlanError::DuplicateInstanceId(instance.instance_id.clone()));
            }
            if !agent_ids.contains(instance.agent_id.as_str()) {
                return Err(PlanError::UnknownAgent {
                    instance_id: instance.instance_id.clone(),
                    agent_id: instance.agent_id.clone(),
                });
            }
            if !service_ids.contains(instance.service_id.as_str()) {
                return Err(PlanError::UnknownService {
                    instance_id: instance.instance_id.clone(),
                    service_id: instance.service_id.clone(),
                });
            }
        }

        for service in &self.services {
            let placements = self
                .instances
                .iter()
                .filter(|instance| instance.service_id == service.service_id())
                .count();
            if placements != service.config.planned_instances {
                return Err(PlanError::PlacementCountMismatch {
                    service_id: service.service_id().to_owned(),
                    expected: service.config.planned_instances,
                    actual: placements,
                });
            }
        }
        Ok(())
    }

    pub fn services(&self) -> &[ServiceDeploymentPlan] {
        &self.services
    }

    pub fn instances(&self) -> &[ServiceInstanceDeploymentPlan] {
        &self.instances
    }

    pub fn agents(&self) -> &[AgentPlan] {
        &self.agents
    }

    pub fn service(&self, service_id: &str) -> Option<&ServiceDeploymentPlan> {
        self.services
            .iter()
            .find(|service| service.service_id() == service_id)
    }

    pub fn instance(&self, instance_id: &str) -> Option<&ServiceInstanceDeploymentPlan> {
        self.instances
            .iter()
            .find(|instance| instance.instance_id == instance_id)
    }

    pub fn has_agent(&self, agent_id: &str) -> bool {
        self.agents.iter().any(|agent| agent.agent_id == agent_id)
    }

    pub fn agent_ids(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|agent| agent.agent_id.as_str())
    }

    pub fn instances_on_agent<'a>(
        &'a self,
        agent_id: &'a str,
    ) -> impl Iterator<Item = &'a ServiceInstanceDeploymentPlan> {
        self.instances
            .iter()
            .filter(move |instance| instance.agent_id == agent_id)
    }

    pub fn instances_of_service<'a>(
        &'a self,
        service_id: &'a str,
    ) -> impl Iterator<Item = &'a ServiceInstanceDeploymentPlan> {
        self.instances
            .iter()
            .filter(move |instance| instance.service_id == service_id)
    }
}

impl TryFrom<GridPlanSpec> for ServiceGridDeploymentPlan {
    type Error = PlanError;

    fn try_from(spec: GridPlanSpec) -> Result<Self, Self::Error> {
        Self::new(spec.services, spec.instances, spec.agents)
    }
}

impl From<ServiceGridDeploymentPlan> for GridPlanSpec {
    fn from(plan: ServiceGridDeploymentPlan) -> Self {
        Self {
            services: plan.services,
            instances: plan.instances,
            agents: plan.agents,
        }
    }
}
