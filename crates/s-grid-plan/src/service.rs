//! ---
//! sgrid_section: "04-deployment-planning"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Declarative deployment plan model and validation."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use s_grid_lifecycle::LifecycleStateMachine;

use crate::error::PlanError;

/// Immutable configuration of one deployable service.
///
/// Embedded in a plan version and never mutated afterwards; scaling or
/// lifecycle changes arrive as a new plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// URI-like opaque service identity.
    pub service_id: String,
    /// Human-readable name used in diagnostics.
    pub display_name: String,
    /// Grouping label shared by aliased deployments of the same service.
    pub alias_group: String,
    /// Number of instances the plan places.
    pub planned_instances: usize,
    /// Lower elasticity bound.
    pub min_instances: usize,
    /// Upper elasticity bound.
    pub max_instances: usize,
    /// Lifecycle template stamped onto every instance of this service.
    pub instance_lifecycle: LifecycleStateMachine,
}

impl ServiceConfig {
    pub(crate) fn validate(&self) -> Result<(), PlanError> {
        if self.service_id.trim().is_empty() {
            return Err(PlanError::EmptyServiceId);
        }
        let in_bounds = self.min_instances <= self.planned_instances
            && self.planned_instances <= self.max_instances;
        if !in_bounds {
            return Err(PlanError::InstanceCountOutOfBounds {
                service_id: self.service_id.clone(),
                planned: self.planned_instances,
                min: self.min_instances,
                max: self.max_instances,
            });
        }
        Ok(())
    }
}

/// One service entry of a deployment plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDeploymentPlan {
    pub config: ServiceConfig,
    /// Tear the service down gracefully when a later plan no longer names
    /// it; unset leaves decommissioning to the operator.
    #[serde(default = "ServiceDeploymentPlan::default_auto_uninstall")]
    pub auto_uninstall: bool,
}

impl ServiceDeploymentPlan {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            auto_uninstall: Self::default_auto_uninstall(),
        }
    }

    pub fn with_auto_uninstall(mut self, auto_uninstall: bool) -> Self {
        self.auto_uninstall = auto_uninstall;
        self
    }

    pub fn service_id(&self) -> &str {
        &self.config.service_id
    }

    const fn default_auto_uninstall() -> bool {
        true
    }
}
