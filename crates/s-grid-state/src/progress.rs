//! ---
//! sgrid_section: "05-observed-state"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Observed state records and the versioned state store seam."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Observed provisioning progress of an agent's machine/process pair.
///
/// Progress only moves forward through start tasks; termination resets
/// the agent to `MachineTerminated` without deleting the record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentProgress {
    #[default]
    MachineTerminated,
    MachineStarted,
    AgentStarted,
}

impl AgentProgress {
    /// True once the machine has progressed past the terminated state.
    pub fn machine_is_up(&self) -> bool {
        !matches!(self, Self::MachineTerminated)
    }
}

/// Observed installation progress of a service.
///
/// `InstallingService` and `ServiceInstalled` alternate while instances
/// come and go; `ServiceUninstalled` is terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceProgress {
    #[default]
    InstallingService,
    ServiceInstalled,
    UninstallingService,
    ServiceUninstalled,
}
