//! ---
//! sgrid_section: "07-resilience-fault-tolerance"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Agent liveness probe and ping scheduling."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;
use tracing::{debug, trace};

use s_grid_common::config::HealthConfig;
use s_grid_common::time::Clock;
use s_grid_msg::{Task, TaskPayload, TaskReader};
use s_grid_state::{AgentState, StateError, StateReader};

/// Liveness classification of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentHealth {
    Reachable,
    Unreachable,
    Undetermined,
}

/// Defects surfaced while classifying agent health.
#[derive(Debug, Error)]
pub enum HealthError {
    /// A pending ping expects more restarts than were ever observed; the
    /// generation counters only grow, so something stamped a ping from
    /// the future.
    #[error(
        "ping for agent {agent_id} expects {expected} {counter} but only {observed} were observed"
    )]
    GenerationAhead {
        agent_id: String,
        counter: &'static str,
        expected: u64,
        observed: u64,
    },

    /// Pings carry both generation counters or neither.
    #[error("ping for agent {agent_id} carries a partial restart-generation stamp")]
    PartialGenerationStamp { agent_id: String },

    #[error(transparent)]
    State(#[from] StateError),
}

/// Classifies agents and schedules the pings that keep the
/// classification fresh.
///
/// An agent is `Reachable` while its newest answered ping is younger
/// than the unreachable threshold, `Unreachable` once an in-generation
/// ping went unanswered past that threshold (or the agent never
/// started), and `Undetermined` while the evidence is still in flight.
pub struct AgentHealthProbe {
    states: Arc<dyn StateReader>,
    tasks: Arc<dyn TaskReader>,
    clock: Arc<dyn Clock>,
    unreachable_threshold_millis: i64,
    renewal_threshold_millis: i64,
}

impl AgentHealthProbe {
    pub fn new(
        states: Arc<dyn StateReader>,
        tasks: Arc<dyn TaskReader>,
        clock: Arc<dyn Clock>,
        config: &HealthConfig,
    ) -> Self {
        Self {
            states,
            tasks,
            clock,
            unreachable_threshold_millis: config.unreachable_threshold.as_millis() as i64,
            renewal_threshold_millis: config.renewal_threshold().as_millis() as i64,
        }
    }

    /// Classify one agent from its state record and the pings still
    /// pending for it.
    pub fn classify(&self, agent_id: &str) -> Result<AgentHealth, HealthError> {
        let now = self.clock.now_millis();
        let agent = self.states.agent_state(agent_id)?;

        if let Some(answered) = last_answered_ping_millis(&agent) {
            if now - answered <= self.unreachable_threshold_millis {
                trace!(agent = agent_id, "agent answered a recent ping");
                return Ok(AgentHealth::Reachable);
            }
        }

        for ping in self.tasks.pending_tasks(agent_id) {
            let TaskPayload::PingAgent {
                expected_machine_starts,
                expected_agent_starts,
            } = ping.payload
            else {
                continue;
            };
            match (expected_machine_starts, expected_agent_starts) {
                (None, None) => {
                    match &agent {
                        // The machine came up after this probe was sent;
                        // its answer no longer tells us anything.
                        Some(state) if state.progress.machine_is_up() => {}
                        // Nothing ever started: the probe cannot be
                        // answered.
                        _ => return Ok(AgentHealth::Unreachable),
                    }
                }
                (Some(machine_starts), Some(agent_starts)) => {
                    let Some(state) = &agent else {
                        // Generation-stamped pings require a state record
                        // at stamping time; a missing record means the
                        // store lags behind. Wait.
                        continue;
                    };
                    if machine_starts > state.machine_starts {
                        return Err(HealthError::GenerationAhead {
                            agent_id: agent_id.to_owned(),
                            counter: "machine starts",
                            expected: machine_starts,
                            observed: state.machine_starts,
                        });
                    }
                    if machine_starts < state.machine_starts {
                        // Machine restarted since the ping was sent.
                        continue;
                    }
                    if agent_starts > state.agent_starts {
                        return Err(HealthError::GenerationAhead {
                            agent_id: agent_id.to_owned(),
                            counter: "agent starts",
                            expected: agent_starts,
                            observed: state.agent_starts,
                        });
                    }
                    if agent_starts < state.agent_starts {
                        continue;
                    }
                    if now - ping.producer_timestamp.timestamp_millis()
                        > self.unreachable_threshold_millis
                    {
                        debug!(agent = agent_id, "in-generation ping expired unanswered");
                        return Ok(AgentHealth::Unreachable);
                    }
                }
                _ => {
                    return Err(HealthError::PartialGenerationStamp {
                        agent_id: agent_id.to_owned(),
                    });
                }
            }
        }
        Ok(AgentHealth::Undetermined)
    }

    /// Build ping tasks for every monitored agent that needs one.
    ///
    /// Agents with an answer younger than the renewal threshold are
    /// skipped; everyone else is probed with their current restart
    /// generations (or without any for agents not yet known to have
    /// started). Deduplication against pings still pending is left to
    /// the emission chokepoint and the transport.
    pub fn ping_agents<'a>(
        &self,
        agent_ids: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<Task>, HealthError> {
        let now = self.clock.now();
        let now_millis = now.timestamp_millis();
        let mut pings = Vec::new();
        for agent_id in agent_ids {
            let agent = self.states.agent_state(agent_id)?;
            if let Some(answered) = last_answered_ping_millis(&agent) {
                let age = now_millis - answered;
                if age <= self.unreachable_threshold_millis && age < self.renewal_threshold_millis
                {
                    continue;
                }
            }
            let (expected_machine_starts, expected_agent_starts) = match &agent {
                Some(state) if state.progress.machine_is_up() => {
                    (Some(state.machine_starts), Some(state.agent_starts))
                }
                _ => (None, None),
            };
            trace!(agent = agent_id, "scheduling liveness ping");
            pings.push(Task::new(
                now,
                agent_id,
                TaskPayload::PingAgent {
                    expected_machine_starts,
                    expected_agent_starts,
                },
            ));
        }
        Ok(pings)
    }
}

fn last_answered_ping_millis(agent: &Option<AgentState>) -> Option<i64> {
    agent
        .as_ref()
        .and_then(|state| state.last_ping_source_timestamp)
        .map(|timestamp| timestamp.timestamp_millis())
}
