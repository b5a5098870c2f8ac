//! ---
//! sgrid_section: "01-core-functionality"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Primary orchestration and reconciliation core."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use s_grid_common::config::{HealthConfig, OrchestratorConfig};
use s_grid_common::time::Clock;
use s_grid_health::{AgentHealth, AgentHealthProbe};
use s_grid_msg::{Task, TaskPayload, TaskReader, TaskSink};
use s_grid_plan::{ServiceDeploymentPlan, ServiceGridDeploymentPlan};
use s_grid_state::{
    AgentProgress, AgentState, ImpersonatedState, ServiceInstanceState, ServiceProgress,
    ServiceState, StateReader, StateRecord,
};

use crate::error::OrchestratorError;
use crate::state::OrchestratorState;

/// The reconciliation core of the service grid.
///
/// One instance runs single-threaded and non-reentrant: `orchestrate`
/// executes to completion before the next invocation, performs only
/// synchronous reads, and expresses all actuation as emitted tasks.
pub struct ServiceGridOrchestrator {
    orchestrator_id: String,
    machine_provisioner_id: String,
    states: Arc<dyn StateReader>,
    sink: Arc<dyn TaskSink>,
    clock: Arc<dyn Clock>,
    probe: AgentHealthProbe,
    state: OrchestratorState,
}

impl ServiceGridOrchestrator {
    pub fn new(
        config: &OrchestratorConfig,
        health: &HealthConfig,
        states: Arc<dyn StateReader>,
        tasks: Arc<dyn TaskReader>,
        sink: Arc<dyn TaskSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::recover(
            config,
            health,
            states,
            tasks,
            sink,
            clock,
            OrchestratorState::default(),
        )
    }

    /// Resume reconciliation from bookkeeping persisted by a previous
    /// incarnation.
    pub fn recover(
        config: &OrchestratorConfig,
        health: &HealthConfig,
        states: Arc<dyn StateReader>,
        tasks: Arc<dyn TaskReader>,
        sink: Arc<dyn TaskSink>,
        clock: Arc<dyn Clock>,
        state: OrchestratorState,
    ) -> Self {
        let probe = AgentHealthProbe::new(states.clone(), tasks, clock.clone(), health);
        Self {
            orchestrator_id: config.orchestrator_id.clone(),
            machine_provisioner_id: config.machine_provisioner_id.clone(),
            states,
            sink,
            clock,
            probe,
            state,
        }
    }

    pub fn orchestrator_id(&self) -> &str {
        &self.orchestrator_id
    }

    /// Bookkeeping to persist for crash recovery.
    pub fn get_state(&self) -> &OrchestratorState {
        &self.state
    }

    /// One reconciliation pass; returns the tasks newly accepted by the
    /// transport.
    ///
    /// Convergence is staged: structural sync must find no divergence
    /// before agent and service lifecycles are progressed. Ping renewal
    /// runs every pass regardless.
    pub fn orchestrate(&mut self) -> Result<Vec<Task>, OrchestratorError> {
        let Some(plan) = self.state.deployment_plan.clone() else {
            trace!("no deployment plan installed");
            return Ok(Vec::new());
        };

        let mut proposed = Vec::new();
        let sync_complete = self.sync_state_with_deployment_plan(&plan, &mut proposed)?;
        if sync_complete {
            self.orchestrate_agents(&plan, &mut proposed)?;
            self.orchestrate_services(&plan, &mut proposed)?;
        } else {
            debug!("observed state diverges from the plan; lifecycle progression deferred");
        }
        self.schedule_pings(&plan, &mut proposed)?;

        let mut emitted = Vec::new();
        for task in proposed {
            if self.add_new_task_if_not_exists(&task) {
                emitted.push(task);
            }
        }
        Ok(emitted)
    }

    /// Single emission chokepoint; the transport suppresses tasks
    /// equivalent to one still pending.
    fn add_new_task_if_not_exists(&self, task: &Task) -> bool {
        self.sink.submit(task.clone())
    }

    /// Heal structural divergence between observed state and the plan.
    ///
    /// Returns `true` only when nothing had to be healed and no agent is
    /// in an undetermined health state.
    fn sync_state_with_deployment_plan(
        &self,
        plan: &ServiceGridDeploymentPlan,
        out: &mut Vec<Task>,
    ) -> Result<bool, OrchestratorError> {
        let now = self.clock.now();
        let mut sync_complete = true;

        for agent_id in plan.agent_ids() {
            match self.probe.classify(agent_id)? {
                AgentHealth::Reachable => {
                    for placement in plan.instances_on_agent(agent_id) {
                        let instance = self.states.instance_state(&placement.instance_id)?;
                        let diverged = instance.is_none_or(|state| !state.reachable);
                        if diverged {
                            sync_complete = false;
                            debug!(
                                agent = agent_id,
                                instance = %placement.instance_id,
                                "asking returned agent to recover instance state"
                            );
                            out.push(Task::impersonating(
                                now,
                                agent_id,
                                &placement.instance_id,
                                TaskPayload::RecoverServiceInstanceState {
                                    service_id: placement.service_id.clone(),
                                    state_machine: placement.state_machine.clone(),
                                },
                            ));
                        }
                    }
                }
                AgentHealth::Unreachable => {
                    if self.states.agent_state(agent_id)?.is_none() {
                        sync_complete = false;
                        let instance_ids = plan
                            .instances_on_agent(agent_id)
                            .map(|placement| placement.instance_id.clone())
                            .collect();
                        out.push(Task::impersonating(
                            now,
                            &self.orchestrator_id,
                            agent_id,
                            TaskPayload::PlanAgent { instance_ids },
                        ));
                    }
                    for placement in plan.instances_on_agent(agent_id) {
                        if self.states.instance_state(&placement.instance_id)?.is_none() {
                            sync_complete = false;
                            out.push(Task::impersonating(
                                now,
                                &self.orchestrator_id,
                                &placement.instance_id,
                                TaskPayload::PlanServiceInstance {
                                    agent_id: placement.agent_id.clone(),
                                    service_id: placement.service_id.clone(),
                                    state_machine: placement.state_machine.clone(),
                                },
                            ));
                        }
                    }
                }
                AgentHealth::Undetermined => {
                    trace!(agent = agent_id, "agent health undetermined; waiting");
                    sync_complete = false;
                }
            }
        }

        for service in plan.services() {
            let service_id = service.service_id();
            let observed = self.states.service_state(service_id)?;
            let observed_ids = observed
                .as_ref()
                .map(|state| state.instance_ids.clone())
                .unwrap_or_default();
            // Observed ∪ planned: scale-out additions become visible
            // immediately, scale-in removals stay until torn down.
            let mut union = observed_ids.clone();
            for placement in plan.instances_of_service(service_id) {
                if !union.iter().any(|id| id == &placement.instance_id) {
                    union.push(placement.instance_id.clone());
                }
            }
            if observed.is_none() || observed_ids != union {
                sync_complete = false;
                out.push(Task::impersonating(
                    now,
                    &self.orchestrator_id,
                    service_id,
                    TaskPayload::PlanService {
                        config: service.config.clone(),
                        instance_ids: union,
                    },
                ));
            }
        }
        Ok(sync_complete)
    }

    /// Drive planned agents up and termination-queued agents down.
    fn orchestrate_agents(
        &mut self,
        plan: &ServiceGridDeploymentPlan,
        out: &mut Vec<Task>,
    ) -> Result<(), OrchestratorError> {
        let now = self.clock.now();

        for agent_id in plan.agent_ids() {
            let Some(agent) = self.states.agent_state(agent_id)? else {
                return Err(OrchestratorError::MissingAgentState(agent_id.to_owned()));
            };
            match agent.progress {
                AgentProgress::MachineTerminated => {
                    out.push(Task::impersonating(
                        now,
                        &self.machine_provisioner_id,
                        agent_id,
                        TaskPayload::StartMachine,
                    ));
                }
                AgentProgress::MachineStarted => {
                    out.push(Task::impersonating(
                        now,
                        &self.machine_provisioner_id,
                        agent_id,
                        TaskPayload::StartAgent,
                    ));
                }
                AgentProgress::AgentStarted => {}
            }
        }

        let mut terminated = Vec::new();
        for agent_id in &self.state.pending_terminate {
            let Some(agent) = self.states.agent_state(agent_id)? else {
                // Never seeded, so there is no machine to tear down.
                terminated.push(agent_id.clone());
                continue;
            };
            match agent.progress {
                AgentProgress::MachineTerminated => terminated.push(agent_id.clone()),
                AgentProgress::MachineStarted | AgentProgress::AgentStarted => {
                    if agent.instance_ids.is_empty() {
                        let payload =
                            if self.probe.classify(agent_id)? == AgentHealth::Unreachable {
                                TaskPayload::TerminateMachineOfNonResponsiveAgent
                            } else {
                                TaskPayload::TerminateMachine
                            };
                        out.push(Task::impersonating(
                            now,
                            &self.machine_provisioner_id,
                            agent_id,
                            payload,
                        ));
                    } else {
                        trace!(
                            agent = %agent_id,
                            hosted = agent.instance_ids.len(),
                            "termination waits for hosted instances"
                        );
                    }
                }
            }
        }
        for agent_id in terminated {
            info!(agent = %agent_id, "agent machine termination complete");
            self.state.pending_terminate.retain(|id| id != &agent_id);
        }
        Ok(())
    }

    /// Progress installation of planned services and teardown of
    /// no-longer-planned services and instances.
    fn orchestrate_services(
        &mut self,
        plan: &ServiceGridDeploymentPlan,
        out: &mut Vec<Task>,
    ) -> Result<(), OrchestratorError> {
        for service in plan.services() {
            self.orchestrate_service(plan, service, false, out)?;
        }
        let pending: Vec<ServiceDeploymentPlan> =
            self.state.pending_uninstall.values().cloned().collect();
        for service in &pending {
            self.orchestrate_service(plan, service, true, out)?;
        }
        Ok(())
    }

    fn orchestrate_service(
        &mut self,
        plan: &ServiceGridDeploymentPlan,
        service: &ServiceDeploymentPlan,
        uninstalling: bool,
        out: &mut Vec<Task>,
    ) -> Result<(), OrchestratorError> {
        let now = self.clock.now();
        let service_id = service.service_id();
        let Some(service_state) = self.states.service_state(service_id)? else {
            if uninstalling {
                // Nothing was ever observed for this service.
                self.state.pending_uninstall.shift_remove(service_id);
                return Ok(());
            }
            return Err(OrchestratorError::MissingServiceState(service_id.to_owned()));
        };
        let end_state = service.config.instance_lifecycle.end_state().clone();
        let mut installation_pending = false;

        if !uninstalling {
            for placement in plan.instances_of_service(service_id) {
                let Some(agent) = self.states.agent_state(&placement.agent_id)? else {
                    return Err(OrchestratorError::MissingAgentState(
                        placement.agent_id.clone(),
                    ));
                };
                let Some(instance) = self.states.instance_state(&placement.instance_id)? else {
                    // Recovery of the instance record is still in flight.
                    installation_pending = true;
                    continue;
                };
                match agent.progress {
                    AgentProgress::AgentStarted => {
                        match instance.state_machine.find_next(&end_state)? {
                            Some(next) if &next != instance.state_machine.current_state() => {
                                installation_pending = true;
                                out.push(Task::impersonating(
                                    now,
                                    &placement.agent_id,
                                    &placement.instance_id,
                                    TaskPayload::ServiceInstanceLifecycle {
                                        desired_state: next,
                                    },
                                ));
                            }
                            Some(_) => {}
                            None => {
                                // The caller wired a lifecycle whose end
                                // state is not connected; nothing to do
                                // this pass.
                                debug!(
                                    instance = %placement.instance_id,
                                    desired = %end_state,
                                    "end state unreachable from current lifecycle state"
                                );
                            }
                        }
                    }
                    AgentProgress::MachineTerminated => {
                        installation_pending = true;
                        if instance.reachable {
                            out.push(Task::impersonating(
                                now,
                                &self.orchestrator_id,
                                &placement.instance_id,
                                TaskPayload::ServiceInstanceUnreachable,
                            ));
                        }
                    }
                    AgentProgress::MachineStarted => {
                        installation_pending = true;
                    }
                }
            }
        }

        // Existing instances no longer planned; all of them when the
        // whole service is being uninstalled.
        for instance_id in &service_state.instance_ids {
            let still_planned = !uninstalling
                && plan
                    .instance(instance_id)
                    .is_some_and(|placement| placement.service_id == service_id);
            if still_planned {
                continue;
            }
            let Some(instance) = self.states.instance_state(instance_id)? else {
                continue;
            };
            let Some(agent) = self.states.agent_state(&instance.agent_id)? else {
                continue;
            };
            match agent.progress {
                AgentProgress::MachineTerminated => {
                    if instance.reachable {
                        out.push(Task::impersonating(
                            now,
                            &self.orchestrator_id,
                            instance_id,
                            TaskPayload::ServiceInstanceUnreachable,
                        ));
                    }
                    self.push_membership_removal(now, &instance, instance_id, service_id, out);
                }
                AgentProgress::AgentStarted => {
                    if instance.state_machine.is_begin_state() {
                        self.push_membership_removal(now, &instance, instance_id, service_id, out);
                    } else {
                        let begin = instance.state_machine.begin_state().clone();
                        if let Some(previous) = instance.state_machine.find_next(&begin)? {
                            out.push(Task::impersonating(
                                now,
                                &instance.agent_id,
                                instance_id,
                                TaskPayload::ServiceInstanceLifecycle {
                                    desired_state: previous,
                                },
                            ));
                        }
                    }
                }
                AgentProgress::MachineStarted => {}
            }
        }

        if uninstalling {
            match service_state.progress {
                ServiceProgress::ServiceUninstalled => {
                    info!(service = service_id, "service uninstall complete");
                    self.state.pending_uninstall.shift_remove(service_id);
                }
                ServiceProgress::UninstallingService => {
                    if service_state.instance_ids.is_empty() {
                        out.push(self.progress_task(now, service_id, TaskPayload::ServiceUninstalled));
                    }
                }
                ServiceProgress::InstallingService | ServiceProgress::ServiceInstalled => {
                    out.push(self.progress_task(now, service_id, TaskPayload::ServiceUninstalling));
                }
            }
        } else {
            match service_state.progress {
                ServiceProgress::InstallingService if !installation_pending => {
                    out.push(self.progress_task(now, service_id, TaskPayload::ServiceInstalled));
                }
                ServiceProgress::ServiceInstalled if installation_pending => {
                    out.push(self.progress_task(now, service_id, TaskPayload::ServiceInstalling));
                }
                ServiceProgress::UninstallingService | ServiceProgress::ServiceUninstalled => {
                    // The service was re-planned while (or after) being
                    // torn down; installation reopens.
                    out.push(self.progress_task(now, service_id, TaskPayload::ServiceInstalling));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn push_membership_removal(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        instance: &ServiceInstanceState,
        instance_id: &str,
        service_id: &str,
        out: &mut Vec<Task>,
    ) {
        out.push(Task::impersonating(
            now,
            &self.orchestrator_id,
            &instance.agent_id,
            TaskPayload::RemoveServiceInstanceFromAgent {
                instance_id: instance_id.to_owned(),
            },
        ));
        out.push(Task::impersonating(
            now,
            &self.orchestrator_id,
            service_id,
            TaskPayload::RemoveServiceInstanceFromService {
                instance_id: instance_id.to_owned(),
            },
        ));
    }

    fn progress_task(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        service_id: &str,
        payload: TaskPayload,
    ) -> Task {
        Task::impersonating(now, &self.orchestrator_id, service_id, payload)
    }

    /// Renew liveness probes for planned and termination-queued agents.
    fn schedule_pings(
        &self,
        plan: &ServiceGridDeploymentPlan,
        out: &mut Vec<Task>,
    ) -> Result<(), OrchestratorError> {
        let mut roster: Vec<&str> = plan.agent_ids().collect();
        for agent_id in &self.state.pending_terminate {
            if !roster.contains(&agent_id.as_str()) {
                roster.push(agent_id);
            }
        }
        out.extend(self.probe.ping_agents(roster)?);
        Ok(())
    }
}

/// Task handlers exposed to the dispatcher. Each handler acts on exactly
/// one state-holder through the impersonated capability handle; only the
/// plan update touches the orchestrator's own bookkeeping.
impl ServiceGridOrchestrator {
    /// Install a new deployment plan wholesale, diffing the previous one
    /// into the teardown queues.
    pub fn update_deployment_plan(&mut self, task: &Task) -> Result<(), OrchestratorError> {
        let TaskPayload::UpdateDeploymentPlan { plan } = &task.payload else {
            return Err(unexpected("update_deployment_plan", task));
        };
        if let Some(previous) = self.state.deployment_plan.take() {
            for service in previous.services() {
                let removed = plan.service(service.service_id()).is_none();
                if removed && service.auto_uninstall {
                    debug!(
                        service = service.service_id(),
                        "service left the plan; queueing graceful uninstall"
                    );
                    self.state
                        .pending_uninstall
                        .insert(service.service_id().to_owned(), service.clone());
                } else if removed {
                    warn!(
                        service = service.service_id(),
                        "service left the plan without auto-uninstall; leaving teardown to the operator"
                    );
                }
            }
            for agent in previous.agents() {
                if !plan.has_agent(&agent.agent_id)
                    && !self.state.is_terminating_agent(&agent.agent_id)
                {
                    debug!(agent = %agent.agent_id, "agent left the plan; queueing machine termination");
                    self.state.pending_terminate.push(agent.agent_id.clone());
                }
            }
        }
        // Entries reintroduced by the new plan leave the teardown queues.
        self.state
            .pending_uninstall
            .retain(|service_id, _| plan.service(service_id).is_none());
        self.state
            .pending_terminate
            .retain(|agent_id| !plan.has_agent(agent_id));
        info!(
            services = plan.services().len(),
            instances = plan.instances().len(),
            agents = plan.agents().len(),
            "deployment plan installed"
        );
        self.state.deployment_plan = Some(plan.clone());
        Ok(())
    }

    /// Seed the observed state of a planned agent.
    pub fn plan_agent(
        &self,
        task: &Task,
        state: ImpersonatedState<'_>,
    ) -> Result<(), OrchestratorError> {
        let TaskPayload::PlanAgent { instance_ids } = &task.payload else {
            return Err(unexpected("plan_agent", task));
        };
        if state.agent_state()?.is_none() {
            debug!(agent = state.id(), "agent state seeded");
            state.put(StateRecord::Agent(AgentState::new_planned(
                instance_ids.clone(),
            )));
        }
        Ok(())
    }

    /// Align a service's observed membership with observed ∪ planned.
    pub fn plan_service(
        &self,
        task: &Task,
        state: ImpersonatedState<'_>,
    ) -> Result<(), OrchestratorError> {
        let TaskPayload::PlanService {
            config,
            instance_ids,
        } = &task.payload
        else {
            return Err(unexpected("plan_service", task));
        };
        let mut service = state.service_state()?.unwrap_or_else(|| {
            ServiceState::new_planned(config.instance_lifecycle.clone(), Vec::new())
        });
        service.instance_ids = instance_ids.clone();
        service.lifecycle = config.instance_lifecycle.clone();
        // A service re-planned after teardown starts installing again.
        if matches!(
            service.progress,
            ServiceProgress::UninstallingService | ServiceProgress::ServiceUninstalled
        ) {
            service.progress = ServiceProgress::InstallingService;
        }
        state.put(StateRecord::Service(service));
        Ok(())
    }

    /// Seed the observed state of a planned instance.
    pub fn plan_service_instance(
        &self,
        task: &Task,
        state: ImpersonatedState<'_>,
    ) -> Result<(), OrchestratorError> {
        let TaskPayload::PlanServiceInstance {
            agent_id,
            service_id,
            state_machine,
        } = &task.payload
        else {
            return Err(unexpected("plan_service_instance", task));
        };
        if state.instance_state()?.is_none() {
            debug!(instance = state.id(), agent = %agent_id, "instance state seeded");
            state.put(StateRecord::ServiceInstance(ServiceInstanceState::new(
                agent_id.clone(),
                service_id.clone(),
                state_machine.clone(),
            )));
        }
        Ok(())
    }

    pub fn service_installing(
        &self,
        _task: &Task,
        state: ImpersonatedState<'_>,
    ) -> Result<(), OrchestratorError> {
        set_service_progress(&state, ServiceProgress::InstallingService)
    }

    pub fn service_installed(
        &self,
        _task: &Task,
        state: ImpersonatedState<'_>,
    ) -> Result<(), OrchestratorError> {
        set_service_progress(&state, ServiceProgress::ServiceInstalled)
    }

    pub fn service_uninstalling(
        &self,
        _task: &Task,
        state: ImpersonatedState<'_>,
    ) -> Result<(), OrchestratorError> {
        set_service_progress(&state, ServiceProgress::UninstallingService)
    }

    pub fn service_uninstalled(
        &self,
        _task: &Task,
        state: ImpersonatedState<'_>,
    ) -> Result<(), OrchestratorError> {
        set_service_progress(&state, ServiceProgress::ServiceUninstalled)
    }

    /// Flag an instance whose hosting machine is presumed down.
    pub fn service_instance_unreachable(
        &self,
        _task: &Task,
        state: ImpersonatedState<'_>,
    ) -> Result<(), OrchestratorError> {
        let mut instance = state
            .instance_state()?
            .ok_or_else(|| OrchestratorError::MissingInstanceState(state.id().to_owned()))?;
        if instance.reachable {
            warn!(instance = state.id(), "marking service instance unreachable");
            instance.reachable = false;
            state.put(StateRecord::ServiceInstance(instance));
        }
        Ok(())
    }

    pub fn remove_service_instance_from_agent(
        &self,
        task: &Task,
        state: ImpersonatedState<'_>,
    ) -> Result<(), OrchestratorError> {
        let TaskPayload::RemoveServiceInstanceFromAgent { instance_id } = &task.payload else {
            return Err(unexpected("remove_service_instance_from_agent", task));
        };
        let mut agent = state
            .agent_state()?
            .ok_or_else(|| OrchestratorError::MissingAgentState(state.id().to_owned()))?;
        if agent.hosts_instance(instance_id) {
            debug!(agent = state.id(), instance = %instance_id, "instance removed from agent");
            agent.remove_instance(instance_id);
            state.put(StateRecord::Agent(agent));
        }
        Ok(())
    }

    pub fn remove_service_instance_from_service(
        &self,
        task: &Task,
        state: ImpersonatedState<'_>,
    ) -> Result<(), OrchestratorError> {
        let TaskPayload::RemoveServiceInstanceFromService { instance_id } = &task.payload else {
            return Err(unexpected("remove_service_instance_from_service", task));
        };
        let mut service = state
            .service_state()?
            .ok_or_else(|| OrchestratorError::MissingServiceState(state.id().to_owned()))?;
        if service.contains_instance(instance_id) {
            debug!(service = state.id(), instance = %instance_id, "instance removed from service");
            service.remove_instance(instance_id);
            state.put(StateRecord::Service(service));
        }
        Ok(())
    }
}

fn set_service_progress(
    state: &ImpersonatedState<'_>,
    progress: ServiceProgress,
) -> Result<(), OrchestratorError> {
    let mut service = state
        .service_state()?
        .ok_or_else(|| OrchestratorError::MissingServiceState(state.id().to_owned()))?;
    if service.progress != progress {
        debug!(
            service = state.id(),
            from = %service.progress,
            to = %progress,
            "service progress transition"
        );
        service.progress = progress;
        state.put(StateRecord::Service(service));
    }
    Ok(())
}

fn unexpected(expected: &'static str, task: &Task) -> OrchestratorError {
    OrchestratorError::UnexpectedPayload {
        expected,
        actual: task.kind(),
    }
}
