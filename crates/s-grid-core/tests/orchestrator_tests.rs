//! ---
//! sgrid_section: "01-core-functionality"
//! sgrid_subsection: "integration-tests"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Convergence scenarios for the reconciliation core."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
//! Drives the orchestrator against mock external consumers (machine
//! provisioner and agent processes) over the in-memory broker and store,
//! with simulated time. No task result is ever awaited: every scenario
//! only advances the clock, runs passes, and lets the mocks consume what
//! the transport holds.

use std::sync::Arc;
use std::time::Duration;

use s_grid_common::config::{HealthConfig, OrchestratorConfig};
use s_grid_common::time::{Clock, ManualClock};
use s_grid_core::{OrchestratorState, ServiceGridOrchestrator, TaskHandlerRegistry};
use s_grid_lifecycle::{LifecycleName, LifecycleStateMachine, LifecycleStateMachineText};
use s_grid_msg::{MemoryTaskBroker, Task, TaskPayload, TaskSink};
use s_grid_plan::{
    AgentPlan, ServiceConfig, ServiceDeploymentPlan, ServiceGridDeploymentPlan,
    ServiceInstanceDeploymentPlan,
};
use s_grid_state::{
    AgentProgress, MemoryStateStore, ServiceInstanceState, ServiceProgress, StateReader,
    StateRecord, StateStore,
};

const ORCHESTRATOR: &str = "service-grid-orchestrator";
const PROVISIONER: &str = "machine-provisioner";
const WEB: &str = "urn:sgrid:web";

fn web_config(planned: usize) -> ServiceConfig {
    let name = LifecycleName::new("web").expect("valid name");
    let lifecycle = LifecycleStateMachine::new(
        name,
        LifecycleStateMachineText::new("web_cleaned<-->web_installed<-->web_started"),
        "web_cleaned",
        "web_started",
    )
    .expect("machine compiles");
    ServiceConfig {
        service_id: WEB.to_owned(),
        display_name: "web".to_owned(),
        alias_group: "web".to_owned(),
        planned_instances: planned,
        min_instances: 0,
        max_instances: 4,
        instance_lifecycle: lifecycle,
    }
}

fn web_plan(instance_ids: &[&str]) -> ServiceGridDeploymentPlan {
    let config = web_config(instance_ids.len());
    let placements = instance_ids
        .iter()
        .map(|id| ServiceInstanceDeploymentPlan::for_service(&config, *id, "agent-1"))
        .collect();
    ServiceGridDeploymentPlan::new(
        vec![ServiceDeploymentPlan::new(config)],
        placements,
        vec![AgentPlan::new("agent-1")],
    )
    .expect("plan validates")
}

struct GridHarness {
    store: Arc<MemoryStateStore>,
    broker: Arc<MemoryTaskBroker>,
    clock: Arc<ManualClock>,
    registry: TaskHandlerRegistry,
    orchestrator: ServiceGridOrchestrator,
    agents: Vec<String>,
}

impl GridHarness {
    fn new() -> Self {
        let store = Arc::new(MemoryStateStore::new());
        let broker = Arc::new(MemoryTaskBroker::new());
        let clock = Arc::new(ManualClock::at_epoch());
        let orchestrator = ServiceGridOrchestrator::new(
            &OrchestratorConfig::default(),
            &HealthConfig::default(),
            store.clone(),
            broker.clone(),
            broker.clone(),
            clock.clone(),
        );
        Self {
            store,
            broker,
            clock,
            registry: TaskHandlerRegistry::service_grid(),
            orchestrator,
            agents: Vec::new(),
        }
    }

    fn install_plan(&mut self, plan: ServiceGridDeploymentPlan) {
        for agent_id in plan.agent_ids() {
            if !self.agents.iter().any(|id| id == agent_id) {
                self.agents.push(agent_id.to_owned());
            }
        }
        self.broker.submit(Task::new(
            self.clock.now(),
            ORCHESTRATOR,
            TaskPayload::UpdateDeploymentPlan { plan },
        ));
        self.dispatch_orchestrator_tasks();
    }

    /// Advance simulated time and run one reconciliation pass, then let
    /// every consumer drain its queue.
    fn step(&mut self) -> Vec<Task> {
        self.clock.advance(Duration::from_secs(2));
        let emitted = self.orchestrator.orchestrate().expect("reconciliation pass");
        self.dispatch_orchestrator_tasks();
        self.run_provisioner();
        self.run_agents();
        emitted
    }

    fn run_until(&mut self, limit: usize, predicate: impl Fn(&GridHarness) -> bool) {
        for _ in 0..limit {
            if predicate(self) {
                return;
            }
            self.step();
        }
        panic!("predicate not reached within {limit} passes");
    }

    /// Steady state emits nothing beyond ping renewals.
    fn assert_quiescent(&mut self, passes: usize) {
        for _ in 0..passes {
            let emitted = self.step();
            let unexpected: Vec<&str> = emitted
                .iter()
                .map(Task::kind)
                .filter(|kind| *kind != "ping_agent")
                .collect();
            assert!(
                unexpected.is_empty(),
                "expected quiescence, got {unexpected:?}"
            );
        }
    }

    fn dispatch_orchestrator_tasks(&mut self) {
        while let Some(task) = self.broker.take_next(ORCHESTRATOR) {
            self.registry
                .dispatch(&mut self.orchestrator, self.store.as_ref(), &task)
                .expect("task handler");
        }
    }

    /// Mock machine provisioner: applies machine/agent start and
    /// termination synchronously.
    fn run_provisioner(&self) {
        while let Some(task) = self.broker.take_next(PROVISIONER) {
            let agent_id = task.impersonated_id.clone().expect("impersonated agent");
            let mut agent = self
                .store
                .agent_state(&agent_id)
                .expect("agent record")
                .expect("agent seeded");
            match task.payload {
                TaskPayload::StartMachine => {
                    if agent.progress == AgentProgress::MachineTerminated {
                        agent.progress = AgentProgress::MachineStarted;
                        agent.machine_starts += 1;
                        agent.ip_address = Some(format!("10.0.0.{}", agent.machine_starts));
                    }
                }
                TaskPayload::StartAgent => {
                    if agent.progress == AgentProgress::MachineStarted {
                        agent.progress = AgentProgress::AgentStarted;
                        agent.agent_starts += 1;
                    }
                }
                TaskPayload::TerminateMachine
                | TaskPayload::TerminateMachineOfNonResponsiveAgent => {
                    agent.reset_to_terminated();
                }
                ref other => panic!("unexpected provisioner task {}", other.kind()),
            }
            self.store.put(&agent_id, StateRecord::Agent(agent));
        }
    }

    /// Mock agent processes: a stopped agent leaves its queue pending,
    /// which is exactly what the health probe correlates against.
    fn run_agents(&self) {
        for agent_id in &self.agents {
            let Some(mut agent) = self.store.agent_state(agent_id).expect("agent record")
            else {
                continue;
            };
            if agent.progress != AgentProgress::AgentStarted {
                continue;
            }
            let mut dirty = false;
            while let Some(task) = self.broker.take_next(agent_id) {
                match &task.payload {
                    TaskPayload::PingAgent { .. } => {
                        let newer = agent
                            .last_ping_source_timestamp
                            .is_none_or(|seen| task.producer_timestamp > seen);
                        if newer {
                            agent.last_ping_source_timestamp = Some(task.producer_timestamp);
                            agent.last_ping_challenge = Some(task.id);
                            dirty = true;
                        }
                    }
                    TaskPayload::ServiceInstanceLifecycle { desired_state } => {
                        let instance_id =
                            task.impersonated_id.clone().expect("impersonated instance");
                        let mut instance = self
                            .store
                            .instance_state(&instance_id)
                            .expect("instance record")
                            .expect("instance seeded");
                        instance
                            .state_machine
                            .set_current_state(desired_state.clone())
                            .expect("declared state");
                        instance.reachable = true;
                        self.store
                            .put(&instance_id, StateRecord::ServiceInstance(instance));
                        if !agent.hosts_instance(&instance_id) {
                            agent.add_instance(instance_id);
                            dirty = true;
                        }
                    }
                    TaskPayload::RecoverServiceInstanceState {
                        service_id,
                        state_machine,
                    } => {
                        let instance_id =
                            task.impersonated_id.clone().expect("impersonated instance");
                        let recovered = match self
                            .store
                            .instance_state(&instance_id)
                            .expect("instance record")
                        {
                            Some(mut existing) => {
                                existing.reachable = true;
                                existing
                            }
                            None => ServiceInstanceState::new(
                                agent_id.clone(),
                                service_id.clone(),
                                state_machine.clone(),
                            ),
                        };
                        self.store
                            .put(&instance_id, StateRecord::ServiceInstance(recovered));
                        if !agent.hosts_instance(&instance_id) {
                            agent.add_instance(instance_id);
                            dirty = true;
                        }
                    }
                    other => panic!("unexpected agent task {}", other.kind()),
                }
            }
            if dirty {
                self.store.put(agent_id, StateRecord::Agent(agent));
            }
        }
    }

    fn service_installed(&self) -> bool {
        self.store
            .service_state(WEB)
            .expect("service record")
            .is_some_and(|service| service.progress == ServiceProgress::ServiceInstalled)
    }

    fn service_instance_ids(&self) -> Vec<String> {
        self.store
            .service_state(WEB)
            .expect("service record")
            .map(|service| service.instance_ids)
            .unwrap_or_default()
    }

    fn agent_hosted_ids(&self) -> Vec<String> {
        self.store
            .agent_state("agent-1")
            .expect("agent record")
            .map(|agent| agent.instance_ids)
            .unwrap_or_default()
    }
}

#[test]
fn installs_a_single_instance_service_to_its_end_state() {
    let mut harness = GridHarness::new();
    harness.install_plan(web_plan(&["urn:sgrid:web/1"]));

    harness.run_until(100, GridHarness::service_installed);

    let agent = harness
        .store
        .agent_state("agent-1")
        .expect("agent record")
        .expect("agent seeded");
    assert_eq!(agent.progress, AgentProgress::AgentStarted);
    assert_eq!(harness.service_instance_ids(), vec!["urn:sgrid:web/1"]);
    assert_eq!(harness.agent_hosted_ids(), vec!["urn:sgrid:web/1"]);

    let instance = harness
        .store
        .instance_state("urn:sgrid:web/1")
        .expect("instance record")
        .expect("instance seeded");
    assert!(instance.reachable);
    assert!(instance.state_machine.is_end_state());
}

#[test]
fn converged_grids_emit_no_further_work() {
    let mut harness = GridHarness::new();
    harness.install_plan(web_plan(&["urn:sgrid:web/1"]));
    harness.run_until(100, GridHarness::service_installed);

    harness.assert_quiescent(20);
}

#[test]
fn scale_out_is_visible_immediately() {
    let mut harness = GridHarness::new();
    harness.install_plan(web_plan(&["urn:sgrid:web/1"]));
    harness.run_until(100, GridHarness::service_installed);

    harness.install_plan(web_plan(&["urn:sgrid:web/1", "urn:sgrid:web/2"]));
    let emitted = harness.step();
    assert!(
        emitted.iter().any(|task| matches!(
            &task.payload,
            TaskPayload::PlanService { instance_ids, .. }
                if instance_ids.iter().any(|id| id == "urn:sgrid:web/2")
        )),
        "scale-out must re-plan the service with the union of instance ids"
    );
    assert!(harness
        .service_instance_ids()
        .contains(&"urn:sgrid:web/2".to_owned()));

    harness.run_until(100, |harness| {
        harness.service_installed()
            && harness
                .store
                .instance_state("urn:sgrid:web/2")
                .expect("instance record")
                .is_some_and(|instance| instance.state_machine.is_end_state())
    });
    assert_eq!(harness.agent_hosted_ids().len(), 2);
}

#[test]
fn service_progress_regresses_only_for_new_instances() {
    let mut harness = GridHarness::new();
    harness.install_plan(web_plan(&["urn:sgrid:web/1"]));
    harness.run_until(100, GridHarness::service_installed);
    harness.assert_quiescent(10);

    harness.install_plan(web_plan(&["urn:sgrid:web/1", "urn:sgrid:web/2"]));
    let mut saw_installing = false;
    for _ in 0..100 {
        let emitted = harness.step();
        saw_installing |= emitted
            .iter()
            .any(|task| task.kind() == "service_installing");
        if harness.service_installed() && harness.agent_hosted_ids().len() == 2 {
            break;
        }
    }
    assert!(
        saw_installing,
        "a genuinely new instance must reopen installation"
    );
    harness.assert_quiescent(10);
}

#[test]
fn scale_in_defers_removal_until_teardown_completes() {
    let mut harness = GridHarness::new();
    harness.install_plan(web_plan(&["urn:sgrid:web/1", "urn:sgrid:web/2"]));
    harness.run_until(100, |harness| {
        harness.service_installed() && harness.agent_hosted_ids().len() == 2
    });

    harness.install_plan(web_plan(&["urn:sgrid:web/1"]));
    harness.step();
    assert!(
        harness
            .service_instance_ids()
            .contains(&"urn:sgrid:web/2".to_owned()),
        "scale-in keeps the instance visible until it is torn down"
    );

    harness.run_until(100, |harness| {
        harness.service_instance_ids() == vec!["urn:sgrid:web/1".to_owned()]
    });
    assert_eq!(harness.agent_hosted_ids(), vec!["urn:sgrid:web/1"]);
    let removed = harness
        .store
        .instance_state("urn:sgrid:web/2")
        .expect("instance record")
        .expect("record is never deleted");
    assert!(removed.state_machine.is_begin_state());
    assert!(harness.service_installed());
    harness.assert_quiescent(10);
}

#[test]
fn plan_removal_uninstalls_the_service_and_terminates_the_agent() {
    let mut harness = GridHarness::new();
    harness.install_plan(web_plan(&["urn:sgrid:web/1"]));
    harness.run_until(100, GridHarness::service_installed);

    harness.install_plan(ServiceGridDeploymentPlan::empty());
    assert!(harness
        .orchestrator
        .get_state()
        .pending_uninstall
        .contains_key(WEB));
    assert!(harness.orchestrator.get_state().is_terminating_agent("agent-1"));

    harness.run_until(100, |harness| {
        let agent_terminated = harness
            .store
            .agent_state("agent-1")
            .expect("agent record")
            .is_some_and(|agent| agent.progress == AgentProgress::MachineTerminated);
        agent_terminated
            && harness.orchestrator.get_state().pending_uninstall.is_empty()
            && harness.orchestrator.get_state().pending_terminate.is_empty()
    });

    let service = harness
        .store
        .service_state(WEB)
        .expect("service record")
        .expect("record is never deleted");
    assert_eq!(service.progress, ServiceProgress::ServiceUninstalled);
    assert!(service.instance_ids.is_empty());
    assert!(harness.agent_hosted_ids().is_empty());
    harness.assert_quiescent(10);
}

#[test]
fn machine_crash_is_healed_by_recovery() {
    let mut harness = GridHarness::new();
    harness.install_plan(web_plan(&["urn:sgrid:web/1"]));
    harness.run_until(100, GridHarness::service_installed);

    // Machine dies out-of-band; an external monitor resets the record.
    let mut agent = harness
        .store
        .agent_state("agent-1")
        .expect("agent record")
        .expect("agent seeded");
    agent.reset_to_terminated();
    harness.store.put("agent-1", StateRecord::Agent(agent));

    harness.run_until(150, |harness| {
        harness.service_installed()
            && harness
                .store
                .agent_state("agent-1")
                .expect("agent record")
                .is_some_and(|agent| {
                    agent.progress == AgentProgress::AgentStarted && agent.machine_starts == 2
                })
            && harness
                .store
                .instance_state("urn:sgrid:web/1")
                .expect("instance record")
                .is_some_and(|instance| {
                    instance.reachable && instance.state_machine.is_end_state()
                })
    });
    harness.assert_quiescent(10);
}

#[test]
fn a_restarted_orchestrator_resumes_from_persisted_bookkeeping() {
    let mut harness = GridHarness::new();
    harness.install_plan(web_plan(&["urn:sgrid:web/1"]));
    harness.run_until(100, GridHarness::service_installed);

    // Queue a full teardown, then crash the orchestrator mid-flight.
    harness.install_plan(ServiceGridDeploymentPlan::empty());
    harness.step();

    let snapshot =
        serde_json::to_string(harness.orchestrator.get_state()).expect("state serializes");
    let recovered: OrchestratorState =
        serde_json::from_str(&snapshot).expect("state deserializes");
    harness.orchestrator = ServiceGridOrchestrator::recover(
        &OrchestratorConfig::default(),
        &HealthConfig::default(),
        harness.store.clone(),
        harness.broker.clone(),
        harness.broker.clone(),
        harness.clock.clone(),
        recovered,
    );

    harness.run_until(100, |harness| {
        harness.orchestrator.get_state().pending_uninstall.is_empty()
            && harness.orchestrator.get_state().pending_terminate.is_empty()
    });
    let service = harness
        .store
        .service_state(WEB)
        .expect("service record")
        .expect("record is never deleted");
    assert_eq!(service.progress, ServiceProgress::ServiceUninstalled);
}
