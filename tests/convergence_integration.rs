//! ---
//! sgrid_section: "15-testing-qa-runbook"
//! sgrid_subsection: "integration-tests"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "End-to-end convergence of the full S-GRID stack."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
//! Full-stack convergence: the tokio reconciler runtime, the wall clock,
//! and asynchronous mock consumers for the machine provisioner and the
//! agent process. Health thresholds are shrunk so unreachable windows
//! elapse in real time within the test budget.

use std::sync::Arc;
use std::time::Duration;

use s_grid_common::config::{HealthConfig, OrchestratorConfig};
use s_grid_common::time::SystemClock;
use s_grid_core::{spawn_reconciler, ServiceGridOrchestrator, TaskHandlerRegistry};
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
use tokio::task::JoinHandle;

const WEB: &str = "urn:sgrid:web";
const AGENT: &str = "agent-1";

fn web_plan() -> ServiceGridDeploymentPlan {
    let name = LifecycleName::new("web").expect("valid name");
    let lifecycle = LifecycleStateMachine::new(
        name,
        LifecycleStateMachineText::new("web_cleaned<-->web_installed<-->web_started"),
        "web_cleaned",
        "web_started",
    )
    .expect("machine compiles");
    let config = ServiceConfig {
        service_id: WEB.to_owned(),
        display_name: "web".to_owned(),
        alias_group: "web".to_owned(),
        planned_instances: 1,
        min_instances: 0,
        max_instances: 2,
        instance_lifecycle: lifecycle,
    };
    let placement = ServiceInstanceDeploymentPlan::for_service(&config, "urn:sgrid:web/1", AGENT);
    ServiceGridDeploymentPlan::new(
        vec![ServiceDeploymentPlan::new(config)],
        vec![placement],
        vec![AgentPlan::new(AGENT)],
    )
    .expect("plan validates")
}

/// Mock machine provisioner: applies start/terminate tasks to the store.
fn spawn_provisioner(
    store: Arc<MemoryStateStore>,
    broker: Arc<MemoryTaskBroker>,
    consumer_id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            while let Some(task) = broker.take_next(&consumer_id) {
                let agent_id = task.impersonated_id.clone().expect("impersonated agent");
                let mut agent = store
                    .agent_state(&agent_id)
                    .expect("agent record")
                    .expect("agent seeded");
                match task.payload {
                    TaskPayload::StartMachine => {
                        if agent.progress == AgentProgress::MachineTerminated {
                            agent.progress = AgentProgress::MachineStarted;
                            agent.machine_starts += 1;
                            agent.ip_address = Some("10.0.0.1".to_owned());
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
                store.put(&agent_id, StateRecord::Agent(agent));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
}

/// Mock agent process: only consumes its queue while its machine runs
/// with a started agent, exactly like the real thing.
fn spawn_agent(
    store: Arc<MemoryStateStore>,
    broker: Arc<MemoryTaskBroker>,
    agent_id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let running = store
                .agent_state(&agent_id)
                .expect("agent record")
                .is_some_and(|agent| agent.progress == AgentProgress::AgentStarted);
            if running {
                while let Some(task) = broker.take_next(&agent_id) {
                    let mut agent = store
                        .agent_state(&agent_id)
                        .expect("agent record")
                        .expect("agent seeded");
                    match &task.payload {
                        TaskPayload::PingAgent { .. } => {
                            let newer = agent
                                .last_ping_source_timestamp
                                .is_none_or(|seen| task.producer_timestamp > seen);
                            if newer {
                                agent.last_ping_source_timestamp = Some(task.producer_timestamp);
                                agent.last_ping_challenge = Some(task.id);
                                store.put(&agent_id, StateRecord::Agent(agent));
                            }
                        }
                        TaskPayload::ServiceInstanceLifecycle { desired_state } => {
                            let instance_id =
                                task.impersonated_id.clone().expect("impersonated instance");
                            let mut instance = store
                                .instance_state(&instance_id)
                                .expect("instance record")
                                .expect("instance seeded");
                            instance
                                .state_machine
                                .set_current_state(desired_state.clone())
                                .expect("declared state");
                            instance.reachable = true;
                            store.put(&instance_id, StateRecord::ServiceInstance(instance));
                            agent.add_instance(instance_id);
                            store.put(&agent_id, StateRecord::Agent(agent));
                        }
                        TaskPayload::RecoverServiceInstanceState {
                            service_id,
                            state_machine,
                        } => {
                            let instance_id =
                                task.impersonated_id.clone().expect("impersonated instance");
                            let recovered = match store
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
                            store.put(&instance_id, StateRecord::ServiceInstance(recovered));
                            agent.add_instance(instance_id);
                            store.put(&agent_id, StateRecord::Agent(agent));
                        }
                        other => panic!("unexpected agent task {}", other.kind()),
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
}

async fn wait_for(
    timeout: Duration,
    mut condition: impl FnMut() -> bool,
    what: &str,
) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_stack_install_and_uninstall_converges() {
    let store = Arc::new(MemoryStateStore::new());
    let broker = Arc::new(MemoryTaskBroker::new());
    let orchestrator_config = OrchestratorConfig::default();
    let health = HealthConfig {
        unreachable_threshold: Duration::from_secs(2),
    };

    let orchestrator = ServiceGridOrchestrator::new(
        &orchestrator_config,
        &health,
        store.clone(),
        broker.clone(),
        broker.clone(),
        Arc::new(SystemClock),
    );
    let runtime = spawn_reconciler(
        orchestrator,
        TaskHandlerRegistry::service_grid(),
        broker.clone(),
        store.clone(),
        Duration::from_millis(10),
    );
    let provisioner = spawn_provisioner(
        store.clone(),
        broker.clone(),
        orchestrator_config.machine_provisioner_id.clone(),
    );
    let agent = spawn_agent(store.clone(), broker.clone(), AGENT.to_owned());

    broker.submit(Task::new(
        chrono::Utc::now(),
        orchestrator_config.orchestrator_id.as_str(),
        TaskPayload::UpdateDeploymentPlan { plan: web_plan() },
    ));

    // Install: exactly one instance, present in both memberships, at the
    // lifecycle end state.
    wait_for(
        Duration::from_secs(30),
        || {
            let installed = store
                .service_state(WEB)
                .expect("service record")
                .is_some_and(|service| {
                    service.progress == ServiceProgress::ServiceInstalled
                        && service.instance_ids == vec!["urn:sgrid:web/1".to_owned()]
                });
            let hosted = store
                .agent_state(AGENT)
                .expect("agent record")
                .is_some_and(|agent| agent.instance_ids == vec!["urn:sgrid:web/1".to_owned()]);
            let at_end = store
                .instance_state("urn:sgrid:web/1")
                .expect("instance record")
                .is_some_and(|instance| {
                    instance.reachable && instance.state_machine.is_end_state()
                });
            installed && hosted && at_end
        },
        "service installation to converge",
    )
    .await;

    // Uninstall: remove the service and the agent from the plan.
    broker.submit(Task::new(
        chrono::Utc::now(),
        orchestrator_config.orchestrator_id.as_str(),
        TaskPayload::UpdateDeploymentPlan {
            plan: ServiceGridDeploymentPlan::empty(),
        },
    ));

    wait_for(
        Duration::from_secs(30),
        || {
            let uninstalled = store
                .service_state(WEB)
                .expect("service record")
                .is_some_and(|service| {
                    service.progress == ServiceProgress::ServiceUninstalled
                        && service.instance_ids.is_empty()
                });
            let terminated = store
                .agent_state(AGENT)
                .expect("agent record")
                .is_some_and(|agent| {
                    agent.progress == AgentProgress::MachineTerminated
                        && agent.instance_ids.is_empty()
                });
            uninstalled && terminated
        },
        "service uninstall and machine termination to converge",
    )
    .await;

    provisioner.abort();
    agent.abort();
    runtime.shutdown().await;
}
