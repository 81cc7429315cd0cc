//! End-to-end scaling scenarios.
//!
//! Drives the full capture → decide → actuate path against a static
//! cluster and an in-memory fleet.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use fleetscale_autoscale::*;
use fleetscale_fleet::{FleetOp, GroupMember, InMemoryFleet, ManagedGroup};
use fleetscale_placement::{InstanceCatalog, InstanceType};
use fleetscale_rollout::{FleetRefresher, RefreshConfig};
use fleetscale_state::*;

fn node(id: &str, cpu: u64, mem: u64) -> Node {
    Node {
        id: id.to_string(),
        datacenter: "dc1".to_string(),
        eligible: true,
        ready: true,
        total_resources: ResourceQuantity::new(cpu, mem),
        reserved_resources: ResourceQuantity::ZERO,
    }
}

fn alloc(node: &str, job: &str, cpu: u64, mem: u64) -> Allocation {
    Allocation {
        id: format!("{node}-{job}"),
        node_id: node.to_string(),
        job_id: job.to_string(),
        resources: ResourceQuantity::new(cpu, mem),
        lifecycle: AllocationStatus::Running,
        desired: DesiredStatus::Run,
    }
}

fn job(id: &str, priority: u32) -> JobMeta {
    JobMeta {
        id: id.to_string(),
        priority,
        queued: BTreeMap::new(),
    }
}

fn blocked(job_id: &str, cpu: u64, mem: u64) -> Evaluation {
    let mut exhausted = BTreeMap::new();
    exhausted.insert("task".to_string(), ResourceQuantity::new(cpu, mem));
    let mut groups = BTreeMap::new();
    groups.insert(
        "group".to_string(),
        FailedTaskGroup {
            datacenters: vec!["dc1".to_string()],
            exhausted,
        },
    );
    Evaluation {
        id: format!("eval-{job_id}"),
        job_id: job_id.to_string(),
        status: EvaluationStatus::Blocked,
        failed_task_groups: groups,
    }
}

/// Two 5000/5000 nodes at 92% use.
fn busy_cluster() -> StaticStateProvider {
    StaticStateProvider::new()
        .with_nodes(vec![node("n1", 5000, 5000), node("n2", 5000, 5000)])
        .with_allocations(vec![alloc("n1", "web", 4600, 4600), alloc("n2", "web", 4600, 4600)])
        .with_jobs(vec![job("web", 50)])
}

/// Three 2000/2000 nodes: A runs priority 0, B priority 5, C priority 10.
fn quiet_cluster(c_load: u64) -> StaticStateProvider {
    StaticStateProvider::new()
        .with_nodes(vec![node("c", 2000, 2000), node("b", 2000, 2000), node("a", 2000, 2000)])
        .with_allocations(vec![
            alloc("a", "batch", 50, 50),
            alloc("b", "api", 5, 5),
            alloc("c", "db", c_load, c_load),
        ])
        .with_jobs(vec![job("batch", 0), job("api", 5), job("db", 10)])
}

fn autoscaler(
    state: Arc<StaticStateProvider>,
    fleet: Arc<InMemoryFleet>,
    policy: ScalingPolicy,
) -> Autoscaler {
    let catalog = InstanceCatalog::new(vec![
        InstanceType::new("small", 0.10, 2, 4096),
        InstanceType::new("large", 0.40, 8, 16384),
    ])
    .unwrap();
    let dry_run = policy.dry_run;
    let engine =
        DecisionEngine::new(policy, catalog).with_namer(SequentialGroupNames::new("nm-auto-"));
    Autoscaler::new(state, engine, Actuator::new(fleet, dry_run))
}

fn policy(step: usize) -> ScalingPolicy {
    ScalingPolicy {
        scale_down_step: step,
        ..Default::default()
    }
}

#[tokio::test]
async fn busy_cluster_without_blocked_work_does_nothing() {
    let fleet = Arc::new(InMemoryFleet::default());
    let scaler = autoscaler(Arc::new(busy_cluster()), fleet.clone(), policy(1));

    assert_eq!(scaler.evaluate().await.unwrap(), Decision::NoChange);
    assert_eq!(scaler.run_once().await, IterationOutcome::Idle);
    assert!(fleet.operations().await.is_empty());
}

#[tokio::test]
async fn blocked_work_provisions_the_cheapest_group() {
    let state = busy_cluster().with_evaluations(vec![blocked("web", 2000, 2048)]);
    let fleet = Arc::new(InMemoryFleet::default());
    let scaler = autoscaler(Arc::new(state), fleet.clone(), policy(1));

    assert_eq!(scaler.run_once().await, IterationOutcome::Acted);
    assert_eq!(
        fleet.operations().await,
        vec![FleetOp::CreateGroup {
            name: "nm-auto-00000000".to_string(),
            instance_type: "small".to_string(),
        }]
    );
}

#[tokio::test]
async fn blocked_work_wins_over_an_idle_fleet() {
    let state = quiet_cluster(100).with_evaluations(vec![blocked("web", 1000, 1024)]);
    let fleet = Arc::new(InMemoryFleet::default());
    let scaler = autoscaler(Arc::new(state), fleet.clone(), policy(3));

    let decision = scaler.evaluate().await.unwrap();
    assert!(matches!(decision, Decision::ScaleUp(_)));
    assert!(
        decision
            .intents()
            .iter()
            .all(|i| matches!(i, ScalingIntent::ProvisionGroup { .. }))
    );
}

#[tokio::test]
async fn lowest_priority_node_is_removed_first() {
    let fleet = Arc::new(InMemoryFleet::default());
    let scaler = autoscaler(Arc::new(quiet_cluster(1800)), fleet.clone(), policy(3));

    assert_eq!(scaler.run_once().await, IterationOutcome::Acted);
    assert_eq!(
        fleet.operations().await,
        vec![FleetOp::TerminateInstance {
            node_id: "a".to_string()
        }]
    );
}

#[tokio::test]
async fn removals_are_capped_by_step() {
    let state = Arc::new(quiet_cluster(1000));

    let one = Arc::new(InMemoryFleet::default());
    autoscaler(state.clone(), one.clone(), policy(1)).run_once().await;
    assert_eq!(one.operations().await.len(), 1);

    let two = Arc::new(InMemoryFleet::default());
    autoscaler(state, two.clone(), policy(2)).run_once().await;
    assert_eq!(
        two.operations().await,
        vec![
            FleetOp::TerminateInstance {
                node_id: "a".to_string()
            },
            FleetOp::TerminateInstance {
                node_id: "b".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn removing_the_only_node_of_a_managed_group_deletes_the_group() {
    let fleet = Arc::new(InMemoryFleet::default().with_node("a", "nm-auto-0a0a0a0a"));
    let scaler = autoscaler(Arc::new(quiet_cluster(1800)), fleet.clone(), policy(1));

    scaler.run_once().await;
    assert_eq!(
        fleet.operations().await,
        vec![FleetOp::DeleteGroup {
            name: "nm-auto-0a0a0a0a".to_string()
        }]
    );
}

#[tokio::test]
async fn dry_run_decides_but_never_mutates() {
    let fleet = Arc::new(InMemoryFleet::default());
    let dry = ScalingPolicy {
        dry_run: true,
        ..policy(3)
    };
    let scaler = autoscaler(Arc::new(quiet_cluster(1800)), fleet.clone(), dry);

    assert!(matches!(scaler.evaluate().await.unwrap(), Decision::ScaleDown(_)));
    assert_eq!(scaler.run_once().await, IterationOutcome::Acted);
    assert!(fleet.operations().await.is_empty());
}

#[tokio::test]
async fn unreadable_cluster_aborts_the_iteration() {
    let state = Arc::new(quiet_cluster(1800));
    state.set_failing(true);
    let fleet = Arc::new(InMemoryFleet::default());
    let scaler = autoscaler(state, fleet.clone(), policy(3));

    assert!(scaler.evaluate().await.is_err());
    assert!(matches!(scaler.run_once().await, IterationOutcome::Aborted { .. }));
    assert!(fleet.operations().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn idle_iteration_refreshes_stale_groups() {
    let fleet = Arc::new(
        InMemoryFleet::default()
            .with_group(ManagedGroup {
                name: "nm-auto-aa".to_string(),
                desired_capacity: 1,
                max_capacity: 1,
                launch_template: "workers".to_string(),
                members: vec![GroupMember {
                    instance_id: "i-0aa".to_string(),
                    launch_version: Some("3".to_string()),
                }],
            })
            .with_latest_version("workers", "4"),
    );
    let scaler = Arc::new(
        autoscaler(Arc::new(busy_cluster()), fleet.clone(), policy(1))
            .with_refresher(FleetRefresher::new(fleet.clone(), RefreshConfig::default())),
    );
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn({
        let scaler = scaler.clone();
        async move { scaler.run(rx).await }
    });

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(
        fleet.operations().await,
        vec![
            FleetOp::SetMaxCapacity {
                group: "nm-auto-aa".to_string(),
                max: 2
            },
            FleetOp::SetDesiredCapacity {
                group: "nm-auto-aa".to_string(),
                desired: 2
            },
        ]
    );

    tokio::time::sleep(Duration::from_secs(120)).await;
    let ops = fleet.operations().await;
    assert_eq!(
        ops.last(),
        Some(&FleetOp::SetDesiredCapacity {
            group: "nm-auto-aa".to_string(),
            desired: 1
        })
    );
    assert_eq!(ops.len(), 3);

    tx.send(true).unwrap();
    handle.await.unwrap();
}
