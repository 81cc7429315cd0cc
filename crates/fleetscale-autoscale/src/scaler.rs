//! Autoscaler: the capture → decide → actuate control loop.
//!
//! One iteration runs at a time. After an iteration that acted, the loop
//! waits out the scale-up cooldown so the cluster can settle. After an
//! idle iteration it refreshes stale managed groups and waits the short
//! idle interval. An aborted iteration (state unreadable) waits the idle
//! interval without refreshing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use fleetscale_rollout::FleetRefresher;
use fleetscale_state::{ClusterSnapshot, ClusterStateProvider};

use crate::actuator::Actuator;
use crate::engine::DecisionEngine;
use crate::error::ScaleResult;
use crate::intent::Decision;

/// How an iteration ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// At least one intent was emitted.
    Acted,
    /// Nothing to do.
    Idle,
    /// Cluster state could not be read; nothing was decided.
    Aborted { reason: String },
}

pub struct Autoscaler {
    state: Arc<dyn ClusterStateProvider>,
    engine: DecisionEngine,
    actuator: Actuator,
    refresher: Option<FleetRefresher>,
}

impl Autoscaler {
    pub fn new(
        state: Arc<dyn ClusterStateProvider>,
        engine: DecisionEngine,
        actuator: Actuator,
    ) -> Self {
        Self {
            state,
            engine,
            actuator,
            refresher: None,
        }
    }

    /// Refresh stale managed groups after idle iterations.
    pub fn with_refresher(mut self, refresher: FleetRefresher) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Capture one snapshot and decide on it.
    pub async fn evaluate(&self) -> ScaleResult<Decision> {
        let snapshot = ClusterSnapshot::capture(self.state.as_ref()).await?;
        Ok(self.engine.decide(&snapshot))
    }

    /// Run a single iteration.
    pub async fn run_once(&self) -> IterationOutcome {
        if self.engine.policy().dry_run {
            warn!("dry run enabled, fleet will not be changed");
        }

        let decision = match self.evaluate().await {
            Ok(d) => d,
            Err(e) => {
                error!(error = %e, "iteration aborted");
                return IterationOutcome::Aborted {
                    reason: e.to_string(),
                };
            }
        };

        match &decision {
            Decision::NoChange => {
                info!("iteration completed, no scaling action taken");
                return IterationOutcome::Idle;
            }
            Decision::ScaleUp(intents) => info!(groups = intents.len(), "scaling up"),
            Decision::ScaleDown(intents) => info!(nodes = intents.len(), "scaling down"),
        }

        let report = self.actuator.apply(decision.intents()).await;
        info!(
            applied = report.applied,
            skipped = report.skipped,
            failed = report.failed.len(),
            "scaling actions finished"
        );
        IterationOutcome::Acted
    }

    /// Run a fleet refresh pass if a refresher is configured.
    pub async fn refresh_fleet(&self) {
        let Some(refresher) = &self.refresher else {
            return;
        };
        match refresher.refresh_all().await {
            Ok(report) => debug!(
                refreshed = report.refreshed.len(),
                failed = report.failed.len(),
                up_to_date = report.up_to_date,
                "fleet refresh pass finished"
            ),
            Err(e) => error!(error = %e, "fleet refresh pass failed"),
        }
    }

    /// Pause that follows an iteration with `outcome`.
    pub fn pause_after(&self, outcome: &IterationOutcome) -> Duration {
        let policy = self.engine.policy();
        match outcome {
            IterationOutcome::Acted => policy.scale_up_cooldown(),
            IterationOutcome::Idle | IterationOutcome::Aborted { .. } => policy.idle_interval(),
        }
    }

    /// Run the autoscaler loop until `shutdown` flips.
    ///
    /// Iterations and refresh passes are never interrupted; shutdown is
    /// honoured while waiting between them.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let policy = self.engine.policy();
        info!(
            datacenter = %policy.datacenter,
            dry_run = policy.dry_run,
            cooldown_secs = policy.scale_up_cooldown_secs,
            idle_secs = policy.idle_interval_secs,
            "autoscaler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = self.run_once().await;
            if outcome == IterationOutcome::Idle {
                self.refresh_fleet().await;
            }

            let pause = self.pause_after(&outcome);
            debug!(secs = pause.as_secs(), "waiting for next iteration");

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        info!("autoscaler shutting down");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::ScalingPolicy;
    use crate::naming::SequentialGroupNames;
    use fleetscale_fleet::{FleetOp, InMemoryFleet};
    use fleetscale_placement::{InstanceCatalog, InstanceType};
    use fleetscale_state::*;

    fn make_node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            datacenter: "dc1".to_string(),
            eligible: true,
            ready: true,
            total_resources: ResourceQuantity::new(5000, 5000),
            reserved_resources: ResourceQuantity::ZERO,
        }
    }

    fn busy_provider() -> StaticStateProvider {
        let alloc = |node: &str| Allocation {
            id: format!("{node}-web"),
            node_id: node.to_string(),
            job_id: "web".to_string(),
            resources: ResourceQuantity::new(4600, 4600),
            lifecycle: AllocationStatus::Running,
            desired: DesiredStatus::Run,
        };
        StaticStateProvider::new()
            .with_nodes(vec![make_node("n1"), make_node("n2")])
            .with_allocations(vec![alloc("n1"), alloc("n2")])
            .with_jobs(vec![JobMeta {
                id: "web".to_string(),
                priority: 50,
                queued: BTreeMap::new(),
            }])
    }

    fn blocked_provider() -> StaticStateProvider {
        let mut exhausted = BTreeMap::new();
        exhausted.insert("task".to_string(), ResourceQuantity::new(2000, 2048));
        let mut groups = BTreeMap::new();
        groups.insert(
            "group".to_string(),
            FailedTaskGroup {
                datacenters: vec!["dc1".to_string()],
                exhausted,
            },
        );
        busy_provider().with_evaluations(vec![Evaluation {
            id: "eval-1".to_string(),
            job_id: "web".to_string(),
            status: EvaluationStatus::Blocked,
            failed_task_groups: groups,
        }])
    }

    fn autoscaler(
        state: Arc<StaticStateProvider>,
        fleet: Arc<InMemoryFleet>,
        dry_run: bool,
    ) -> Autoscaler {
        let policy = ScalingPolicy {
            dry_run,
            ..Default::default()
        };
        let catalog =
            InstanceCatalog::new(vec![InstanceType::new("small", 0.10, 2, 4096)]).unwrap();
        let engine = DecisionEngine::new(policy, catalog)
            .with_namer(SequentialGroupNames::new("nm-auto-"));
        Autoscaler::new(state, engine, Actuator::new(fleet, dry_run))
    }

    #[tokio::test]
    async fn busy_cluster_is_idle() {
        let fleet = Arc::new(InMemoryFleet::default());
        let scaler = autoscaler(Arc::new(busy_provider()), fleet.clone(), false);
        assert_eq!(scaler.run_once().await, IterationOutcome::Idle);
        assert!(fleet.operations().await.is_empty());
    }

    #[tokio::test]
    async fn blocked_work_creates_a_group() {
        let fleet = Arc::new(InMemoryFleet::default());
        let scaler = autoscaler(Arc::new(blocked_provider()), fleet.clone(), false);

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
    async fn dry_run_acts_without_mutations() {
        let fleet = Arc::new(InMemoryFleet::default());
        let scaler = autoscaler(Arc::new(blocked_provider()), fleet.clone(), true);

        assert_eq!(scaler.run_once().await, IterationOutcome::Acted);
        assert!(fleet.operations().await.is_empty());
    }

    #[tokio::test]
    async fn unreadable_state_aborts_without_actions() {
        let state = Arc::new(blocked_provider());
        state.set_failing(true);
        let fleet = Arc::new(InMemoryFleet::default());
        let scaler = autoscaler(state, fleet.clone(), false);

        assert!(matches!(scaler.run_once().await, IterationOutcome::Aborted { .. }));
        assert!(fleet.operations().await.is_empty());
    }

    #[tokio::test]
    async fn pauses_follow_outcome() {
        let fleet = Arc::new(InMemoryFleet::default());
        let scaler = autoscaler(Arc::new(busy_provider()), fleet, false);
        assert_eq!(scaler.pause_after(&IterationOutcome::Acted), Duration::from_secs(300));
        assert_eq!(scaler.pause_after(&IterationOutcome::Idle), Duration::from_secs(60));
        assert_eq!(
            scaler.pause_after(&IterationOutcome::Aborted {
                reason: "down".to_string()
            }),
            Duration::from_secs(60)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_loop_runs_every_idle_interval() {
        let state = Arc::new(busy_provider());
        let scaler = Arc::new(autoscaler(state.clone(), Arc::new(InMemoryFleet::default()), false));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn({
            let scaler = scaler.clone();
            async move { scaler.run(rx).await }
        });

        // Iterations at t=0, 60 and 120; each capture makes four reads.
        tokio::time::sleep(Duration::from_secs(130)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(state.call_count(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn acting_loop_waits_for_cooldown() {
        let state = Arc::new(blocked_provider());
        let fleet = Arc::new(InMemoryFleet::default());
        let scaler = Arc::new(autoscaler(state.clone(), fleet.clone(), false));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn({
            let scaler = scaler.clone();
            async move { scaler.run(rx).await }
        });

        tokio::time::sleep(Duration::from_secs(250)).await;
        assert_eq!(fleet.operations().await.len(), 1);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(fleet.operations().await.len(), 2);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
