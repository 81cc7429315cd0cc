//! Provisioner: picks machine types for unplaceable demand.
//!
//! Greedy first-fit over a price-sorted catalog:
//! 1. Sort the catalog cheapest first (ties: more memory first).
//! 2. Place each job into the first already-selected instance with enough
//!    remaining CPU and memory.
//! 3. Otherwise select the first catalog type that can host the job alone.
//! 4. A job no catalog type can host is reported as unplaceable and left
//!    out; the rest of the batch still gets provisioned.
//!
//! Not globally cost-optimal, but fully deterministic for a given catalog
//! and job order.

use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::{InstanceCatalog, InstanceType};

/// One unit of demand to host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProvisionJob {
    /// CPU in vCPUs (fractional).
    pub cpu: f64,
    pub memory_mb: u64,
}

/// A machine the plan asks for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionedInstance {
    pub instance_type: String,
    pub hourly_price: f64,
}

/// Result of a provisioning pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProvisionPlan {
    /// Selected instances, in selection order.
    pub allocations: Vec<ProvisionedInstance>,
    /// Sum of the selected instances' hourly prices.
    pub total_cost: f64,
    /// Jobs that no catalog type can host.
    pub unplaceable: Vec<ProvisionJob>,
}

impl ProvisionPlan {
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

/// An instance selected during the pass, with its unused capacity.
struct ActiveInstance<'a> {
    ty: &'a InstanceType,
    remaining_cpu: f64,
    remaining_memory_mb: u64,
}

impl ActiveInstance<'_> {
    fn fits(&self, job: &ProvisionJob) -> bool {
        job.cpu <= self.remaining_cpu && job.memory_mb <= self.remaining_memory_mb
    }
}

fn type_fits(ty: &InstanceType, job: &ProvisionJob) -> bool {
    job.cpu <= f64::from(ty.vcpus) && job.memory_mb <= ty.memory_mb
}

/// Compute the cheapest instance combination that hosts `jobs`.
pub fn cheapest_combination(catalog: &InstanceCatalog, jobs: &[ProvisionJob]) -> ProvisionPlan {
    let sorted = catalog.by_price();
    let mut active: Vec<ActiveInstance<'_>> = Vec::new();
    let mut plan = ProvisionPlan::default();

    for job in jobs {
        if let Some(instance) = active.iter_mut().find(|i| i.fits(job)) {
            instance.remaining_cpu -= job.cpu;
            instance.remaining_memory_mb -= job.memory_mb;
            debug!(
                instance_type = %instance.ty.name,
                cpu = job.cpu,
                memory_mb = job.memory_mb,
                "job packed onto selected instance"
            );
            continue;
        }

        match sorted.iter().find(|ty| type_fits(ty, job)) {
            Some(ty) => {
                active.push(ActiveInstance {
                    ty,
                    remaining_cpu: f64::from(ty.vcpus) - job.cpu,
                    remaining_memory_mb: ty.memory_mb - job.memory_mb,
                });
                plan.total_cost += ty.hourly_price;
                debug!(
                    instance_type = %ty.name,
                    price = ty.hourly_price,
                    "selected new instance"
                );
            }
            None => {
                warn!(
                    cpu = job.cpu,
                    memory_mb = job.memory_mb,
                    "cannot place job on any instance type"
                );
                plan.unplaceable.push(*job);
            }
        }
    }

    plan.allocations = active
        .into_iter()
        .map(|i| ProvisionedInstance {
            instance_type: i.ty.name.clone(),
            hourly_price: i.ty.hourly_price,
        })
        .collect();
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(cpu: f64, memory_mb: u64) -> ProvisionJob {
        ProvisionJob { cpu, memory_mb }
    }

    fn catalog(types: Vec<InstanceType>) -> InstanceCatalog {
        InstanceCatalog::new(types).unwrap()
    }

    #[test]
    fn packs_two_units_onto_one_instance() {
        let cat = catalog(vec![InstanceType::new("small", 0.10, 2, 4096)]);
        let plan = cheapest_combination(&cat, &[job(1.0, 2048), job(1.0, 2048)]);

        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].instance_type, "small");
        assert!((plan.total_cost - 0.10).abs() < 1e-12);
        assert!(plan.unplaceable.is_empty());
    }

    #[test]
    fn opens_second_instance_when_first_is_full() {
        let cat = catalog(vec![InstanceType::new("small", 0.10, 2, 4096)]);
        let plan = cheapest_combination(&cat, &[job(1.5, 1024), job(1.5, 1024)]);

        assert_eq!(plan.allocations.len(), 2);
        assert!((plan.total_cost - 0.20).abs() < 1e-12);
    }

    #[test]
    fn picks_cheapest_type_that_fits() {
        let cat = catalog(vec![
            InstanceType::new("large", 0.40, 8, 32768),
            InstanceType::new("tiny", 0.01, 1, 512),
            InstanceType::new("medium", 0.10, 2, 8192),
        ]);
        let plan = cheapest_combination(&cat, &[job(2.0, 4096)]);

        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].instance_type, "medium");
    }

    #[test]
    fn first_fit_not_best_fit() {
        // Job 3 fits into both selected instances; first-fit uses the first.
        let cat = catalog(vec![
            InstanceType::new("a", 0.10, 4, 4096),
            InstanceType::new("b", 0.20, 8, 16384),
        ]);
        let plan = cheapest_combination(&cat, &[job(3.0, 1024), job(6.0, 1024), job(1.0, 1024)]);

        let types: Vec<&str> = plan.allocations.iter().map(|a| a.instance_type.as_str()).collect();
        assert_eq!(types, vec!["a", "b"]);
        assert!((plan.total_cost - 0.30).abs() < 1e-12);
    }

    #[test]
    fn unplaceable_job_does_not_fail_the_batch() {
        let cat = catalog(vec![InstanceType::new("small", 0.10, 2, 4096)]);
        let plan = cheapest_combination(&cat, &[job(16.0, 1024), job(1.0, 1024)]);

        assert_eq!(plan.unplaceable, vec![job(16.0, 1024)]);
        assert_eq!(plan.allocations.len(), 1);
    }

    #[test]
    fn capacity_covers_placed_demand_and_cost_is_exact() {
        let cat = catalog(vec![
            InstanceType::new("a", 0.05, 2, 2048),
            InstanceType::new("b", 0.12, 4, 8192),
        ]);
        let jobs = [job(0.5, 1500), job(1.0, 3000), job(0.25, 500), job(3.0, 1000)];
        let plan = cheapest_combination(&cat, &jobs);

        let by_name = |n: &str| cat.types().iter().find(|t| t.name == n).unwrap();
        let cpu_cap: f64 = plan
            .allocations
            .iter()
            .map(|a| f64::from(by_name(&a.instance_type).vcpus))
            .sum();
        let mem_cap: u64 = plan
            .allocations
            .iter()
            .map(|a| by_name(&a.instance_type).memory_mb)
            .sum();
        let cost: f64 = plan.allocations.iter().map(|a| a.hourly_price).sum();

        assert!(cpu_cap >= jobs.iter().map(|j| j.cpu).sum::<f64>());
        assert!(mem_cap >= jobs.iter().map(|j| j.memory_mb).sum::<u64>());
        assert_eq!(plan.total_cost, cost);
    }

    #[test]
    fn identical_inputs_give_identical_plans() {
        let cat = catalog(vec![
            InstanceType::new("x", 0.10, 2, 4096),
            InstanceType::new("y", 0.10, 2, 8192),
        ]);
        let jobs = [job(1.0, 3000), job(1.0, 3000), job(0.5, 500)];

        let first = cheapest_combination(&cat, &jobs);
        let second = cheapest_combination(&cat, &jobs);
        assert_eq!(first, second);
        // Price tie goes to the larger memory type.
        assert_eq!(first.allocations[0].instance_type, "y");
    }

    #[test]
    fn no_jobs_no_instances() {
        let cat = catalog(vec![InstanceType::new("small", 0.10, 2, 4096)]);
        let plan = cheapest_combination(&cat, &[]);
        assert!(plan.is_empty());
        assert_eq!(plan.total_cost, 0.0);
    }
}
