//! Static instance-type catalog.
//!
//! Loaded once at startup from a JSON array and read-only afterwards.
//! Accepts both the canonical field names and the ones used by common
//! EC2 price dumps (`type`, `num_cpus`).

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PlacementError, PlacementResult};

/// A machine type that can be provisioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceType {
    #[serde(alias = "type")]
    pub name: String,
    pub hourly_price: f64,
    #[serde(alias = "num_cpus", alias = "cpu_capacity")]
    pub vcpus: u32,
    #[serde(alias = "memory_capacity")]
    pub memory_mb: u64,
}

impl InstanceType {
    pub fn new(name: &str, hourly_price: f64, vcpus: u32, memory_mb: u64) -> Self {
        Self {
            name: name.to_string(),
            hourly_price,
            vcpus,
            memory_mb,
        }
    }
}

/// The set of machine types available to the provisioner.
#[derive(Debug, Clone, Default)]
pub struct InstanceCatalog {
    types: Vec<InstanceType>,
}

impl InstanceCatalog {
    /// Build a catalog, rejecting entries that could never be priced or
    /// host anything.
    pub fn new(types: Vec<InstanceType>) -> PlacementResult<Self> {
        if types.is_empty() {
            return Err(PlacementError::Catalog("catalog is empty".to_string()));
        }
        for t in &types {
            if !t.hourly_price.is_finite() || t.hourly_price < 0.0 {
                return Err(PlacementError::Catalog(format!(
                    "{} has invalid hourly price {}",
                    t.name, t.hourly_price
                )));
            }
        }
        Ok(Self { types })
    }

    pub fn from_json(json: &str) -> PlacementResult<Self> {
        let types: Vec<InstanceType> = serde_json::from_str(json)?;
        Self::new(types)
    }

    pub fn from_file(path: &Path) -> PlacementResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&content)?;
        info!(?path, types = catalog.types.len(), "instance catalog loaded");
        Ok(catalog)
    }

    pub fn types(&self) -> &[InstanceType] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Catalog ordered cheapest first; equal prices put the larger memory
    /// first. The sort is stable, so full ties keep catalog order.
    pub fn by_price(&self) -> Vec<&InstanceType> {
        let mut sorted: Vec<&InstanceType> = self.types.iter().collect();
        sorted.sort_by(|a, b| {
            a.hourly_price
                .total_cmp(&b.hourly_price)
                .then_with(|| b.memory_mb.cmp(&a.memory_mb))
        });
        sorted
    }
}
