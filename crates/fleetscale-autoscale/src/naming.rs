//! Names for newly provisioned managed groups.

use std::sync::atomic::{AtomicU32, Ordering};

use uuid::Uuid;

/// Default name marker for groups the autoscaler creates.
pub const DEFAULT_GROUP_PREFIX: &str = "nm-auto-";

/// Produces a fresh group name on every call.
pub trait GroupNamer: Send + Sync {
    fn next_name(&self) -> String;
}

/// `<prefix>` followed by 8 random lowercase hex characters.
#[derive(Debug, Clone)]
pub struct RandomGroupNames {
    prefix: String,
}

impl RandomGroupNames {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }
}

impl Default for RandomGroupNames {
    fn default() -> Self {
        Self::new(DEFAULT_GROUP_PREFIX)
    }
}

impl GroupNamer for RandomGroupNames {
    fn next_name(&self) -> String {
        let id = Uuid::new_v4().simple().to_string();
        format!("{}{}", self.prefix, &id[..8])
    }
}

/// `<prefix>00000000`, `<prefix>00000001`, … Deterministic.
#[derive(Debug)]
pub struct SequentialGroupNames {
    prefix: String,
    next: AtomicU32,
}

impl SequentialGroupNames {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            next: AtomicU32::new(0),
        }
    }
}

impl GroupNamer for SequentialGroupNames {
    fn next_name(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}{n:08x}", self.prefix)
    }
}
