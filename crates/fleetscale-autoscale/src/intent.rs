//! Scaling intents: the only output of the decision engine.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ScalingIntent {
    /// Create a managed group running one instance of `instance_type`.
    ProvisionGroup { name: String, instance_type: String },
    /// Remove the node, deleting its group if the autoscaler owns it.
    RemoveNode { node_id: String },
}

/// Result of one decision pass. At most one kind of intent per pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Decision {
    ScaleUp(Vec<ScalingIntent>),
    ScaleDown(Vec<ScalingIntent>),
    NoChange,
}

impl Decision {
    pub fn intents(&self) -> &[ScalingIntent] {
        match self {
            Decision::ScaleUp(intents) | Decision::ScaleDown(intents) => intents.as_slice(),
            Decision::NoChange => &[],
        }
    }

    pub fn is_no_change(&self) -> bool {
        self.intents().is_empty()
    }
}
