use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one running node, stable for the lifetime of the process
/// that generated it. Bags carry it so a receiving node can tell a local
/// restore from a cross-node one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Random UUID plus the current time in epoch millis.
    pub fn generate() -> Self {
        Self(format!("{}_{}", Uuid::new_v4(), Utc::now().timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Epoch millis at which the node started, if the id has the generated shape.
    pub fn started_at_millis(&self) -> Option<i64> {
        self.0.rsplit_once('_')?.1.parse().ok()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
