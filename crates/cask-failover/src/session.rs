use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;

/// The host's session object, as far as failover needs it.
///
/// Attribute values are plain JSON so whatever replicates sessions between
/// nodes can carry them without knowing their types.
pub trait SessionBoundary: Send + Sync {
    fn id(&self) -> &str;

    fn attribute(&self, key: &str) -> Option<Value>;

    fn set_attribute(&self, key: &str, value: Value);

    fn remove_attribute(&self, key: &str) -> Option<Value>;
}

/// In-process session, used by the CLI and tests.
#[derive(Debug, Default)]
pub struct MemorySession {
    id: String,
    attributes: RwLock<HashMap<String, Value>>,
}

impl MemorySession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: RwLock::new(HashMap::new()),
        }
    }

    /// A session on another node that received this one's replicated attributes.
    pub fn replicate(&self) -> Self {
        Self {
            id: self.id.clone(),
            attributes: RwLock::new(self.attributes.read().clone()),
        }
    }

    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.attributes.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl SessionBoundary for MemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn attribute(&self, key: &str) -> Option<Value> {
        self.attributes.read().get(key).cloned()
    }

    fn set_attribute(&self, key: &str, value: Value) {
        self.attributes.write().insert(key.to_string(), value);
    }

    fn remove_attribute(&self, key: &str) -> Option<Value> {
        self.attributes.write().remove(key)
    }
}
