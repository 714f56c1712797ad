//! Pluggable (de)serialization of resource objects.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cask_core::{ComponentDescriptor, ResourceObject, StreamOrigin};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FailoverError;

/// Why a session is being serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationMode {
    /// Snapshot of a live session so another node can take over.
    Failover,
    /// The session is leaving memory on this node.
    Passivation,
}

/// One resource crossing a stream, in either direction.
#[derive(Debug)]
pub enum ResourceCall<'a> {
    /// A live resource is being written.
    Write(&'a Arc<dyn ResourceObject>),
    /// A previously written replacement is being read back.
    Read { kind: &'a str, payload: &'a Value },
}

/// Result of consulting the handler. `NotHandled` is distinct from every
/// value a handler can produce.
#[derive(Debug)]
pub enum ResourceOutcome {
    NotHandled,
    /// Serializable replacement for a written resource.
    Written(Value),
    /// Live resource rebuilt from its replacement.
    Read(Arc<dyn ResourceObject>),
}

impl ResourceOutcome {
    pub fn is_handled(&self) -> bool {
        !matches!(self, ResourceOutcome::NotHandled)
    }
}

/// Origins of the streams taking part in one delegation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamPair {
    pub input: Option<StreamOrigin>,
    pub output: Option<StreamOrigin>,
}

impl StreamPair {
    pub fn output(origin: StreamOrigin) -> Self {
        Self {
            input: None,
            output: Some(origin),
        }
    }

    pub fn input(origin: StreamOrigin) -> Self {
        Self {
            input: Some(origin),
            output: None,
        }
    }

    /// At least one stream is present and every present stream is container-provided.
    pub fn is_container_provided(&self) -> bool {
        let origins = [self.input, self.output];
        origins.iter().any(Option::is_some)
            && origins
                .iter()
                .flatten()
                .all(|origin| *origin == StreamOrigin::Container)
    }
}

pub trait ResourceSerializationHandler: Send + Sync {
    /// Take over (de)serialization of `call` for `component`, or decline with `NotHandled`.
    fn handle_resource(
        &self,
        component: &ComponentDescriptor,
        call: ResourceCall<'_>,
        mode: SerializationMode,
    ) -> ResourceOutcome;
}

type HandlerCtor =
    Arc<dyn Fn() -> Result<Arc<dyn ResourceSerializationHandler>, String> + Send + Sync>;

/// Handler constructors by name; the name is what configuration refers to.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    ctors: HashMap<String, HandlerCtor>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.ctors.keys().collect();
        names.sort();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &names)
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, ctor: F)
    where
        F: Fn() -> Result<Arc<dyn ResourceSerializationHandler>, String> + Send + Sync + 'static,
    {
        self.ctors.insert(name.into(), Arc::new(ctor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ctors.contains_key(name)
    }

    pub fn instantiate(
        &self,
        name: &str,
    ) -> Result<Arc<dyn ResourceSerializationHandler>, FailoverError> {
        let ctor = self
            .ctors
            .get(name)
            .ok_or_else(|| FailoverError::HandlerInstantiation {
                handler: name.to_string(),
                reason: "no handler registered under this name".into(),
            })?;
        ctor().map_err(|reason| FailoverError::HandlerInstantiation {
            handler: name.to_string(),
            reason,
        })
    }
}
