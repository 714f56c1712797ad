use serde_json::Value;

use crate::component::Instance;
use crate::container::CallEnv;
use crate::descriptor::ComponentId;
use crate::error::{ContainerError, InvocationError};

/// Late-binding handle to a normal-scoped component.
///
/// Holds only the component id. Every access resolves against whatever
/// context is active for the caller at that moment, so a proxy injected into
/// an application-scoped component reaches the right session instance on
/// every request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientProxy {
    component: ComponentId,
}

impl ClientProxy {
    /// Rebuild a proxy from a serialized reference.
    pub fn from_reference(component: ComponentId) -> Self {
        Self { component }
    }

    pub fn component(&self) -> &ComponentId {
        &self.component
    }

    /// The live instance behind this proxy for the caller's active scopes.
    pub fn instance(&self, env: &CallEnv<'_>) -> Result<Instance, ContainerError> {
        env.container().resolve(env.scopes(), &self.component)
    }

    pub fn invoke(
        &self,
        env: &CallEnv<'_>,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, InvocationError> {
        env.container()
            .invoke(env.scopes(), &self.component, method, args)
    }
}
