use thiserror::Error;

use crate::descriptor::{ComponentId, InterceptorId};
use crate::scope::{BoundaryId, Scope};

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("no active context for scope {scope}")]
    NoActiveContext { scope: Scope },

    #[error("context for scope {scope} is already active on boundary {boundary}")]
    DuplicateContext { scope: Scope, boundary: BoundaryId },

    #[error("cyclic dependency: {}", join_path(.path))]
    CyclicDependency { path: Vec<ComponentId> },

    #[error("unknown component: {0}")]
    UnknownComponent(ComponentId),

    #[error("component registered twice: {0}")]
    DuplicateComponent(ComponentId),

    #[error("component {component} binds unregistered interceptor {interceptor}")]
    UnknownInterceptor {
        component: ComponentId,
        interceptor: InterceptorId,
    },

    #[error("scope {0} is not backed by a context")]
    NotContextual(Scope),

    #[error("component {0} is dependent-scoped and cannot be proxied")]
    Unproxyable(ComponentId),

    #[error("an instance of {component} already lives in the {scope} context")]
    DuplicateInstance { component: ComponentId, scope: Scope },

    #[error("component {component} is {actual}-scoped, expected {expected}")]
    ScopeMismatch {
        component: ComponentId,
        expected: Scope,
        actual: Scope,
    },

    #[error("component {0} is not passivation capable")]
    NotPassivationCapable(ComponentId),

    #[error("construction of {component} failed: {reason}")]
    Construction { component: ComponentId, reason: String },

    #[error("state error: {0}")]
    State(#[from] StateError),
}

/// Failures raised while a component writes or reads its own state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("missing field: {0}")]
    MissingField(String),

    #[error("field {field} is not a {expected}")]
    WrongKind { field: String, expected: &'static str },

    #[error("stream already closed")]
    Closed,

    #[error("component does not support passivation")]
    Unsupported,

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures surfaced from a component method invocation.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// Raised by a target method or an interceptor. Interceptors may catch and convert it.
    #[error("{0}")]
    Application(String),

    #[error("component {component} has no method {method}")]
    UnknownMethod { component: ComponentId, method: String },

    #[error("invalid arguments for {method}: {reason}")]
    InvalidArguments { method: String, reason: String },

    #[error(transparent)]
    Container(#[from] ContainerError),
}

impl InvocationError {
    pub fn application(message: impl Into<String>) -> Self {
        InvocationError::Application(message.into())
    }
}

fn join_path(path: &[ComponentId]) -> String {
    path.iter()
        .map(ComponentId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
