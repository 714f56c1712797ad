//! Core of the cask dependency-injection container.
//!
//! Provides [`Container`], which resolves scoped component instances through
//! the [`ContextManager`], and dispatches method calls through interceptor
//! chains assembled by the [`ChainBuilder`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cask_core::{
//!     ActiveScopes, CallEnv, ComponentDescriptor, Container, Instance, InvocationError, Managed,
//!     Scope, factory_fn,
//! };
//! use serde_json::{Value, json};
//!
//! struct Greeter;
//!
//! impl Managed for Greeter {
//!     fn call(&self, method: &str, _args: &[Value], _env: &CallEnv<'_>) -> Result<Value, InvocationError> {
//!         match method {
//!             "greet" => Ok(json!("hello")),
//!             _ => Err(InvocationError::application(format!("no method {method}"))),
//!         }
//!     }
//! }
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let container = Container::builder()
//!     .component(
//!         ComponentDescriptor::builder("greeter", Scope::Request, factory_fn(|_| Ok(Arc::new(Greeter) as Instance)))
//!             .build(),
//!     )
//!     .build()?;
//!
//! container.contexts().init_context(Scope::Request, "req-1")?;
//! let scopes = ActiveScopes::new().with_request("req-1");
//! let reply = container.invoke(&scopes, &"greeter".into(), "greet", vec![])?;
//! assert_eq!(reply, json!("hello"));
//! # Ok(())
//! # }
//! ```

pub mod component;
pub mod container;
pub mod context;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod interceptor;
pub mod manager;
pub mod proxy;
pub mod scope;
pub mod stream;
mod wait;

pub use component::{
    ComponentFactory, CreationalContext, Instance, Managed, StateSource, downcast, factory_fn,
    passivating_factory,
};
pub use container::{CallEnv, Container, ContainerBuilder};
pub use context::Context;
pub use descriptor::{BindingLevel, ComponentDescriptor, ComponentId, ComponentRegistry, InterceptorId};
pub use dispatch::InvocationContext;
pub use error::{ContainerError, InvocationError, StateError};
pub use interceptor::{ChainBuilder, ChainShape, Interceptor, InterceptorRegistry, resolve_bindings};
pub use manager::ContextManager;
pub use proxy::ClientProxy;
pub use scope::{ActiveScopes, BoundaryId, Scope};
pub use stream::{ObjectInput, ObjectOutput, ResourceObject, StreamOrigin, resource_downcast};
