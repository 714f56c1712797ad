use std::any::Any;
use std::sync::Arc;

use serde_json::Value;

use crate::container::{CallEnv, Container};
use crate::context::Context;
use crate::descriptor::{ComponentDescriptor, ComponentId};
use crate::error::{ContainerError, InvocationError, StateError};
use crate::proxy::ClientProxy;
use crate::scope::{ActiveScopes, BoundaryId, Scope};
use crate::stream::{ObjectInput, ObjectOutput};

/// Type-erased access to the concrete value behind a trait object.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A live component instance managed by the container.
pub trait Managed: AsAny + Send + Sync {
    /// The target method. Reached directly or as the terminal link of an interceptor chain.
    fn call(&self, method: &str, args: &[Value], env: &CallEnv<'_>) -> Result<Value, InvocationError>;

    /// Invoked once when the owning context is torn down. Failures are logged, never retried.
    fn pre_destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Write this instance's state for failover or passivation.
    fn passivate(&self, out: &mut dyn ObjectOutput) -> Result<(), StateError> {
        let _ = out;
        Err(StateError::Unsupported)
    }
}

pub type Instance = Arc<dyn Managed>;

/// Borrow the concrete type behind an instance.
pub fn downcast<T: Managed>(instance: &Instance) -> Option<&T> {
    <dyn Managed as AsAny>::as_any(instance.as_ref()).downcast_ref::<T>()
}

/// Construction recipe for one component.
pub trait ComponentFactory: Send + Sync {
    /// Build a fresh, dependency-injected instance.
    fn create(&self, ctx: &mut CreationalContext<'_>) -> Result<Instance, ContainerError>;

    /// Rebuild an instance from state previously written by [`Managed::passivate`].
    fn activate(
        &self,
        input: &mut dyn ObjectInput,
        ctx: &mut CreationalContext<'_>,
    ) -> Result<Instance, ContainerError> {
        let _ = input;
        Err(ContainerError::NotPassivationCapable(ctx.component().clone()))
    }
}

pub struct FnFactory<C> {
    create: C,
}

/// Wrap a closure as a factory for components that do not survive passivation.
pub fn factory_fn<C>(create: C) -> FnFactory<C>
where
    C: Fn(&mut CreationalContext<'_>) -> Result<Instance, ContainerError> + Send + Sync,
{
    FnFactory { create }
}

impl<C> ComponentFactory for FnFactory<C>
where
    C: Fn(&mut CreationalContext<'_>) -> Result<Instance, ContainerError> + Send + Sync,
{
    fn create(&self, ctx: &mut CreationalContext<'_>) -> Result<Instance, ContainerError> {
        (self.create)(ctx)
    }
}

pub struct PassivatingFactory<C, A> {
    create: C,
    activate: A,
}

/// Wrap a pair of closures as a factory whose instances can be restored after passivation.
pub fn passivating_factory<C, A>(create: C, activate: A) -> PassivatingFactory<C, A>
where
    C: Fn(&mut CreationalContext<'_>) -> Result<Instance, ContainerError> + Send + Sync,
    A: Fn(&mut dyn ObjectInput, &mut CreationalContext<'_>) -> Result<Instance, ContainerError>
        + Send
        + Sync,
{
    PassivatingFactory { create, activate }
}

impl<C, A> ComponentFactory for PassivatingFactory<C, A>
where
    C: Fn(&mut CreationalContext<'_>) -> Result<Instance, ContainerError> + Send + Sync,
    A: Fn(&mut dyn ObjectInput, &mut CreationalContext<'_>) -> Result<Instance, ContainerError>
        + Send
        + Sync,
{
    fn create(&self, ctx: &mut CreationalContext<'_>) -> Result<Instance, ContainerError> {
        (self.create)(ctx)
    }

    fn activate(
        &self,
        input: &mut dyn ObjectInput,
        ctx: &mut CreationalContext<'_>,
    ) -> Result<Instance, ContainerError> {
        (self.activate)(input, ctx)
    }
}

/// Stored state for components being restored with [`Container::restore`].
pub trait StateSource {
    /// Rebuild `descriptor` from its stored state, typically through
    /// [`ComponentFactory::activate`]. `None` when nothing was stored for it.
    fn activate(
        &self,
        descriptor: &ComponentDescriptor,
        ctx: &mut CreationalContext<'_>,
    ) -> Option<Result<Instance, ContainerError>>;
}

/// A restore in progress: the context being filled and where its state comes from.
#[derive(Clone, Copy)]
pub(crate) struct Restoring<'a> {
    pub(crate) context: &'a Context,
    pub(crate) source: &'a dyn StateSource,
}

impl Restoring<'_> {
    pub(crate) fn targets(&self, scope: &Scope, boundary: &BoundaryId) -> bool {
        self.context.scope() == scope && self.context.boundary() == boundary
    }
}

/// Handed to a factory while one component is being constructed.
///
/// Tracks the construction path so that a dependency already under
/// construction is reported as a cycle instead of deadlocking on its slot.
pub struct CreationalContext<'a> {
    container: &'a Container,
    scopes: &'a ActiveScopes,
    component: ComponentId,
    /// Components under construction, outermost first, ending with `component`.
    path: Vec<ComponentId>,
    restoring: Option<Restoring<'a>>,
}

impl<'a> CreationalContext<'a> {
    pub(crate) fn new(
        container: &'a Container,
        scopes: &'a ActiveScopes,
        parent_path: &[ComponentId],
        component: ComponentId,
        restoring: Option<Restoring<'a>>,
    ) -> Self {
        let mut path = parent_path.to_vec();
        path.push(component.clone());
        Self {
            container,
            scopes,
            component,
            path,
            restoring,
        }
    }

    /// The component being constructed.
    pub fn component(&self) -> &ComponentId {
        &self.component
    }

    pub fn container(&self) -> &'a Container {
        self.container
    }

    pub fn scopes(&self) -> &'a ActiveScopes {
        self.scopes
    }

    /// Resolve a dependency now, constructing it if needed.
    pub fn resolve(&mut self, id: impl Into<ComponentId>) -> Result<Instance, ContainerError> {
        let id = id.into();
        self.container
            .resolve_on_path(self.scopes, &id, &self.path, self.restoring)
    }

    /// A late-binding handle to a normal-scoped dependency. Nothing is
    /// constructed here, so cycles through proxies are legal.
    pub fn proxy(&self, id: impl Into<ComponentId>) -> Result<ClientProxy, ContainerError> {
        self.container.proxy(id)
    }
}
