use std::sync::Arc;

use serde_json::Value;

use crate::component::{CreationalContext, Instance, Restoring, StateSource};
use crate::descriptor::{ComponentDescriptor, ComponentId, ComponentRegistry};
use crate::dispatch::dispatch;
use crate::error::{ContainerError, InvocationError};
use crate::context::Context;
use crate::interceptor::{ChainBuilder, Interceptor, InterceptorRegistry};
use crate::manager::ContextManager;
use crate::proxy::ClientProxy;
use crate::scope::{ActiveScopes, BoundaryId, Scope};
use crate::wait::WaitGraph;

/// Container handle plus the caller's active scopes, threaded into every
/// target method so injected proxies can late-bind.
#[derive(Clone, Copy)]
pub struct CallEnv<'a> {
    container: &'a Container,
    scopes: &'a ActiveScopes,
}

impl<'a> CallEnv<'a> {
    pub fn new(container: &'a Container, scopes: &'a ActiveScopes) -> Self {
        Self { container, scopes }
    }

    pub fn container(&self) -> &'a Container {
        self.container
    }

    pub fn scopes(&self) -> &'a ActiveScopes {
        self.scopes
    }
}

/// The dependency-injection container.
///
/// One `Container` lives for the whole process: built once at startup
/// (which also opens the application context) and torn down once with
/// [`Container::shutdown`]. Every subsystem receives it explicitly,
/// typically as `Arc<Container>`.
pub struct Container {
    registry: ComponentRegistry,
    interceptors: InterceptorRegistry,
    chains: ChainBuilder,
    contexts: ContextManager,
    waits: WaitGraph,
}

impl Container {
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::default()
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn interceptors(&self) -> &InterceptorRegistry {
        &self.interceptors
    }

    pub fn chains(&self) -> &ChainBuilder {
        &self.chains
    }

    pub fn contexts(&self) -> &ContextManager {
        &self.contexts
    }

    pub fn descriptor(&self, id: &ComponentId) -> Result<Arc<ComponentDescriptor>, ContainerError> {
        self.registry.get(id)
    }

    /// The correctly scoped instance of `id`, created on first use within its context.
    pub fn resolve(&self, scopes: &ActiveScopes, id: &ComponentId) -> Result<Instance, ContainerError> {
        self.resolve_on_path(scopes, id, &[], None)
    }

    pub(crate) fn resolve_on_path(
        &self,
        scopes: &ActiveScopes,
        id: &ComponentId,
        path: &[ComponentId],
        restoring: Option<Restoring<'_>>,
    ) -> Result<Instance, ContainerError> {
        if path.contains(id) {
            let mut cycle = path.to_vec();
            cycle.push(id.clone());
            return Err(ContainerError::CyclicDependency { path: cycle });
        }

        let descriptor = self.registry.get(id)?;
        let scope = descriptor.scope();
        if !scope.is_normal() {
            return self.create(scopes, &descriptor, path, restoring);
        }

        let boundary = active_boundary(scopes, scope)?;
        if let Some(target) = restoring.filter(|r| r.targets(scope, &boundary)) {
            return target.context.get_or_create_waiting(id, &self.waits, || {
                let mut ctx = CreationalContext::new(self, scopes, path, id.clone(), restoring);
                match target.source.activate(&descriptor, &mut ctx) {
                    Some(restored) => restored,
                    None => descriptor.factory().create(&mut ctx),
                }
            });
        }

        let context = self.contexts.get_context(scope, &boundary)?;
        context.get_or_create_waiting(id, &self.waits, || {
            self.create(scopes, &descriptor, path, restoring)
        })
    }

    fn create(
        &self,
        scopes: &ActiveScopes,
        descriptor: &ComponentDescriptor,
        path: &[ComponentId],
        restoring: Option<Restoring<'_>>,
    ) -> Result<Instance, ContainerError> {
        let mut ctx = CreationalContext::new(self, scopes, path, descriptor.id().clone(), restoring);
        descriptor.factory().create(&mut ctx)
    }

    /// Rebuild `components` into `context` from the state held by `source`.
    ///
    /// `context` is not installed yet. Dependencies at its boundary resolve
    /// into it as well: from `source` when it holds their state, created
    /// afresh otherwise. Other scopes resolve through the context manager.
    pub fn restore(
        &self,
        scopes: &ActiveScopes,
        context: &Context,
        source: &dyn StateSource,
        components: &[ComponentId],
    ) -> Result<(), ContainerError> {
        let scopes = scopes
            .clone()
            .with(context.scope().clone(), context.boundary().clone());
        let restoring = Restoring { context, source };

        for id in components {
            let descriptor = self.registry.get(id)?;
            if descriptor.scope() != context.scope() {
                return Err(ContainerError::ScopeMismatch {
                    component: id.clone(),
                    expected: context.scope().clone(),
                    actual: descriptor.scope().clone(),
                });
            }
            self.resolve_on_path(&scopes, id, &[], Some(restoring))?;
        }
        Ok(())
    }

    /// A late-binding handle to a normal-scoped component.
    pub fn proxy(&self, id: impl Into<ComponentId>) -> Result<ClientProxy, ContainerError> {
        let id = id.into();
        let descriptor = self.registry.get(&id)?;
        if !descriptor.scope().is_normal() {
            return Err(ContainerError::Unproxyable(id));
        }
        Ok(ClientProxy::from_reference(id))
    }

    /// Resolve `id` and invoke `method` through its interceptor chain.
    pub fn invoke(
        &self,
        scopes: &ActiveScopes,
        id: &ComponentId,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, InvocationError> {
        let descriptor = self.registry.get(id)?;
        let instance = self.resolve(scopes, id)?;
        self.invoke_instance(scopes, &descriptor, &instance, method, args)
    }

    /// Invoke `method` on an instance already in hand, e.g. a dependent one.
    pub fn invoke_instance(
        &self,
        scopes: &ActiveScopes,
        descriptor: &ComponentDescriptor,
        instance: &Instance,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, InvocationError> {
        let shape = self.chains.build(descriptor, method);
        dispatch(
            CallEnv::new(self, scopes),
            instance,
            &shape,
            &self.interceptors,
            args,
        )
    }

    /// Destroy every remaining context, application included.
    pub fn shutdown(&self) -> usize {
        let destroyed = self.contexts.destroy_all();
        tracing::info!(contexts = destroyed, "Container shut down");
        destroyed
    }
}

fn active_boundary(scopes: &ActiveScopes, scope: &Scope) -> Result<BoundaryId, ContainerError> {
    scopes
        .boundary(scope)
        .ok_or_else(|| ContainerError::NoActiveContext {
            scope: scope.clone(),
        })
}

#[derive(Default)]
pub struct ContainerBuilder {
    components: Vec<ComponentDescriptor>,
    interceptors: InterceptorRegistry,
}

impl ContainerBuilder {
    pub fn component(mut self, descriptor: ComponentDescriptor) -> Self {
        self.components.push(descriptor);
        self
    }

    pub fn interceptor<F>(mut self, id: &str, ctor: F) -> Self
    where
        F: Fn() -> Box<dyn Interceptor> + Send + Sync + 'static,
    {
        self.interceptors.register(id, ctor);
        self
    }

    /// Validate the registrations and open the application context.
    pub fn build(self) -> Result<Arc<Container>, ContainerError> {
        let mut registry = ComponentRegistry::new();
        for descriptor in self.components {
            if let Some(missing) = descriptor
                .bound_interceptors()
                .find(|id| !self.interceptors.contains(id))
            {
                return Err(ContainerError::UnknownInterceptor {
                    component: descriptor.id().clone(),
                    interceptor: missing.clone(),
                });
            }
            registry.register(descriptor)?;
        }

        let container = Container {
            registry,
            interceptors: self.interceptors,
            chains: ChainBuilder::new(),
            contexts: ContextManager::new(),
            waits: WaitGraph::default(),
        };
        container
            .contexts
            .init_context(Scope::Application, BoundaryId::application())?;

        tracing::info!(
            components = container.registry.len(),
            "Container started"
        );
        Ok(Arc::new(container))
    }
}
