use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::descriptor::{ComponentDescriptor, ComponentId, InterceptorId};
use crate::dispatch::InvocationContext;
use crate::error::InvocationError;

/// A cross-cutting behavior wrapped around component method invocations.
///
/// Call [`InvocationContext::proceed`] to run the rest of the chain. Returning
/// without proceeding short-circuits it: the target method is never called
/// and this link's value becomes the result.
pub trait Interceptor: Send + Sync {
    fn around_invoke(&self, ctx: &mut InvocationContext<'_>) -> Result<Value, InvocationError>;

    /// Called once after the invocation this instance served has completed.
    fn pre_destroy(&self) {}
}

type InterceptorCtor = Arc<dyn Fn() -> Box<dyn Interceptor> + Send + Sync>;

/// Interceptor classes by id. Instances are dependent-scoped: a fresh one per invocation.
#[derive(Default, Clone)]
pub struct InterceptorRegistry {
    ctors: HashMap<InterceptorId, InterceptorCtor>,
}

impl fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.ctors.keys().collect();
        ids.sort();
        f.debug_struct("InterceptorRegistry")
            .field("interceptors", &ids)
            .finish()
    }
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, id: impl Into<InterceptorId>, ctor: F)
    where
        F: Fn() -> Box<dyn Interceptor> + Send + Sync + 'static,
    {
        self.ctors.insert(id.into(), Arc::new(ctor));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ctors.contains_key(id)
    }

    pub fn instantiate(&self, id: &str) -> Option<Box<dyn Interceptor>> {
        self.ctors.get(id).map(|ctor| ctor())
    }
}

/// The resolved interceptor order for one (component, method) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainShape {
    pub component: ComponentId,
    pub method: String,
    pub interceptors: Vec<InterceptorId>,
}

impl ChainShape {
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

/// Interceptor ids applicable to `method`, outermost first.
///
/// Method-level bindings come first, then the declaring type, then each
/// supertype from nearest to farthest. Collection stops after the first level
/// carrying the exclude-class-interceptors marker. Duplicates keep their
/// first position.
pub fn resolve_bindings(descriptor: &ComponentDescriptor, method: &str) -> Vec<InterceptorId> {
    let mut order = Vec::new();

    if let Some(level) = descriptor.method_level(method) {
        extend_unique(&mut order, &level.interceptors);
        if level.exclude_class_interceptors {
            return order;
        }
    }

    for level in descriptor.class_levels() {
        extend_unique(&mut order, &level.interceptors);
        if level.exclude_class_interceptors {
            break;
        }
    }

    order
}

fn extend_unique(order: &mut Vec<InterceptorId>, ids: &[InterceptorId]) {
    for id in ids {
        if !order.contains(id) {
            order.push(id.clone());
        }
    }
}

/// Builds and caches chain shapes. A shape never changes once built.
#[derive(Debug, Default)]
pub struct ChainBuilder {
    cache: RwLock<HashMap<(ComponentId, String), Arc<ChainShape>>>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(&self, descriptor: &ComponentDescriptor, method: &str) -> Arc<ChainShape> {
        let key = (descriptor.id().clone(), method.to_string());
        if let Some(shape) = self.cache.read().get(&key) {
            return shape.clone();
        }

        let shape = Arc::new(ChainShape {
            component: descriptor.id().clone(),
            method: method.to_string(),
            interceptors: resolve_bindings(descriptor, method),
        });
        tracing::debug!(
            component = %descriptor.id(),
            method,
            interceptors = ?shape.interceptors,
            "Chain shape built"
        );

        self.cache.write().entry(key).or_insert(shape).clone()
    }

    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }
}
