use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::component::ComponentFactory;
use crate::error::ContainerError;
use crate::scope::Scope;

/// Identifier of a registered interceptor class.
pub type InterceptorId = String;

/// Unique identity of a managed component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for ComponentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&ComponentId> for ComponentId {
    fn from(value: &ComponentId) -> Self {
        value.clone()
    }
}

/// Interceptor bindings declared at one level: a method, the declaring type,
/// or one of its supertypes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingLevel {
    pub declared_by: String,
    pub interceptors: Vec<InterceptorId>,
    /// Interceptors declared further up the hierarchy than this level are ignored.
    pub exclude_class_interceptors: bool,
}

impl BindingLevel {
    pub fn new(declared_by: impl Into<String>) -> Self {
        Self {
            declared_by: declared_by.into(),
            ..Self::default()
        }
    }

    pub fn intercepted_by<I, S>(mut self, interceptors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<InterceptorId>,
    {
        self.interceptors
            .extend(interceptors.into_iter().map(Into::into));
        self
    }

    pub fn excluding_class_interceptors(mut self) -> Self {
        self.exclude_class_interceptors = true;
        self
    }
}

/// Static metadata for one managed type. Immutable once registered.
pub struct ComponentDescriptor {
    id: ComponentId,
    scope: Scope,
    /// Declaring type first, then supertypes from nearest to farthest.
    class_levels: Vec<BindingLevel>,
    method_levels: HashMap<String, BindingLevel>,
    passivation_capable: bool,
    factory: Arc<dyn ComponentFactory>,
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("class_levels", &self.class_levels)
            .field("method_levels", &self.method_levels)
            .field("passivation_capable", &self.passivation_capable)
            .finish_non_exhaustive()
    }
}

impl ComponentDescriptor {
    pub fn builder(
        id: impl Into<ComponentId>,
        scope: Scope,
        factory: impl ComponentFactory + 'static,
    ) -> DescriptorBuilder {
        DescriptorBuilder {
            id: id.into(),
            scope,
            class_levels: Vec::new(),
            method_levels: HashMap::new(),
            passivation_capable: true,
            factory: Arc::new(factory),
        }
    }

    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn class_levels(&self) -> &[BindingLevel] {
        &self.class_levels
    }

    pub fn method_level(&self, method: &str) -> Option<&BindingLevel> {
        self.method_levels.get(method)
    }

    pub fn is_passivation_capable(&self) -> bool {
        self.passivation_capable
    }

    pub fn factory(&self) -> &dyn ComponentFactory {
        self.factory.as_ref()
    }

    /// Every interceptor id named anywhere in this descriptor.
    pub fn bound_interceptors(&self) -> impl Iterator<Item = &InterceptorId> {
        self.class_levels
            .iter()
            .chain(self.method_levels.values())
            .flat_map(|level| level.interceptors.iter())
    }
}

pub struct DescriptorBuilder {
    id: ComponentId,
    scope: Scope,
    class_levels: Vec<BindingLevel>,
    method_levels: HashMap<String, BindingLevel>,
    passivation_capable: bool,
    factory: Arc<dyn ComponentFactory>,
}

impl DescriptorBuilder {
    /// Append the next level of the type hierarchy. The first call describes
    /// the declaring type, later calls its supertypes, nearest first.
    pub fn class_level(mut self, level: BindingLevel) -> Self {
        self.class_levels.push(level);
        self
    }

    pub fn method(mut self, name: impl Into<String>, level: BindingLevel) -> Self {
        self.method_levels.insert(name.into(), level);
        self
    }

    pub fn passivation_capable(mut self, capable: bool) -> Self {
        self.passivation_capable = capable;
        self
    }

    pub fn build(self) -> ComponentDescriptor {
        ComponentDescriptor {
            id: self.id,
            scope: self.scope,
            class_levels: self.class_levels,
            method_levels: self.method_levels,
            passivation_capable: self.passivation_capable,
            factory: self.factory,
        }
    }
}

/// All registered descriptors, keyed by id.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    components: HashMap<ComponentId, Arc<ComponentDescriptor>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ComponentDescriptor) -> Result<(), ContainerError> {
        if self.components.contains_key(descriptor.id()) {
            return Err(ContainerError::DuplicateComponent(descriptor.id().clone()));
        }
        tracing::debug!(
            component = %descriptor.id(),
            scope = %descriptor.scope(),
            "Component registered"
        );
        self.components
            .insert(descriptor.id().clone(), Arc::new(descriptor));
        Ok(())
    }

    pub fn get(&self, id: &ComponentId) -> Result<Arc<ComponentDescriptor>, ContainerError> {
        self.components
            .get(id)
            .cloned()
            .ok_or_else(|| ContainerError::UnknownComponent(id.clone()))
    }

    pub fn contains(&self, id: &ComponentId) -> bool {
        self.components.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ComponentDescriptor>> {
        self.components.values()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
