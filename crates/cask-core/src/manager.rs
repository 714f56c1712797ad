use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::context::Context;
use crate::error::ContainerError;
use crate::scope::{BoundaryId, Scope};

type ContextKey = (Scope, BoundaryId);

/// Owns every live [`Context`], keyed by scope and boundary.
///
/// `init_context` is strict: initializing a boundary twice is a lifecycle bug
/// and fails with [`ContainerError::DuplicateContext`]. `destroy_context`
/// tolerates boundaries that are already gone.
#[derive(Default)]
pub struct ContextManager {
    contexts: RwLock<HashMap<ContextKey, Arc<Context>>>,
}

impl ContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_context(
        &self,
        scope: Scope,
        boundary: impl Into<BoundaryId>,
    ) -> Result<Arc<Context>, ContainerError> {
        if !scope.is_normal() {
            return Err(ContainerError::NotContextual(scope));
        }
        let boundary = boundary.into();

        let mut contexts = self.contexts.write();
        let key = (scope.clone(), boundary.clone());
        if contexts.contains_key(&key) {
            return Err(ContainerError::DuplicateContext { scope, boundary });
        }

        let context = Arc::new(Context::new(scope.clone(), boundary.clone()));
        contexts.insert(key, context.clone());
        tracing::info!(scope = %scope, boundary = %boundary, "Context initialized");
        Ok(context)
    }

    /// Tear down a boundary: every live instance is notified, then the context is removed.
    ///
    /// Returns `false` when no such context exists. Callers must have drained
    /// all requests against the boundary first.
    pub fn destroy_context(&self, scope: &Scope, boundary: &BoundaryId) -> bool {
        let key = (scope.clone(), boundary.clone());
        let Some(context) = self.contexts.read().get(&key).cloned() else {
            tracing::debug!(scope = %scope, boundary = %boundary, "No context to destroy");
            return false;
        };

        let notified = context.destroy();
        {
            // A context installed for the same boundary meanwhile stays.
            let mut contexts = self.contexts.write();
            if contexts
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &context))
            {
                contexts.remove(&key);
            }
        }
        tracing::info!(
            scope = %scope,
            boundary = %boundary,
            instances = notified,
            "Context destroyed"
        );
        true
    }

    pub fn get_context(&self, scope: &Scope, boundary: &BoundaryId) -> Result<Arc<Context>, ContainerError> {
        self.contexts
            .read()
            .get(&(scope.clone(), boundary.clone()))
            .cloned()
            .ok_or_else(|| ContainerError::NoActiveContext {
                scope: scope.clone(),
            })
    }

    /// Put a prepared context in place, replacing any existing one for the
    /// same boundary.
    ///
    /// A replaced context is torn down like [`ContextManager::destroy_context`]
    /// would; the number of its instances notified is returned.
    pub fn install_context(&self, context: Context) -> Result<Option<usize>, ContainerError> {
        if !context.scope().is_normal() {
            return Err(ContainerError::NotContextual(context.scope().clone()));
        }
        let key = (context.scope().clone(), context.boundary().clone());
        let Some(previous) = self.contexts.write().insert(key, Arc::new(context)) else {
            return Ok(None);
        };

        let notified = previous.destroy();
        tracing::info!(
            scope = %previous.scope(),
            boundary = %previous.boundary(),
            instances = notified,
            "Context replaced"
        );
        Ok(Some(notified))
    }

    pub fn is_active(&self, scope: &Scope, boundary: &BoundaryId) -> bool {
        self.contexts
            .read()
            .contains_key(&(scope.clone(), boundary.clone()))
    }

    /// Every active (scope, boundary) pair.
    pub fn active(&self) -> Vec<(Scope, BoundaryId)> {
        self.contexts.read().keys().cloned().collect()
    }

    /// Destroy all remaining contexts. Returns how many were torn down.
    pub fn destroy_all(&self) -> usize {
        let keys = self.active();
        keys.iter()
            .filter(|(scope, boundary)| self.destroy_context(scope, boundary))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::component::Managed;
    use crate::container::CallEnv;
    use crate::error::InvocationError;

    #[test]
    fn init_then_get() {
        let manager = ContextManager::new();
        let created = manager.init_context(Scope::Request, "r-1").unwrap();
        let fetched = manager.get_context(&Scope::Request, &"r-1".into()).unwrap();
        assert!(Arc::ptr_eq(&created, &fetched));
    }

    #[test]
    fn duplicate_init_fails() {
        let manager = ContextManager::new();
        manager.init_context(Scope::Session, "s-1").unwrap();

        let err = manager.init_context(Scope::Session, "s-1").unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateContext { .. }));

        // Same token under another scope is a different boundary.
        manager.init_context(Scope::Request, "s-1").unwrap();
    }

    #[test]
    fn dependent_scope_has_no_context() {
        let manager = ContextManager::new();
        let err = manager.init_context(Scope::Dependent, "d").unwrap_err();
        assert!(matches!(err, ContainerError::NotContextual(Scope::Dependent)));
    }

    #[test]
    fn missing_context_is_not_active() {
        let manager = ContextManager::new();
        let err = manager
            .get_context(&Scope::Request, &"r-9".into())
            .unwrap_err();
        assert!(matches!(err, ContainerError::NoActiveContext { scope: Scope::Request }));
    }

    #[test]
    fn destroy_after_destroy_is_tolerated() {
        let manager = ContextManager::new();
        manager.init_context(Scope::Request, "r-1").unwrap();

        assert!(manager.destroy_context(&Scope::Request, &"r-1".into()));
        assert!(!manager.destroy_context(&Scope::Request, &"r-1".into()));
        assert!(!manager.is_active(&Scope::Request, &"r-1".into()));
    }

    #[test]
    fn install_tears_down_the_replaced_context() {
        let manager = ContextManager::new();
        let old = manager.init_context(Scope::Session, "s-1").unwrap();

        let replaced = manager
            .install_context(Context::new(Scope::Session, "s-1".into()))
            .unwrap();
        assert_eq!(replaced, Some(0));
        assert!(!old.is_active());

        let current = manager.get_context(&Scope::Session, &"s-1".into()).unwrap();
        assert!(current.is_active());
        assert!(!Arc::ptr_eq(&old, &current));
    }

    /// Installs a fresh context for its own boundary while being torn down.
    struct Reinstaller {
        manager: Arc<ContextManager>,
    }

    impl Managed for Reinstaller {
        fn call(&self, _method: &str, _args: &[Value], _env: &CallEnv<'_>) -> Result<Value, InvocationError> {
            Ok(Value::Null)
        }

        fn pre_destroy(&self) -> anyhow::Result<()> {
            self.manager
                .install_context(Context::new(Scope::Session, "s-1".into()))?;
            Ok(())
        }
    }

    #[test]
    fn destroy_keeps_a_context_installed_meanwhile() {
        let manager = Arc::new(ContextManager::new());
        let old = manager.init_context(Scope::Session, "s-1").unwrap();
        old.insert(
            &"reinstaller".into(),
            Arc::new(Reinstaller {
                manager: manager.clone(),
            }),
        )
        .unwrap();

        assert!(manager.destroy_context(&Scope::Session, &"s-1".into()));

        let current = manager.get_context(&Scope::Session, &"s-1".into()).unwrap();
        assert!(current.is_active());
        assert!(!Arc::ptr_eq(&old, &current));
    }

    #[test]
    fn destroy_all_clears_everything() {
        let manager = ContextManager::new();
        manager.init_context(Scope::Application, BoundaryId::application()).unwrap();
        manager.init_context(Scope::Session, "s-1").unwrap();
        manager.init_context(Scope::Request, "r-1").unwrap();

        assert_eq!(manager.destroy_all(), 3);
        assert!(manager.active().is_empty());
    }
}
