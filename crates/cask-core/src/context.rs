use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::component::Instance;
use crate::descriptor::ComponentId;
use crate::error::ContainerError;
use crate::scope::{BoundaryId, Scope};
use crate::wait::WaitGraph;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// At most one instance per component; the slot mutex covers check-then-create.
type Slot = Arc<Mutex<Option<Instance>>>;

/// The live store of instances for one active scope boundary.
///
/// # Threading
///
/// Session and application contexts are reached from many request threads.
/// The slot map is behind an `RwLock`; each component gets its own slot mutex,
/// so two requests racing to create the same component serialize on that slot
/// only, while unrelated components are created concurrently. A thread that
/// would block on a slot whose construction is itself waiting on this thread
/// gets [`ContainerError::CyclicDependency`] instead.
pub struct Context {
    id: u64,
    scope: Scope,
    boundary: BoundaryId,
    slots: RwLock<HashMap<ComponentId, Slot>>,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("boundary", &self.boundary)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(scope: Scope, boundary: BoundaryId) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            scope,
            boundary,
            slots: RwLock::new(HashMap::new()),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn boundary(&self) -> &BoundaryId {
        &self.boundary
    }

    pub fn is_active(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire)
    }

    /// The live instance for `component`, if one exists.
    pub fn get(&self, component: &ComponentId) -> Option<Instance> {
        let slot = self.slots.read().get(component).cloned()?;
        let guard = slot.lock();
        guard.clone()
    }

    /// Return the existing instance or run `create` exactly once to make one.
    pub fn get_or_create<F>(&self, component: &ComponentId, create: F) -> Result<Instance, ContainerError>
    where
        F: FnOnce() -> Result<Instance, ContainerError>,
    {
        self.get_or_create_waiting(component, &WaitGraph::default(), create)
    }

    /// As [`Context::get_or_create`], checking `graph` before blocking on a
    /// slot another thread is constructing.
    pub(crate) fn get_or_create_waiting<F>(
        &self,
        component: &ComponentId,
        graph: &WaitGraph,
        create: F,
    ) -> Result<Instance, ContainerError>
    where
        F: FnOnce() -> Result<Instance, ContainerError>,
    {
        if !self.is_active() {
            return Err(ContainerError::NoActiveContext {
                scope: self.scope.clone(),
            });
        }

        let key = (self.id, component.clone());
        let slot = self.slot(component);
        let mut guard = match slot.try_lock() {
            Some(guard) => guard,
            None => {
                let _waiting = graph
                    .wait_on(&key)
                    .map_err(|path| ContainerError::CyclicDependency { path })?;
                slot.lock()
            }
        };
        if let Some(existing) = guard.as_ref() {
            return Ok(existing.clone());
        }

        let _owner = graph.own(key);
        let instance = create()?;
        *guard = Some(instance.clone());
        tracing::debug!(
            component = %component,
            scope = %self.scope,
            boundary = %self.boundary,
            "Instance created"
        );
        Ok(instance)
    }

    /// Place an already-built instance, e.g. one restored from a failover bag.
    pub fn insert(&self, component: &ComponentId, instance: Instance) -> Result<(), ContainerError> {
        let slot = self.slot(component);
        let mut guard = slot.lock();
        if guard.is_some() {
            return Err(ContainerError::DuplicateInstance {
                component: component.clone(),
                scope: self.scope.clone(),
            });
        }
        *guard = Some(instance);
        Ok(())
    }

    pub fn contains(&self, component: &ComponentId) -> bool {
        self.get(component).is_some()
    }

    pub fn len(&self) -> usize {
        // Slots are only locked after the map lock is released.
        let slots: Vec<Slot> = self.slots.read().values().cloned().collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the live instances, ordered by component id.
    pub fn instances(&self) -> Vec<(ComponentId, Instance)> {
        let slots: Vec<(ComponentId, Slot)> = self
            .slots
            .read()
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect();

        let mut instances: Vec<_> = slots
            .into_iter()
            .filter_map(|(id, slot)| slot.lock().clone().map(|instance| (id, instance)))
            .collect();
        instances.sort_by(|a, b| a.0.cmp(&b.0));
        instances
    }

    /// Notify every live instance, then drop them all. Returns how many were notified.
    ///
    /// Only the first call does anything; later and concurrent calls return 0.
    /// Instances stay visible to readers until every notification has run.
    pub(crate) fn destroy(&self) -> usize {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let instances = self.instances();
        for (component, instance) in &instances {
            if let Err(e) = instance.pre_destroy() {
                tracing::warn!(
                    component = %component,
                    scope = %self.scope,
                    boundary = %self.boundary,
                    "Pre-destroy failed: {e}"
                );
            }
        }

        self.slots.write().clear();
        instances.len()
    }

    fn slot(&self, component: &ComponentId) -> Slot {
        if let Some(slot) = self.slots.read().get(component) {
            return slot.clone();
        }
        self.slots
            .write()
            .entry(component.clone())
            .or_default()
            .clone()
    }
}
