use std::collections::HashMap;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::descriptor::ComponentId;

/// A construction slot: the owning context's id plus the component.
pub(crate) type SlotKey = (u64, ComponentId);

#[derive(Default)]
struct Edges {
    /// Which thread is running the factory for a slot.
    owners: HashMap<SlotKey, ThreadId>,
    /// Which slot a thread is blocked on.
    waiting: HashMap<ThreadId, SlotKey>,
}

/// Wait-for graph across every context of one container.
///
/// A thread about to block on a slot another thread is constructing first
/// follows owner and waiting edges. Coming back to itself means the two
/// constructions need each other and neither can finish.
#[derive(Default)]
pub(crate) struct WaitGraph {
    edges: Mutex<Edges>,
}

impl WaitGraph {
    /// Mark the current thread as constructing `key` until the guard drops.
    pub(crate) fn own(&self, key: SlotKey) -> OwnerGuard<'_> {
        self.edges.lock().owners.insert(key.clone(), thread::current().id());
        OwnerGuard { graph: self, key }
    }

    /// Record that the current thread is about to block on `key`.
    ///
    /// Returns the components on the cycle, starting and ending with the one
    /// being waited on, if blocking would deadlock. Nothing is recorded then.
    pub(crate) fn wait_on(&self, key: &SlotKey) -> Result<WaitGuard<'_>, Vec<ComponentId>> {
        let me = thread::current().id();
        let mut edges = self.edges.lock();

        let mut cycle = vec![key.1.clone()];
        let mut next = key;
        while let Some(owner) = edges.owners.get(next) {
            if *owner == me {
                return Err(cycle);
            }
            let Some(blocked_on) = edges.waiting.get(owner) else {
                break;
            };
            cycle.push(blocked_on.1.clone());
            next = blocked_on;
        }

        edges.waiting.insert(me, key.clone());
        Ok(WaitGuard { graph: self, me })
    }
}

pub(crate) struct OwnerGuard<'a> {
    graph: &'a WaitGraph,
    key: SlotKey,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        self.graph.edges.lock().owners.remove(&self.key);
    }
}

pub(crate) struct WaitGuard<'a> {
    graph: &'a WaitGraph,
    me: ThreadId,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.graph.edges.lock().waiting.remove(&self.me);
    }
}
