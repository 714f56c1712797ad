use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cask_core::{
    ActiveScopes, BoundaryId, ComponentDescriptor, ComponentId, Container, ContainerError,
    Context, CreationalContext, Instance, Scope, StateError, StateSource,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::bag::FailoverBag;
use crate::config::FailoverConfig;
use crate::error::FailoverError;
use crate::handler::{
    HandlerRegistry, ResourceCall, ResourceOutcome, ResourceSerializationHandler,
    SerializationMode, StreamPair,
};
use crate::node::NodeId;
use crate::session::SessionBoundary;
use crate::stream::{
    ContainerInputStream, ContainerOutputStream, InstanceRecord, JsonStreamFactory, StreamFactory,
};

/// Session attribute under which the bag travels.
pub const BAG_ATTRIBUTE: &str = "cask.failover.bag";

/// Where a session stands from the failover service's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Idle,
    Passivating,
    /// Set while a bag is being restored; becomes `Active` once it succeeds.
    Restored,
}

/// Snapshots session contexts into bags and restores them.
///
/// The host drives it with four signals per session: idle, in use, restore,
/// and will-passivate. Snapshots taken on idle are updated in place;
/// passivation always writes a fresh bag. Restore consumes the bag.
pub struct FailoverService {
    container: Arc<Container>,
    node_id: NodeId,
    support_failover: AtomicBool,
    support_passivation: AtomicBool,
    handler: Option<Arc<dyn ResourceSerializationHandler>>,
    streams: Arc<dyn StreamFactory>,
    states: RwLock<HashMap<String, SessionState>>,
}

impl FailoverService {
    /// The named resource handler is loaded only when failover or passivation
    /// is enabled. A handler that cannot be loaded is logged and left out.
    pub fn new(container: Arc<Container>, config: &FailoverConfig, handlers: &HandlerRegistry) -> Self {
        let node_id = NodeId::generate();
        let handler = load_handler(config, handlers);

        tracing::info!(
            node = %node_id,
            support_failover = config.support_failover,
            support_passivation = config.support_passivation,
            handler = handler.is_some(),
            "Failover service started"
        );

        Self {
            container,
            node_id,
            support_failover: AtomicBool::new(config.support_failover),
            support_passivation: AtomicBool::new(config.support_passivation),
            handler,
            streams: Arc::new(JsonStreamFactory),
            states: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_node_id(mut self, node_id: NodeId) -> Self {
        self.node_id = node_id;
        self
    }

    pub fn with_stream_factory(mut self, streams: Arc<dyn StreamFactory>) -> Self {
        self.streams = streams;
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn ResourceSerializationHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn attribute_name(&self) -> &'static str {
        BAG_ATTRIBUTE
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn enable_failover_support(&self, enabled: bool) {
        self.support_failover.store(enabled, Ordering::SeqCst);
    }

    pub fn enable_passivation_support(&self, enabled: bool) {
        self.support_passivation.store(enabled, Ordering::SeqCst);
    }

    pub fn is_support_failover(&self) -> bool {
        self.support_failover.load(Ordering::SeqCst)
    }

    pub fn is_support_passivation(&self) -> bool {
        self.support_passivation.load(Ordering::SeqCst)
    }

    pub fn session_state(&self, session_id: &str) -> Option<SessionState> {
        self.states.read().get(session_id).copied()
    }

    /// The bag currently attached to `session`, if any.
    pub fn bag(&self, session: &dyn SessionBoundary) -> Result<Option<FailoverBag>, FailoverError> {
        session
            .attribute(BAG_ATTRIBUTE)
            .map(serde_json::from_value)
            .transpose()
            .map_err(FailoverError::from)
    }

    /// Snapshot the session into its bag, updating an existing bag in place.
    pub fn session_is_idle(&self, session: &dyn SessionBoundary) -> Result<(), FailoverError> {
        self.set_state(session.id(), SessionState::Idle);
        if !self.is_support_failover() {
            return Ok(());
        }

        let (payload, instances) = match self.snapshot(session.id(), SerializationMode::Failover) {
            Ok(snapshot) => snapshot,
            Err(FailoverError::NoSessionContext(_)) => {
                tracing::debug!(session = session.id(), "No live context to snapshot");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let bag = match self.bag(session)? {
            Some(mut bag) => {
                bag.update(
                    self.node_id.clone(),
                    payload,
                    instances,
                    SerializationMode::Failover,
                );
                bag.codec = self.streams.codec().to_string();
                bag
            }
            None => FailoverBag::new(
                self.node_id.clone(),
                session.id(),
                self.streams.codec(),
                payload,
                instances,
                SerializationMode::Failover,
            ),
        };
        self.store_bag(session, &bag)?;

        tracing::info!(session = session.id(), instances, "Session snapshot stored");
        Ok(())
    }

    /// Bookkeeping only: the bag, if any, stays attached with its content unchanged.
    pub fn session_is_in_use(&self, session: &dyn SessionBoundary) -> Result<(), FailoverError> {
        self.set_state(session.id(), SessionState::Active);
        if let Some(mut bag) = self.bag(session)? {
            bag.touch();
            self.store_bag(session, &bag)?;
        }
        Ok(())
    }

    /// Rebuild the session context from its bag and detach the bag.
    ///
    /// The restored context replaces any live one for the session, which is
    /// torn down. Returns the number of instances restored; zero when no bag
    /// was attached. On failure the bag stays attached and the session keeps
    /// its previous state.
    pub fn restore_beans(&self, session: &dyn SessionBoundary) -> Result<usize, FailoverError> {
        let Some(bag) = self.bag(session)? else {
            self.set_state(session.id(), SessionState::Active);
            return Ok(0);
        };

        if bag.session_id != session.id() {
            return Err(FailoverError::SessionMismatch {
                expected: session.id().to_string(),
                found: bag.session_id,
            });
        }
        bag.verify()?;
        if bag.codec != self.streams.codec() {
            return Err(FailoverError::CodecMismatch {
                expected: self.streams.codec().to_string(),
                found: bag.codec,
            });
        }
        if bag.origin_node != self.node_id {
            tracing::info!(
                session = session.id(),
                origin = %bag.origin_node,
                node = %self.node_id,
                "Restoring session serialized on another node"
            );
        }

        let previous = self.session_state(session.id());
        self.set_state(session.id(), SessionState::Restored);
        let restored = match self.rebuild(session.id(), &bag) {
            Ok(restored) => restored,
            Err(e) => {
                match previous {
                    Some(state) => self.set_state(session.id(), state),
                    None => {
                        self.states.write().remove(session.id());
                    }
                }
                return Err(e);
            }
        };
        session.remove_attribute(BAG_ATTRIBUTE);
        self.set_state(session.id(), SessionState::Active);

        tracing::info!(
            session = session.id(),
            instances = restored,
            passivated = bag.passivated,
            "Session restored"
        );
        Ok(restored)
    }

    fn rebuild(&self, session_id: &str, bag: &FailoverBag) -> Result<usize, FailoverError> {
        let records = self.streams.decode(&bag.payload)?;
        let components: Vec<ComponentId> = records.iter().map(|r| r.component.clone()).collect();
        let pending = PendingRecords {
            service: self,
            mode: bag.mode(),
            records: Mutex::new(
                records
                    .into_iter()
                    .map(|record| (record.component.clone(), record))
                    .collect(),
            ),
        };

        let scopes = ActiveScopes::new().with_session(session_id);
        let context = Context::new(Scope::Session, BoundaryId::new(session_id));
        self.container
            .restore(&scopes, &context, &pending, &components)?;

        let restored = context.len();
        if let Some(notified) = self.container.contexts().install_context(context)? {
            tracing::debug!(session = session_id, notified, "Replaced live session context");
        }
        Ok(restored)
    }

    /// Replace any attached bag with a fresh passivation snapshot.
    ///
    /// A session with no live context keeps its bag as is, since nothing
    /// newer exists to replace it with.
    pub fn session_will_passivate(&self, session: &dyn SessionBoundary) -> Result<(), FailoverError> {
        if !self.is_support_passivation() {
            return Ok(());
        }
        self.set_state(session.id(), SessionState::Passivating);

        let (payload, instances) =
            match self.snapshot(session.id(), SerializationMode::Passivation) {
                Ok(snapshot) => snapshot,
                Err(FailoverError::NoSessionContext(_)) => {
                    tracing::debug!(session = session.id(), "No live context to passivate");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

        let bag = FailoverBag::new(
            self.node_id.clone(),
            session.id(),
            self.streams.codec(),
            payload,
            instances,
            SerializationMode::Passivation,
        );
        self.store_bag(session, &bag)?;

        tracing::info!(session = session.id(), instances, "Session passivated");
        Ok(())
    }

    /// Tear down the session's context and forget its state.
    pub fn session_destroyed(&self, session_id: &str) -> bool {
        self.states.write().remove(session_id);
        self.container
            .contexts()
            .destroy_context(&Scope::Session, &BoundaryId::new(session_id))
    }

    /// Delegate one resource to the configured handler.
    ///
    /// Returns `NotHandled` without consulting anything unless every stream
    /// taking part is container-provided, and whenever no handler is loaded.
    pub fn handle_resource(
        &self,
        component: &ComponentDescriptor,
        call: ResourceCall<'_>,
        streams: StreamPair,
        mode: SerializationMode,
    ) -> ResourceOutcome {
        if !streams.is_container_provided() {
            tracing::debug!(component = %component.id(), "Foreign stream, resource not delegated");
            return ResourceOutcome::NotHandled;
        }
        let Some(handler) = &self.handler else {
            return ResourceOutcome::NotHandled;
        };
        handler.handle_resource(component, call, mode)
    }

    /// Encode every live instance of the session's context.
    ///
    /// Instances whose component is not passivation capable, or that do not
    /// implement state writing, are left out and will be created afresh
    /// after restore.
    pub fn snapshot(
        &self,
        session_id: &str,
        mode: SerializationMode,
    ) -> Result<(Vec<u8>, usize), FailoverError> {
        let context = match self
            .container
            .contexts()
            .get_context(&Scope::Session, &BoundaryId::new(session_id))
        {
            Ok(context) => context,
            Err(ContainerError::NoActiveContext { .. }) => {
                return Err(FailoverError::NoSessionContext(session_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (id, instance) in context.instances() {
            let descriptor = self.container.descriptor(&id)?;
            if !descriptor.is_passivation_capable() {
                tracing::warn!(component = %id, session = session_id, "Component is not passivation capable, skipped");
                continue;
            }

            let mut out = ContainerOutputStream::new(self, &descriptor, mode);
            match instance.passivate(&mut out) {
                Ok(()) => records.push(out.finish()),
                Err(StateError::Unsupported) => {
                    tracing::warn!(component = %id, session = session_id, "Component does not write its state, skipped");
                }
                Err(source) => {
                    return Err(FailoverError::Serialization {
                        component: id,
                        source,
                    });
                }
            }
        }

        let payload = self.streams.encode(&records)?;
        Ok((payload, records.len()))
    }

    fn store_bag(&self, session: &dyn SessionBoundary, bag: &FailoverBag) -> Result<(), FailoverError> {
        session.set_attribute(BAG_ATTRIBUTE, serde_json::to_value(bag)?);
        Ok(())
    }

    fn set_state(&self, session_id: &str, state: SessionState) {
        let previous = self.states.write().insert(session_id.to_string(), state);
        tracing::debug!(session = session_id, ?previous, current = ?state, "Session state changed");
    }
}

/// Decoded records waiting to be activated, each taken at most once.
struct PendingRecords<'a> {
    service: &'a FailoverService,
    mode: SerializationMode,
    records: Mutex<HashMap<ComponentId, InstanceRecord>>,
}

impl StateSource for PendingRecords<'_> {
    fn activate(
        &self,
        descriptor: &ComponentDescriptor,
        ctx: &mut CreationalContext<'_>,
    ) -> Option<Result<Instance, ContainerError>> {
        let record = self.records.lock().remove(descriptor.id())?;
        let mut input = ContainerInputStream::new(self.service, descriptor, self.mode, record);
        let instance = descriptor.factory().activate(&mut input, ctx);

        let unread = input.finish();
        if !unread.is_empty() {
            tracing::debug!(component = %descriptor.id(), ?unread, "Restored fields left unread");
        }
        Some(instance)
    }
}

fn load_handler(
    config: &FailoverConfig,
    handlers: &HandlerRegistry,
) -> Option<Arc<dyn ResourceSerializationHandler>> {
    if !config.is_enabled() {
        return None;
    }
    let name = config.resource_serialization_handler.as_deref()?;
    match handlers.instantiate(name) {
        Ok(handler) => {
            tracing::info!(handler = name, "Resource serialization handler loaded");
            Some(handler)
        }
        Err(e) => {
            tracing::warn!(
                handler = name,
                error = %e,
                "Resource serialization handler unavailable, resources will not be delegated"
            );
            None
        }
    }
}
