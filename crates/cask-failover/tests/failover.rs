//! Failover service state machine, bag handling, and resource delegation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use cask_core::{
    ActiveScopes, CallEnv, ClientProxy, ComponentDescriptor, Container, Instance, InvocationError,
    Managed, ObjectOutput, ResourceObject, Scope, StateError, StreamOrigin, downcast, factory_fn,
    passivating_factory, resource_downcast,
};
use cask_failover::{
    BAG_ATTRIBUTE, FailoverConfig, FailoverError, FailoverService, HandlerRegistry, MemorySession,
    ResourceCall, ResourceOutcome, ResourceSerializationHandler, SerializationMode, SessionBoundary,
    SessionState, StreamPair,
};
use parking_lot::Mutex;
use serde_json::{Value, json};

// ── Components ───────────────────────────────────────────────────────────────

#[derive(Debug)]
struct RemoteHandle {
    id: String,
}

impl ResourceObject for RemoteHandle {
    fn kind(&self) -> &str {
        "remote-handle"
    }
}

struct Catalog;

impl Managed for Catalog {
    fn call(&self, method: &str, _args: &[Value], _env: &CallEnv<'_>) -> Result<Value, InvocationError> {
        match method {
            "name" => Ok(json!("spring catalog")),
            _ => Err(InvocationError::application(format!("no method {method}"))),
        }
    }
}

struct Cart {
    items: Mutex<Vec<String>>,
    catalog: ClientProxy,
    remote: Option<Arc<dyn ResourceObject>>,
}

impl Managed for Cart {
    fn call(&self, method: &str, args: &[Value], env: &CallEnv<'_>) -> Result<Value, InvocationError> {
        match method {
            "add" => {
                let item = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| InvocationError::InvalidArguments {
                        method: method.into(),
                        reason: "expected an item name".into(),
                    })?;
                self.items.lock().push(item.to_string());
                Ok(Value::Null)
            }
            "items" => Ok(json!(*self.items.lock())),
            "catalog" => self.catalog.invoke(env, "name", vec![]),
            "remote" => Ok(json!(
                self.remote
                    .as_ref()
                    .and_then(|r| resource_downcast::<RemoteHandle>(r))
                    .map(|h| h.id.clone())
            )),
            _ => Err(InvocationError::application(format!("no method {method}"))),
        }
    }

    fn passivate(&self, out: &mut dyn ObjectOutput) -> Result<(), StateError> {
        out.write("items", &*self.items.lock())?;
        out.write_proxy("catalog", &self.catalog)?;
        if let Some(remote) = &self.remote {
            out.write_resource("remote", remote)?;
        }
        Ok(())
    }
}

struct Counter {
    count: AtomicU64,
}

impl Managed for Counter {
    fn call(&self, method: &str, _args: &[Value], _env: &CallEnv<'_>) -> Result<Value, InvocationError> {
        match method {
            "increment" => Ok(json!(self.count.fetch_add(1, Ordering::SeqCst) + 1)),
            "count" => Ok(json!(self.count.load(Ordering::SeqCst))),
            _ => Err(InvocationError::application(format!("no method {method}"))),
        }
    }

    fn passivate(&self, out: &mut dyn ObjectOutput) -> Result<(), StateError> {
        out.write("count", &self.count.load(Ordering::SeqCst))
    }
}

/// Session component that never survives serialization.
struct Scratch;

impl Managed for Scratch {
    fn call(&self, method: &str, _args: &[Value], _env: &CallEnv<'_>) -> Result<Value, InvocationError> {
        Err(InvocationError::application(format!("no method {method}")))
    }
}

fn node_container() -> Arc<Container> {
    Container::builder()
        .component(
            ComponentDescriptor::builder(
                "catalog",
                Scope::Application,
                factory_fn(|_| Ok(Arc::new(Catalog) as Instance)),
            )
            .build(),
        )
        .component(
            ComponentDescriptor::builder(
                "cart",
                Scope::Session,
                passivating_factory(
                    |ctx| {
                        Ok(Arc::new(Cart {
                            items: Mutex::new(Vec::new()),
                            catalog: ctx.proxy("catalog")?,
                            remote: Some(Arc::new(RemoteHandle {
                                id: "handle-7".into(),
                            })),
                        }) as Instance)
                    },
                    |input, _ctx| {
                        let items: Vec<String> = input.read("items")?;
                        let catalog = input.read_proxy("catalog")?;
                        let remote = input.read_resource("remote")?;
                        Ok(Arc::new(Cart {
                            items: Mutex::new(items),
                            catalog,
                            remote,
                        }) as Instance)
                    },
                ),
            )
            .build(),
        )
        .component(
            ComponentDescriptor::builder(
                "counter",
                Scope::Session,
                passivating_factory(
                    |_| {
                        Ok(Arc::new(Counter {
                            count: AtomicU64::new(0),
                        }) as Instance)
                    },
                    |input, _ctx| {
                        let count: u64 = input.read("count")?;
                        Ok(Arc::new(Counter {
                            count: AtomicU64::new(count),
                        }) as Instance)
                    },
                ),
            )
            .build(),
        )
        .component(
            ComponentDescriptor::builder(
                "scratch",
                Scope::Session,
                factory_fn(|_| Ok(Arc::new(Scratch) as Instance)),
            )
            .passivation_capable(false)
            .build(),
        )
        .build()
        .unwrap()
}

// ── Resource handler ─────────────────────────────────────────────────────────

#[derive(Default)]
struct RemoteHandles {
    calls: AtomicUsize,
    modes: Mutex<Vec<SerializationMode>>,
}

impl ResourceSerializationHandler for RemoteHandles {
    fn handle_resource(
        &self,
        _component: &ComponentDescriptor,
        call: ResourceCall<'_>,
        mode: SerializationMode,
    ) -> ResourceOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.modes.lock().push(mode);
        match call {
            ResourceCall::Write(resource) => match resource_downcast::<RemoteHandle>(resource) {
                Some(handle) => ResourceOutcome::Written(json!({ "handle": handle.id })),
                None => ResourceOutcome::NotHandled,
            },
            ResourceCall::Read {
                kind: "remote-handle",
                payload,
            } => match payload["handle"].as_str() {
                Some(id) => ResourceOutcome::Read(Arc::new(RemoteHandle { id: id.into() })),
                None => ResourceOutcome::NotHandled,
            },
            ResourceCall::Read { .. } => ResourceOutcome::NotHandled,
        }
    }
}

fn enabled() -> FailoverConfig {
    FailoverConfig {
        support_failover: true,
        support_passivation: true,
        resource_serialization_handler: None,
    }
}

fn service(container: Arc<Container>, handler: Option<Arc<RemoteHandles>>) -> FailoverService {
    let service = FailoverService::new(container, &enabled(), &HandlerRegistry::new());
    match handler {
        Some(handler) => service.with_handler(handler),
        None => service,
    }
}

fn open_session(container: &Container, session: &str) {
    container
        .contexts()
        .init_context(Scope::Session, session)
        .unwrap();
}

fn serve(container: &Container, session: &str, item: &str) {
    let scopes = ActiveScopes::new().with_session(session);
    container
        .invoke(&scopes, &"cart".into(), "add", vec![json!(item)])
        .unwrap();
    container
        .invoke(&scopes, &"counter".into(), "increment", vec![])
        .unwrap();
}

fn call(container: &Container, session: &str, component: &str, method: &str) -> Value {
    let scopes = ActiveScopes::new().with_session(session);
    container
        .invoke(&scopes, &component.into(), method, vec![])
        .unwrap()
}

// ── State machine ────────────────────────────────────────────────────────────

#[test]
fn idle_then_in_use_leaves_bag_content_unchanged() {
    let container = node_container();
    let failover = service(container.clone(), None);
    let session = MemorySession::new("s-1");
    open_session(&container, "s-1");
    serve(&container, "s-1", "apple");

    failover.session_is_idle(&session).unwrap();
    assert_eq!(failover.session_state("s-1"), Some(SessionState::Idle));
    let idle = failover.bag(&session).unwrap().expect("bag after idle");

    failover.session_is_in_use(&session).unwrap();
    assert_eq!(failover.session_state("s-1"), Some(SessionState::Active));
    let in_use = failover.bag(&session).unwrap().expect("bag still attached");

    assert_eq!(in_use.payload, idle.payload);
    assert_eq!(in_use.checksum, idle.checksum);
    assert_eq!(in_use.updated_at, idle.updated_at);
    assert!(in_use.last_access >= idle.last_access);
}

#[test]
fn idle_updates_existing_bag_in_place() {
    let container = node_container();
    let failover = service(container.clone(), None);
    let session = MemorySession::new("s-1");
    open_session(&container, "s-1");

    serve(&container, "s-1", "apple");
    failover.session_is_idle(&session).unwrap();
    let first = failover.bag(&session).unwrap().unwrap();

    serve(&container, "s-1", "pear");
    failover.session_is_idle(&session).unwrap();
    let second = failover.bag(&session).unwrap().unwrap();

    assert_ne!(first.payload, second.payload);
    assert!(!second.passivated);
    assert_eq!(second.instances, 2);
    assert_eq!(second.origin_node, *failover.node_id());
}

#[test]
fn passivation_always_replaces_the_bag() {
    let container = node_container();
    let failover = service(container.clone(), None);
    let session = MemorySession::new("s-1");
    open_session(&container, "s-1");

    serve(&container, "s-1", "apple");
    failover.session_is_idle(&session).unwrap();
    let idle = failover.bag(&session).unwrap().unwrap();

    serve(&container, "s-1", "pear");
    failover.session_will_passivate(&session).unwrap();
    let first = failover.bag(&session).unwrap().unwrap();
    assert_eq!(failover.session_state("s-1"), Some(SessionState::Passivating));
    assert!(first.passivated);
    assert_ne!(first.payload, idle.payload);

    serve(&container, "s-1", "plum");
    failover.session_will_passivate(&session).unwrap();
    let second = failover.bag(&session).unwrap().unwrap();
    assert_ne!(second.payload, first.payload);

    // The replacement reflects the latest live state, not any earlier bag.
    let node_b = node_container();
    let restorer = service(node_b.clone(), None);
    let replica = session.replicate();
    restorer.restore_beans(&replica).unwrap();
    assert_eq!(
        call(&node_b, "s-1", "cart", "items"),
        json!(["apple", "pear", "plum"])
    );
    assert_eq!(call(&node_b, "s-1", "counter", "count"), json!(3));
}

#[test]
fn disabled_features_do_not_snapshot() {
    let container = node_container();
    let failover = FailoverService::new(
        container.clone(),
        &FailoverConfig::default(),
        &HandlerRegistry::new(),
    );
    let session = MemorySession::new("s-1");
    open_session(&container, "s-1");
    serve(&container, "s-1", "apple");

    failover.session_is_idle(&session).unwrap();
    failover.session_will_passivate(&session).unwrap();
    assert!(session.attribute(BAG_ATTRIBUTE).is_none());

    failover.enable_failover_support(true);
    assert!(failover.is_support_failover());
    assert!(!failover.is_support_passivation());
    failover.session_is_idle(&session).unwrap();
    assert!(failover.bag(&session).unwrap().is_some());
}

#[test]
fn idle_without_live_context_is_a_no_op() {
    let container = node_container();
    let failover = service(container, None);
    let session = MemorySession::new("never-used");

    failover.session_is_idle(&session).unwrap();
    assert!(failover.bag(&session).unwrap().is_none());
}

// ── Restore ──────────────────────────────────────────────────────────────────

#[test]
fn restore_on_another_node_rebuilds_equivalent_instances() {
    let node_a = node_container();
    let failover_a = service(node_a.clone(), Some(Arc::new(RemoteHandles::default())));
    let session = MemorySession::new("s-1");
    open_session(&node_a, "s-1");
    serve(&node_a, "s-1", "apple");
    serve(&node_a, "s-1", "pear");
    // Live but not passivation capable, so it stays behind.
    node_a
        .resolve(&ActiveScopes::new().with_session("s-1"), &"scratch".into())
        .unwrap();

    failover_a.session_is_idle(&session).unwrap();
    assert_eq!(failover_a.bag(&session).unwrap().unwrap().instances, 2);

    let node_b = node_container();
    let failover_b = service(node_b.clone(), Some(Arc::new(RemoteHandles::default())));
    let replica = session.replicate();
    let restored = failover_b.restore_beans(&replica).unwrap();

    assert_eq!(restored, 2);
    assert!(replica.attribute(BAG_ATTRIBUTE).is_none());
    assert_eq!(failover_b.session_state("s-1"), Some(SessionState::Active));

    assert_eq!(call(&node_b, "s-1", "cart", "items"), json!(["apple", "pear"]));
    assert_eq!(call(&node_b, "s-1", "counter", "count"), json!(2));
    assert_eq!(call(&node_b, "s-1", "cart", "catalog"), json!("spring catalog"));
    assert_eq!(call(&node_b, "s-1", "cart", "remote"), json!("handle-7"));

    let context = node_b
        .contexts()
        .get_context(&Scope::Session, &"s-1".into())
        .unwrap();
    assert!(!context.contains(&"scratch".into()));
}

#[test]
fn restore_on_same_node_yields_new_instances() {
    let container = node_container();
    let failover = service(container.clone(), None);
    let session = MemorySession::new("s-1");
    open_session(&container, "s-1");
    serve(&container, "s-1", "apple");

    let scopes = ActiveScopes::new().with_session("s-1");
    let cart_before = container.resolve(&scopes, &"cart".into()).unwrap();
    let counter_before = container.resolve(&scopes, &"counter".into()).unwrap();

    failover.session_is_idle(&session).unwrap();
    assert_eq!(failover.restore_beans(&session).unwrap(), 2);

    let cart_after = container.resolve(&scopes, &"cart".into()).unwrap();
    let counter_after = container.resolve(&scopes, &"counter".into()).unwrap();
    assert!(!Arc::ptr_eq(&cart_before, &cart_after));
    assert!(!Arc::ptr_eq(&counter_before, &counter_after));

    let before = downcast::<Cart>(&cart_before).unwrap();
    let after = downcast::<Cart>(&cart_after).unwrap();
    assert_eq!(*before.items.lock(), *after.items.lock());
    assert_eq!(
        downcast::<Counter>(&counter_after)
            .unwrap()
            .count
            .load(Ordering::SeqCst),
        1
    );
}

#[test]
fn restore_without_bag_restores_nothing() {
    let container = node_container();
    let failover = service(container, None);
    let session = MemorySession::new("s-1");

    assert_eq!(failover.restore_beans(&session).unwrap(), 0);
    assert_eq!(failover.session_state("s-1"), Some(SessionState::Active));
}

#[test]
fn tampered_bag_is_rejected_and_kept() {
    let container = node_container();
    let failover = service(container.clone(), None);
    let session = MemorySession::new("s-1");
    open_session(&container, "s-1");
    serve(&container, "s-1", "apple");
    failover.session_is_idle(&session).unwrap();

    let mut bag = failover.bag(&session).unwrap().unwrap();
    bag.payload.push(b' ');
    session.set_attribute(BAG_ATTRIBUTE, serde_json::to_value(&bag).unwrap());

    let err = failover.restore_beans(&session).unwrap_err();
    assert!(matches!(err, FailoverError::ChecksumMismatch { .. }));
    assert!(session.attribute(BAG_ATTRIBUTE).is_some());
    assert_eq!(failover.session_state("s-1"), Some(SessionState::Idle));
}

#[test]
fn bag_of_another_session_is_rejected() {
    let container = node_container();
    let failover = service(container.clone(), None);
    let session = MemorySession::new("s-1");
    open_session(&container, "s-1");
    serve(&container, "s-1", "apple");
    failover.session_is_idle(&session).unwrap();

    let stranger = MemorySession::new("s-2");
    stranger.set_attribute(BAG_ATTRIBUTE, session.attribute(BAG_ATTRIBUTE).unwrap());

    let err = failover.restore_beans(&stranger).unwrap_err();
    assert!(matches!(err, FailoverError::SessionMismatch { .. }));
    assert_eq!(failover.session_state("s-2"), None);
    assert!(
        !container
            .contexts()
            .is_active(&Scope::Session, &"s-2".into())
    );
}

// ── Restored dependencies ────────────────────────────────────────────────────

/// Session component with renameable state and a teardown counter.
struct Leaf {
    label: Mutex<String>,
    destroyed: Arc<AtomicUsize>,
}

impl Managed for Leaf {
    fn call(&self, method: &str, args: &[Value], _env: &CallEnv<'_>) -> Result<Value, InvocationError> {
        match method {
            "rename" => {
                *self.label.lock() = args.first().and_then(Value::as_str).unwrap_or_default().to_string();
                Ok(Value::Null)
            }
            "label" => Ok(json!(*self.label.lock())),
            _ => Err(InvocationError::application(format!("no method {method}"))),
        }
    }

    fn pre_destroy(&self) -> anyhow::Result<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn passivate(&self, out: &mut dyn ObjectOutput) -> Result<(), StateError> {
        out.write("label", &*self.label.lock())
    }
}

/// Session component holding its leaf directly, resolved at construction.
struct Holder {
    leaf: Instance,
}

impl Managed for Holder {
    fn call(&self, method: &str, _args: &[Value], _env: &CallEnv<'_>) -> Result<Value, InvocationError> {
        Err(InvocationError::application(format!("no method {method}")))
    }

    fn passivate(&self, _out: &mut dyn ObjectOutput) -> Result<(), StateError> {
        Ok(())
    }
}

fn wired_container(destroyed: &Arc<AtomicUsize>) -> Arc<Container> {
    let (on_create, on_activate) = (destroyed.clone(), destroyed.clone());
    Container::builder()
        .component(
            ComponentDescriptor::builder(
                "holder",
                Scope::Session,
                passivating_factory(
                    |ctx| Ok(Arc::new(Holder { leaf: ctx.resolve("leaf")? }) as Instance),
                    |_input, ctx| Ok(Arc::new(Holder { leaf: ctx.resolve("leaf")? }) as Instance),
                ),
            )
            .build(),
        )
        .component(
            ComponentDescriptor::builder(
                "leaf",
                Scope::Session,
                passivating_factory(
                    move |_| {
                        Ok(Arc::new(Leaf {
                            label: Mutex::new("fresh".into()),
                            destroyed: on_create.clone(),
                        }) as Instance)
                    },
                    move |input, _ctx| {
                        let label: String = input.read("label")?;
                        Ok(Arc::new(Leaf {
                            label: Mutex::new(label),
                            destroyed: on_activate.clone(),
                        }) as Instance)
                    },
                ),
            )
            .build(),
        )
        .build()
        .unwrap()
}

fn wired_session(container: &Container, session: &str) -> Instance {
    open_session(container, session);
    let scopes = ActiveScopes::new().with_session(session);
    container.resolve(&scopes, &"holder".into()).unwrap();
    container
        .invoke(&scopes, &"leaf".into(), "rename", vec![json!("renamed")])
        .unwrap();
    container.resolve(&scopes, &"leaf".into()).unwrap()
}

fn assert_holder_uses_context_leaf(container: &Container, session: &str) -> Instance {
    let scopes = ActiveScopes::new().with_session(session);
    let holder = container.resolve(&scopes, &"holder".into()).unwrap();
    let leaf = container.resolve(&scopes, &"leaf".into()).unwrap();
    assert!(Arc::ptr_eq(&downcast::<Holder>(&holder).unwrap().leaf, &leaf));
    assert_eq!(call(container, session, "leaf", "label"), json!("renamed"));
    leaf
}

#[test]
fn restored_dependency_is_restored_into_the_new_context() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let node_a = wired_container(&destroyed);
    let failover_a = service(node_a.clone(), None);
    let session_a = MemorySession::new("s-1");
    wired_session(&node_a, "s-1");
    failover_a.session_is_idle(&session_a).unwrap();

    let node_b = wired_container(&destroyed);
    let failover_b = service(node_b.clone(), None);
    let session_b = session_a.replicate();

    assert_eq!(failover_b.restore_beans(&session_b).unwrap(), 2);
    assert_holder_uses_context_leaf(&node_b, "s-1");
}

#[test]
fn restore_over_live_session_rewires_and_tears_down_the_old_context() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let container = wired_container(&destroyed);
    let failover = service(container.clone(), None);
    let session = MemorySession::new("s-1");
    let old_leaf = wired_session(&container, "s-1");
    failover.session_is_idle(&session).unwrap();

    assert_eq!(failover.restore_beans(&session).unwrap(), 2);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);

    let new_leaf = assert_holder_uses_context_leaf(&container, "s-1");
    assert!(!Arc::ptr_eq(&old_leaf, &new_leaf));

    assert!(failover.session_destroyed("s-1"));
    assert_eq!(destroyed.load(Ordering::SeqCst), 2);
}

#[test]
fn destroyed_session_forgets_state() {
    let container = node_container();
    let failover = service(container.clone(), None);
    let session = MemorySession::new("s-1");
    open_session(&container, "s-1");
    failover.session_is_in_use(&session).unwrap();

    assert!(failover.session_destroyed("s-1"));
    assert_eq!(failover.session_state("s-1"), None);
    assert!(!failover.session_destroyed("s-1"));
}

// ── Resource delegation ──────────────────────────────────────────────────────

fn cart_descriptor(container: &Container) -> Arc<ComponentDescriptor> {
    container.descriptor(&"cart".into()).unwrap()
}

#[test]
fn without_handler_resources_are_not_handled() {
    let container = node_container();
    let failover = service(container.clone(), None);
    let descriptor = cart_descriptor(&container);
    let resource: Arc<dyn ResourceObject> = Arc::new(RemoteHandle { id: "h".into() });
    let payload = json!({ "handle": "h" });

    for mode in [SerializationMode::Failover, SerializationMode::Passivation] {
        let write = failover.handle_resource(
            &descriptor,
            ResourceCall::Write(&resource),
            StreamPair::output(StreamOrigin::Container),
            mode,
        );
        assert!(!write.is_handled());

        let read = failover.handle_resource(
            &descriptor,
            ResourceCall::Read {
                kind: "remote-handle",
                payload: &payload,
            },
            StreamPair::input(StreamOrigin::Container),
            mode,
        );
        assert!(!read.is_handled());
    }
}

#[test]
fn without_handler_restored_resources_are_absent() {
    let node_a = node_container();
    let failover_a = service(node_a.clone(), None);
    let session = MemorySession::new("s-1");
    open_session(&node_a, "s-1");
    serve(&node_a, "s-1", "apple");
    failover_a.session_is_idle(&session).unwrap();

    let node_b = node_container();
    let failover_b = service(node_b.clone(), Some(Arc::new(RemoteHandles::default())));
    failover_b.restore_beans(&session.replicate()).unwrap();

    assert_eq!(call(&node_b, "s-1", "cart", "remote"), Value::Null);
    assert_eq!(call(&node_b, "s-1", "cart", "items"), json!(["apple"]));
}

#[test]
fn foreign_streams_never_reach_the_handler() {
    let container = node_container();
    let handler = Arc::new(RemoteHandles::default());
    let failover = service(container.clone(), Some(handler.clone()));
    let descriptor = cart_descriptor(&container);
    let resource: Arc<dyn ResourceObject> = Arc::new(RemoteHandle { id: "h".into() });

    let outcome = failover.handle_resource(
        &descriptor,
        ResourceCall::Write(&resource),
        StreamPair::output(StreamOrigin::Foreign),
        SerializationMode::Failover,
    );
    assert!(!outcome.is_handled());

    let outcome = failover.handle_resource(
        &descriptor,
        ResourceCall::Write(&resource),
        StreamPair {
            input: Some(StreamOrigin::Foreign),
            output: Some(StreamOrigin::Container),
        },
        SerializationMode::Failover,
    );
    assert!(!outcome.is_handled());
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);

    let outcome = failover.handle_resource(
        &descriptor,
        ResourceCall::Write(&resource),
        StreamPair::output(StreamOrigin::Container),
        SerializationMode::Failover,
    );
    assert!(matches!(outcome, ResourceOutcome::Written(_)));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn handler_sees_the_serialization_mode() {
    let container = node_container();
    let handler = Arc::new(RemoteHandles::default());
    let failover = service(container.clone(), Some(handler.clone()));
    let session = MemorySession::new("s-1");
    open_session(&container, "s-1");
    serve(&container, "s-1", "apple");

    failover.session_is_idle(&session).unwrap();
    failover.session_will_passivate(&session).unwrap();
    assert_eq!(
        *handler.modes.lock(),
        vec![SerializationMode::Failover, SerializationMode::Passivation]
    );

    handler.modes.lock().clear();
    failover.restore_beans(&session).unwrap();
    assert_eq!(*handler.modes.lock(), vec![SerializationMode::Passivation]);
}

// ── Handler loading ──────────────────────────────────────────────────────────

fn registry(built: Arc<AtomicUsize>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register("remote-handles", move || {
        built.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(RemoteHandles::default()) as Arc<dyn ResourceSerializationHandler>)
    });
    registry.register("broken", || Err("backend unreachable".to_string()));
    registry
}

#[test]
fn configured_handler_is_loaded_when_enabled() {
    let built = Arc::new(AtomicUsize::new(0));
    let config = FailoverConfig {
        resource_serialization_handler: Some("remote-handles".into()),
        ..enabled()
    };
    let failover = FailoverService::new(node_container(), &config, &registry(built.clone()));

    assert!(failover.has_handler());
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[test]
fn handler_is_not_loaded_when_features_are_off() {
    let built = Arc::new(AtomicUsize::new(0));
    let config = FailoverConfig {
        resource_serialization_handler: Some("remote-handles".into()),
        ..FailoverConfig::default()
    };
    let failover = FailoverService::new(node_container(), &config, &registry(built.clone()));

    assert!(!failover.has_handler());
    assert_eq!(built.load(Ordering::SeqCst), 0);
}

#[test]
fn unloadable_handler_degrades_to_none() {
    for name in ["broken", "no-such-handler"] {
        let config = FailoverConfig {
            resource_serialization_handler: Some(name.into()),
            ..enabled()
        };
        let container = node_container();
        let failover = FailoverService::new(
            container.clone(),
            &config,
            &registry(Arc::new(AtomicUsize::new(0))),
        );
        assert!(!failover.has_handler());

        // The service still works, resources are simply not carried.
        let session = MemorySession::new("s-1");
        open_session(&container, "s-1");
        serve(&container, "s-1", "apple");
        failover.session_is_idle(&session).unwrap();
        assert!(failover.bag(&session).unwrap().is_some());
    }
}
