//! Components, interceptor, and resource handler wired up by the demo.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use cask_core::{
    BindingLevel, CallEnv, ClientProxy, ComponentDescriptor, Container, ContainerError, Instance,
    Interceptor, InvocationContext, InvocationError, Managed, ObjectOutput, ResourceObject, Scope,
    StateError, factory_fn, passivating_factory, resource_downcast,
};
use cask_failover::{
    HandlerRegistry, ResourceCall, ResourceOutcome, ResourceSerializationHandler,
    SerializationMode,
};
use parking_lot::Mutex;
use serde_json::{Value, json};

pub const REMOTE_HANDLES: &str = "remote-handles";

/// Handle to an object living in another process. Only meaningful to the
/// handler that knows how to reconnect it.
#[derive(Debug)]
pub struct RemoteHandle {
    pub endpoint: String,
    pub handle: u64,
}

impl ResourceObject for RemoteHandle {
    fn kind(&self) -> &str {
        "remote-handle"
    }
}

pub struct RemoteHandleHandler;

impl ResourceSerializationHandler for RemoteHandleHandler {
    fn handle_resource(
        &self,
        component: &ComponentDescriptor,
        call: ResourceCall<'_>,
        mode: SerializationMode,
    ) -> ResourceOutcome {
        match call {
            ResourceCall::Write(resource) => {
                let Some(remote) = resource_downcast::<RemoteHandle>(resource) else {
                    return ResourceOutcome::NotHandled;
                };
                tracing::debug!(component = %component.id(), ?mode, handle = remote.handle, "Detaching remote handle");
                ResourceOutcome::Written(json!({
                    "endpoint": remote.endpoint,
                    "handle": remote.handle,
                }))
            }
            ResourceCall::Read { kind, payload } if kind == "remote-handle" => {
                let (Some(endpoint), Some(handle)) =
                    (payload["endpoint"].as_str(), payload["handle"].as_u64())
                else {
                    return ResourceOutcome::NotHandled;
                };
                tracing::debug!(component = %component.id(), ?mode, handle, "Reattaching remote handle");
                ResourceOutcome::Read(Arc::new(RemoteHandle {
                    endpoint: endpoint.to_string(),
                    handle,
                }))
            }
            ResourceCall::Read { .. } => ResourceOutcome::NotHandled,
        }
    }
}

pub fn handler_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(REMOTE_HANDLES, || {
        Ok(Arc::new(RemoteHandleHandler) as Arc<dyn ResourceSerializationHandler>)
    });
    registry
}

/// Logs every call it wraps and counts them.
pub struct Audit {
    calls: Arc<AtomicUsize>,
}

impl Interceptor for Audit {
    fn around_invoke(&self, ctx: &mut InvocationContext<'_>) -> Result<Value, InvocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = ctx.proceed();
        tracing::info!(
            component = %ctx.component(),
            method = ctx.method(),
            ok = result.is_ok(),
            "Audited call"
        );
        result
    }
}

pub struct Catalog;

impl Managed for Catalog {
    fn call(&self, method: &str, _args: &[Value], _env: &CallEnv<'_>) -> Result<Value, InvocationError> {
        match method {
            "name" => Ok(json!("cask demo catalog")),
            _ => Err(unknown(method)),
        }
    }
}

pub struct Cart {
    items: Mutex<Vec<String>>,
    catalog: ClientProxy,
    remote: Option<Arc<dyn ResourceObject>>,
}

impl Managed for Cart {
    fn call(&self, method: &str, args: &[Value], env: &CallEnv<'_>) -> Result<Value, InvocationError> {
        match method {
            "add" => {
                let item = args.first().and_then(Value::as_str).ok_or_else(|| {
                    InvocationError::InvalidArguments {
                        method: method.to_string(),
                        reason: "expected an item name".into(),
                    }
                })?;
                self.items.lock().push(item.to_string());
                Ok(json!(self.items.lock().len()))
            }
            "items" => Ok(json!(*self.items.lock())),
            "catalog" => self.catalog.invoke(env, "name", vec![]),
            "remote" => Ok(self
                .remote
                .as_ref()
                .and_then(|r| resource_downcast::<RemoteHandle>(r))
                .map_or(Value::Null, |r| json!(format!("{}#{}", r.endpoint, r.handle)))),
            _ => Err(unknown(method)),
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

pub struct Counter {
    count: AtomicU64,
}

impl Managed for Counter {
    fn call(&self, method: &str, _args: &[Value], _env: &CallEnv<'_>) -> Result<Value, InvocationError> {
        match method {
            "increment" => Ok(json!(self.count.fetch_add(1, Ordering::SeqCst) + 1)),
            "count" => Ok(json!(self.count.load(Ordering::SeqCst))),
            _ => Err(unknown(method)),
        }
    }

    fn passivate(&self, out: &mut dyn ObjectOutput) -> Result<(), StateError> {
        out.write("count", &self.count.load(Ordering::SeqCst))
    }
}

fn unknown(method: &str) -> InvocationError {
    InvocationError::application(format!("no method {method}"))
}

/// The container one demo node runs. `audited` counts calls seen by the audit interceptor.
pub fn build_container(audited: Arc<AtomicUsize>) -> Result<Arc<Container>, ContainerError> {
    Container::builder()
        .interceptor("audit", move || {
            Box::new(Audit {
                calls: audited.clone(),
            })
        })
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
                                endpoint: "inventory.internal:7000".into(),
                                handle: 42,
                            })),
                        }) as Instance)
                    },
                    |input, _ctx| {
                        Ok(Arc::new(Cart {
                            items: Mutex::new(input.read("items")?),
                            catalog: input.read_proxy("catalog")?,
                            remote: input.read_resource("remote")?,
                        }) as Instance)
                    },
                ),
            )
            .class_level(BindingLevel::new("Cart").intercepted_by(["audit"]))
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
                        Ok(Arc::new(Counter {
                            count: AtomicU64::new(input.read("count")?),
                        }) as Instance)
                    },
                ),
            )
            .method(
                "count",
                BindingLevel::new("Counter::count").excluding_class_interceptors(),
            )
            .class_level(BindingLevel::new("Counter").intercepted_by(["audit"]))
            .build(),
        )
        .build()
}
