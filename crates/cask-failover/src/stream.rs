//! Container-provided object streams and the bag payload codec.
//!
//! Each component writes its state into a [`ContainerOutputStream`], which
//! produces one [`InstanceRecord`]. Proxies become references to their
//! component id, never copies of the instance behind them. Resource objects
//! go through the service's resource handler. A [`StreamFactory`] turns the
//! record list into bag payload bytes and back.

use std::collections::BTreeMap;
use std::sync::Arc;

use cask_core::{
    ClientProxy, ComponentDescriptor, ComponentId, ObjectInput, ObjectOutput, ResourceObject,
    StateError, StreamOrigin,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FailoverError;
use crate::handler::{ResourceCall, ResourceOutcome, SerializationMode, StreamPair};
use crate::service::FailoverService;

/// One serialized field of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldValue {
    Value { value: Value },
    /// Re-resolved against the restoring node's contexts.
    Proxy { component: ComponentId },
    /// `payload` is `None` when no handler carried the resource across.
    Resource {
        resource: String,
        payload: Option<Value>,
    },
}

/// Serialized state of one live instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub component: ComponentId,
    pub fields: BTreeMap<String, FieldValue>,
}

impl InstanceRecord {
    /// Resources that were dropped on the way out.
    pub fn dropped_resources(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|(name, field)| match field {
            FieldValue::Resource { payload: None, .. } => Some(name.as_str()),
            _ => None,
        })
    }
}

pub struct ContainerOutputStream<'a> {
    service: &'a FailoverService,
    descriptor: &'a ComponentDescriptor,
    mode: SerializationMode,
    fields: BTreeMap<String, FieldValue>,
}

impl<'a> ContainerOutputStream<'a> {
    pub(crate) fn new(
        service: &'a FailoverService,
        descriptor: &'a ComponentDescriptor,
        mode: SerializationMode,
    ) -> Self {
        Self {
            service,
            descriptor,
            mode,
            fields: BTreeMap::new(),
        }
    }

    /// Close the stream, yielding everything written to it.
    pub fn finish(self) -> InstanceRecord {
        InstanceRecord {
            component: self.descriptor.id().clone(),
            fields: self.fields,
        }
    }
}

impl ObjectOutput for ContainerOutputStream<'_> {
    fn origin(&self) -> StreamOrigin {
        StreamOrigin::Container
    }

    fn write_value(&mut self, field: &str, value: Value) -> Result<(), StateError> {
        self.fields
            .insert(field.to_string(), FieldValue::Value { value });
        Ok(())
    }

    fn write_proxy(&mut self, field: &str, proxy: &ClientProxy) -> Result<(), StateError> {
        self.fields.insert(
            field.to_string(),
            FieldValue::Proxy {
                component: proxy.component().clone(),
            },
        );
        Ok(())
    }

    fn write_resource(
        &mut self,
        field: &str,
        resource: &Arc<dyn ResourceObject>,
    ) -> Result<(), StateError> {
        let outcome = self.service.handle_resource(
            self.descriptor,
            ResourceCall::Write(resource),
            StreamPair::output(self.origin()),
            self.mode,
        );
        let payload = match outcome {
            ResourceOutcome::Written(payload) => Some(payload),
            _ => {
                tracing::warn!(
                    component = %self.descriptor.id(),
                    field,
                    resource = resource.kind(),
                    "Resource not carried across, it must be re-acquired after restore"
                );
                None
            }
        };
        self.fields.insert(
            field.to_string(),
            FieldValue::Resource {
                resource: resource.kind().to_string(),
                payload,
            },
        );
        Ok(())
    }
}

pub struct ContainerInputStream<'a> {
    service: &'a FailoverService,
    descriptor: &'a ComponentDescriptor,
    mode: SerializationMode,
    fields: BTreeMap<String, FieldValue>,
}

impl<'a> ContainerInputStream<'a> {
    pub(crate) fn new(
        service: &'a FailoverService,
        descriptor: &'a ComponentDescriptor,
        mode: SerializationMode,
        record: InstanceRecord,
    ) -> Self {
        Self {
            service,
            descriptor,
            mode,
            fields: record.fields,
        }
    }

    /// Close the stream. Fields the component never read are reported.
    pub fn finish(self) -> Vec<String> {
        self.fields.into_keys().collect()
    }

    fn take(&mut self, field: &str) -> Result<FieldValue, StateError> {
        self.fields
            .remove(field)
            .ok_or_else(|| StateError::MissingField(field.to_string()))
    }
}

impl ObjectInput for ContainerInputStream<'_> {
    fn origin(&self) -> StreamOrigin {
        StreamOrigin::Container
    }

    fn read_value(&mut self, field: &str) -> Result<Value, StateError> {
        match self.take(field)? {
            FieldValue::Value { value } => Ok(value),
            _ => Err(StateError::WrongKind {
                field: field.to_string(),
                expected: "value",
            }),
        }
    }

    fn read_proxy(&mut self, field: &str) -> Result<ClientProxy, StateError> {
        match self.take(field)? {
            FieldValue::Proxy { component } => Ok(ClientProxy::from_reference(component)),
            _ => Err(StateError::WrongKind {
                field: field.to_string(),
                expected: "proxy",
            }),
        }
    }

    fn read_resource(&mut self, field: &str) -> Result<Option<Arc<dyn ResourceObject>>, StateError> {
        let (kind, payload) = match self.take(field)? {
            FieldValue::Resource { resource, payload } => (resource, payload),
            _ => {
                return Err(StateError::WrongKind {
                    field: field.to_string(),
                    expected: "resource",
                });
            }
        };
        let Some(payload) = payload else {
            return Ok(None);
        };

        let outcome = self.service.handle_resource(
            self.descriptor,
            ResourceCall::Read {
                kind: &kind,
                payload: &payload,
            },
            StreamPair::input(self.origin()),
            self.mode,
        );
        match outcome {
            ResourceOutcome::Read(resource) => Ok(Some(resource)),
            _ => {
                tracing::warn!(
                    component = %self.descriptor.id(),
                    field,
                    resource = %kind,
                    "No handler restored resource, it must be re-acquired"
                );
                Ok(None)
            }
        }
    }
}

/// Encodes the record list of one bag. Proxies must stay references.
pub trait StreamFactory: Send + Sync {
    /// Stored in each bag so a node never decodes a payload it did not write.
    fn codec(&self) -> &str;

    fn encode(&self, records: &[InstanceRecord]) -> Result<Vec<u8>, FailoverError>;

    fn decode(&self, payload: &[u8]) -> Result<Vec<InstanceRecord>, FailoverError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonStreamFactory;

impl StreamFactory for JsonStreamFactory {
    fn codec(&self) -> &str {
        "json/1"
    }

    fn encode(&self, records: &[InstanceRecord]) -> Result<Vec<u8>, FailoverError> {
        Ok(serde_json::to_vec(records)?)
    }

    fn decode(&self, payload: &[u8]) -> Result<Vec<InstanceRecord>, FailoverError> {
        Ok(serde_json::from_slice(payload)?)
    }
}
