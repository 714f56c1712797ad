//! Object streams components use to write and read their own state.
//!
//! The container supplies proxy-aware implementations during failover and
//! passivation; hosts may supply their own (reported as [`StreamOrigin::Foreign`]).

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::component::AsAny;
use crate::error::StateError;
use crate::proxy::ClientProxy;

/// Who produced a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOrigin {
    /// Container-provided, proxy-aware stream.
    Container,
    /// Any other implementation.
    Foreign,
}

/// An opaque value that cannot be serialized generically (remote handles,
/// native resources). Its (de)serialization is delegated to a handler.
pub trait ResourceObject: AsAny + fmt::Debug + Send + Sync {
    /// Short name of the resource type, used by handlers to decide whether they own it.
    fn kind(&self) -> &str;
}

pub trait ObjectOutput {
    fn origin(&self) -> StreamOrigin;

    fn write_value(&mut self, field: &str, value: Value) -> Result<(), StateError>;

    /// Write a client proxy as a re-resolvable reference, never as a copy of its target.
    fn write_proxy(&mut self, field: &str, proxy: &ClientProxy) -> Result<(), StateError>;

    fn write_resource(
        &mut self,
        field: &str,
        resource: &Arc<dyn ResourceObject>,
    ) -> Result<(), StateError>;
}

pub trait ObjectInput {
    fn origin(&self) -> StreamOrigin;

    fn read_value(&mut self, field: &str) -> Result<Value, StateError>;

    fn read_proxy(&mut self, field: &str) -> Result<ClientProxy, StateError>;

    /// `None` when the resource could not be carried across and must be re-acquired.
    fn read_resource(&mut self, field: &str) -> Result<Option<Arc<dyn ResourceObject>>, StateError>;
}

impl dyn ObjectOutput + '_ {
    pub fn write<T: Serialize + ?Sized>(&mut self, field: &str, value: &T) -> Result<(), StateError> {
        let value = serde_json::to_value(value)?;
        self.write_value(field, value)
    }
}

impl dyn ObjectInput + '_ {
    pub fn read<T: DeserializeOwned>(&mut self, field: &str) -> Result<T, StateError> {
        let value = self.read_value(field)?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Downcast a resource to its concrete type.
pub fn resource_downcast<T: ResourceObject>(resource: &Arc<dyn ResourceObject>) -> Option<&T> {
    <dyn ResourceObject as AsAny>::as_any(resource.as_ref()).downcast_ref::<T>()
}
