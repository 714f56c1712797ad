//! Session failover and passivation for the cask container.
//!
//! [`FailoverService`] snapshots a session's context into a [`FailoverBag`]
//! stored on the session itself, and rebuilds the context from it on this or
//! another node. Resource objects that cannot be written generically are
//! delegated to an optional [`ResourceSerializationHandler`].

pub mod bag;
pub mod config;
pub mod error;
pub mod handler;
pub mod node;
pub mod service;
pub mod session;
pub mod spool;
pub mod stream;

pub use bag::FailoverBag;
pub use config::{CaskConfig, FailoverConfig};
pub use error::FailoverError;
pub use handler::{
    HandlerRegistry, ResourceCall, ResourceOutcome, ResourceSerializationHandler,
    SerializationMode, StreamPair,
};
pub use node::NodeId;
pub use service::{BAG_ATTRIBUTE, FailoverService, SessionState};
pub use session::{MemorySession, SessionBoundary};
pub use spool::BagSpool;
pub use stream::{
    ContainerInputStream, ContainerOutputStream, FieldValue, InstanceRecord, JsonStreamFactory,
    StreamFactory,
};
