use cask_core::{ComponentId, ContainerError, StateError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FailoverError {
    #[error("resource serialization handler {handler} could not be loaded: {reason}")]
    HandlerInstantiation { handler: String, reason: String },

    #[error("no active session context for {0}")]
    NoSessionContext(String),

    #[error("no failover bag for session {0}")]
    BagNotFound(String),

    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("bag for session {session} failed its checksum (expected {expected}, got {actual})")]
    ChecksumMismatch {
        session: String,
        expected: String,
        actual: String,
    },

    #[error("bag belongs to session {found}, not {expected}")]
    SessionMismatch { expected: String, found: String },

    #[error("bag was encoded with {found}, this node decodes {expected}")]
    CodecMismatch { expected: String, found: String },

    #[error("failed to serialize state of {component}: {source}")]
    Serialization {
        component: ComponentId,
        #[source]
        source: StateError,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
