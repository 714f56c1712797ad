use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::FailoverError;
use crate::handler::SerializationMode;
use crate::node::NodeId;

/// Serialized snapshot of one session context, held by copy.
///
/// Stored on the session under [`BAG_ATTRIBUTE`](crate::BAG_ATTRIBUTE) so the
/// session replication transport carries it along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverBag {
    pub origin_node: NodeId,
    pub session_id: String,
    pub passivated: bool,
    /// Codec that produced `payload`.
    pub codec: String,
    pub instances: usize,
    pub updated_at: DateTime<Utc>,
    /// Bookkeeping only; does not affect `payload` or `checksum`.
    pub last_access: DateTime<Utc>,
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
    /// SHA-256 hex of `payload`.
    pub checksum: String,
}

impl FailoverBag {
    pub fn new(
        origin_node: NodeId,
        session_id: impl Into<String>,
        codec: impl Into<String>,
        payload: Vec<u8>,
        instances: usize,
        mode: SerializationMode,
    ) -> Self {
        let now = Utc::now();
        Self {
            origin_node,
            session_id: session_id.into(),
            passivated: mode == SerializationMode::Passivation,
            codec: codec.into(),
            instances,
            updated_at: now,
            last_access: now,
            checksum: checksum(&payload),
            payload,
        }
    }

    /// Overwrite the snapshot in place, keeping the bag's identity.
    pub fn update(
        &mut self,
        origin_node: NodeId,
        payload: Vec<u8>,
        instances: usize,
        mode: SerializationMode,
    ) {
        self.origin_node = origin_node;
        self.passivated = mode == SerializationMode::Passivation;
        self.instances = instances;
        self.updated_at = Utc::now();
        self.checksum = checksum(&payload);
        self.payload = payload;
    }

    pub fn touch(&mut self) {
        self.last_access = Utc::now();
    }

    pub fn mode(&self) -> SerializationMode {
        if self.passivated {
            SerializationMode::Passivation
        } else {
            SerializationMode::Failover
        }
    }

    pub fn is_checksum_valid(&self) -> bool {
        checksum(&self.payload) == self.checksum
    }

    pub fn verify(&self) -> Result<(), FailoverError> {
        let actual = checksum(&self.payload);
        if actual != self.checksum {
            return Err(FailoverError::ChecksumMismatch {
                session: self.session_id.clone(),
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, FailoverError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self, FailoverError> {
        Ok(serde_json::from_str(content)?)
    }
}

fn checksum(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded).map_err(serde::de::Error::custom)
    }
}
