use std::path::Path;

use anyhow::Result;
use cask_failover::{BagSpool, FailoverBag, JsonStreamFactory, StreamFactory};
use serde_json::{Value, json};

/// Summarize a bag file without restoring it.
pub async fn run(path: &Path) -> Result<Value> {
    let bag = BagSpool::read_file(path).await?;
    Ok(summarize(&bag))
}

pub fn summarize(bag: &FailoverBag) -> Value {
    let checksum_valid = bag.is_checksum_valid();
    let codec = JsonStreamFactory;
    let components = if checksum_valid && bag.codec == codec.codec() {
        codec.decode(&bag.payload).ok().map(|records| {
            records
                .iter()
                .map(|r| {
                    json!({
                        "component": r.component,
                        "fields": r.fields.keys().collect::<Vec<_>>(),
                        "dropped_resources": r.dropped_resources().collect::<Vec<_>>(),
                    })
                })
                .collect::<Vec<_>>()
        })
    } else {
        None
    };

    json!({
        "session": bag.session_id,
        "origin_node": bag.origin_node,
        "origin_started_at_millis": bag.origin_node.started_at_millis(),
        "passivated": bag.passivated,
        "codec": bag.codec,
        "instances": bag.instances,
        "updated_at": bag.updated_at,
        "last_access": bag.last_access,
        "payload_bytes": bag.payload.len(),
        "checksum": bag.checksum,
        "checksum_valid": checksum_valid,
        "components": components,
    })
}
