//! Scripted two-node failover: node A serves and passivates a session, node B
//! picks the spooled bag up and carries on.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context as _, Result, bail};
use cask_core::{ActiveScopes, Container, Scope};
use cask_failover::{
    BAG_ATTRIBUTE, BagSpool, FailoverConfig, FailoverService, MemorySession, SessionBoundary,
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::components::{build_container, handler_registry};

pub const DEMO_SESSION: &str = "demo-session";

#[derive(Debug, Serialize)]
pub struct DemoReport {
    pub session: String,
    pub node_a: String,
    pub node_b: String,
    pub spooled_to: String,
    pub restored_instances: usize,
    pub items: Value,
    pub count: Value,
    pub catalog: Value,
    pub remote: Value,
    pub audited_calls: usize,
}

pub async fn run(config: &FailoverConfig, spool: &BagSpool) -> Result<DemoReport> {
    if !config.support_passivation {
        bail!("the demo passivates a session; set support_passivation = true in [failover]");
    }
    spool.init().await?;
    let handlers = handler_registry();

    // Node A
    let audited_a = Arc::new(AtomicUsize::new(0));
    let node_a = build_container(audited_a.clone())?;
    let failover_a = FailoverService::new(node_a.clone(), config, &handlers);
    let session_a = MemorySession::new(DEMO_SESSION);

    node_a.contexts().init_context(Scope::Session, DEMO_SESSION)?;
    request(&node_a, "r-a1", "cart", "add", vec![json!("espresso beans")])?;
    request(&node_a, "r-a1", "counter", "increment", vec![])?;
    request(&node_a, "r-a2", "cart", "add", vec![json!("milk frother")])?;
    request(&node_a, "r-a2", "counter", "increment", vec![])?;

    failover_a.session_is_idle(&session_a)?;
    failover_a.session_will_passivate(&session_a)?;
    let bag = failover_a
        .bag(&session_a)?
        .context("passivation produced no bag")?;
    let spooled_to = spool.store(&bag).await?;
    failover_a.session_destroyed(DEMO_SESSION);
    node_a.shutdown();

    // Node B
    let audited_b = Arc::new(AtomicUsize::new(0));
    let node_b = build_container(audited_b.clone())?;
    let failover_b = FailoverService::new(node_b.clone(), config, &handlers);
    let session_b = MemorySession::new(DEMO_SESSION);

    let bag = spool.load(DEMO_SESSION).await?;
    session_b.set_attribute(BAG_ATTRIBUTE, serde_json::to_value(&bag)?);
    let restored_instances = failover_b.restore_beans(&session_b)?;
    spool.remove(DEMO_SESSION).await?;

    request(&node_b, "r-b1", "cart", "add", vec![json!("grinder")])?;
    request(&node_b, "r-b1", "counter", "increment", vec![])?;

    let report = DemoReport {
        session: DEMO_SESSION.to_string(),
        node_a: failover_a.node_id().to_string(),
        node_b: failover_b.node_id().to_string(),
        spooled_to: spooled_to.display().to_string(),
        restored_instances,
        items: request(&node_b, "r-b2", "cart", "items", vec![])?,
        count: request(&node_b, "r-b2", "counter", "count", vec![])?,
        catalog: request(&node_b, "r-b2", "cart", "catalog", vec![])?,
        remote: request(&node_b, "r-b2", "cart", "remote", vec![])?,
        audited_calls: audited_a.load(Ordering::SeqCst) + audited_b.load(Ordering::SeqCst),
    };

    failover_b.session_destroyed(DEMO_SESSION);
    node_b.shutdown();
    Ok(report)
}

/// One request against the demo session, in its own request context.
fn request(
    container: &Container,
    request_id: &str,
    component: &str,
    method: &str,
    args: Vec<Value>,
) -> Result<Value> {
    let scopes = ActiveScopes::new()
        .with_session(DEMO_SESSION)
        .with_request(request_id);
    let started = container
        .contexts()
        .init_context(Scope::Request, request_id)
        .is_ok();

    let result = container.invoke(&scopes, &component.into(), method, args);

    if started {
        container
            .contexts()
            .destroy_context(&Scope::Request, &request_id.into());
    }
    Ok(result?)
}
