use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifetime boundary governing when a component instance is created and destroyed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// One instance per request, confined to the request's thread of control.
    Request,
    /// One instance per process.
    Application,
    /// One instance per session; shared by concurrent requests on that session.
    Session,
    /// A fresh instance for every injection point. Never stored in a context.
    Dependent,
    /// A named scope whose boundaries are driven by the host.
    Custom(String),
}

impl Scope {
    /// Normal scopes are backed by a context and can be reached through a client proxy.
    pub fn is_normal(&self) -> bool {
        !matches!(self, Scope::Dependent)
    }

    /// Whether contexts of this scope may be touched by more than one thread.
    pub fn is_shared(&self) -> bool {
        matches!(self, Scope::Application | Scope::Session | Scope::Custom(_))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Request => write!(f, "request"),
            Scope::Application => write!(f, "application"),
            Scope::Session => write!(f, "session"),
            Scope::Dependent => write!(f, "dependent"),
            Scope::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// Token identifying one concrete boundary of a scope (a request, a session, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundaryId(String);

const APPLICATION_BOUNDARY: &str = "application";

impl BoundaryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The single process-wide boundary used by [`Scope::Application`].
    pub fn application() -> Self {
        Self(APPLICATION_BOUNDARY.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BoundaryId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for BoundaryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The boundaries active for the current thread of control.
///
/// Hosts build one of these per request (request token, session token, any
/// custom scopes) and hand it to every resolve and invoke call. Application
/// scope is always active on its process-wide boundary unless overridden.
#[derive(Debug, Clone, Default)]
pub struct ActiveScopes {
    boundaries: HashMap<Scope, BoundaryId>,
}

impl ActiveScopes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, scope: Scope, boundary: impl Into<BoundaryId>) -> Self {
        self.activate(scope, boundary);
        self
    }

    pub fn with_request(self, boundary: impl Into<BoundaryId>) -> Self {
        self.with(Scope::Request, boundary)
    }

    pub fn with_session(self, boundary: impl Into<BoundaryId>) -> Self {
        self.with(Scope::Session, boundary)
    }

    pub fn activate(&mut self, scope: Scope, boundary: impl Into<BoundaryId>) {
        self.boundaries.insert(scope, boundary.into());
    }

    pub fn deactivate(&mut self, scope: &Scope) -> Option<BoundaryId> {
        self.boundaries.remove(scope)
    }

    /// Boundary currently active for `scope`, if any.
    pub fn boundary(&self, scope: &Scope) -> Option<BoundaryId> {
        match self.boundaries.get(scope) {
            Some(boundary) => Some(boundary.clone()),
            None if *scope == Scope::Application => Some(BoundaryId::application()),
            None => None,
        }
    }
}
