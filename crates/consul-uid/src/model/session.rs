use core::{fmt, time::Duration};

/// Default lock-delay window applied by the coordination service after a
/// session holding a lock is invalidated.
pub const DEFAULT_LOCK_DELAY: Duration = Duration::from_secs(15);

/// Default session TTL. The allocator renews before every attempt, so this
/// only needs to outlive a single attempt.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30);

/// Identifier assigned to a session by the coordination service.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// What the coordination service does with the keys a session holds once the
/// session is invalidated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionBehavior {
    /// Release every lock the session holds.
    #[default]
    Release,
    /// Delete every key the session holds.
    Delete,
}

impl SessionBehavior {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for SessionBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The client-writable description of a session to create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSpec {
    pub name: String,
    pub lock_delay: Duration,
    /// Node the session is bound to; `None` lets the agent use its own node.
    pub node: Option<String>,
    /// Health checks whose failure invalidates the session. Empty keeps the
    /// service default.
    pub checks: Vec<String>,
    pub behavior: SessionBehavior,
    /// Lease length. `None` creates a session that only health checks can
    /// invalidate.
    pub ttl: Option<Duration>,
}

impl SessionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lock_delay: DEFAULT_LOCK_DELAY,
            node: None,
            checks: Vec::new(),
            behavior: SessionBehavior::Release,
            ttl: Some(DEFAULT_SESSION_TTL),
        }
    }

    #[must_use]
    pub fn with_lock_delay(mut self, lock_delay: Duration) -> Self {
        self.lock_delay = lock_delay;
        self
    }

    #[must_use]
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    #[must_use]
    pub fn with_checks(mut self, checks: Vec<String>) -> Self {
        self.checks = checks;
        self
    }

    #[must_use]
    pub fn with_behavior(mut self, behavior: SessionBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }
}

/// A session as reported back by the coordination service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub spec: SessionSpec,
    pub create_index: u64,
}
