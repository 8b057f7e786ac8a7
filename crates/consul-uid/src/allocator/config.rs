use core::time::Duration;

use crate::{
    backoff::Backoff,
    model::{DEFAULT_LOCK_DELAY, DEFAULT_SESSION_TTL, SessionBehavior, SessionSpec},
    namespace::Namespace,
};

/// Number of locked attempts made before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Number of release writes tried per attempt before relying on session
/// expiry.
pub const DEFAULT_RELEASE_ATTEMPTS: u32 = 1;

/// Session parameters used for every session the allocator creates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    pub lock_delay: Duration,
    pub ttl: Option<Duration>,
    pub node: Option<String>,
    pub checks: Vec<String>,
    pub behavior: SessionBehavior,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            lock_delay: DEFAULT_LOCK_DELAY,
            ttl: Some(DEFAULT_SESSION_TTL),
            node: None,
            checks: Vec::new(),
            behavior: SessionBehavior::Release,
        }
    }
}

impl SessionSettings {
    pub(crate) fn spec_for(&self, namespace: &Namespace, client_id: &str) -> SessionSpec {
        let spec = SessionSpec::new(format!("{}/{client_id}", namespace.prefix()))
            .with_lock_delay(self.lock_delay)
            .with_checks(self.checks.clone())
            .with_behavior(self.behavior)
            .with_ttl(self.ttl);
        match &self.node {
            Some(node) => spec.with_node(node.clone()),
            None => spec,
        }
    }
}

/// Configuration consumed by [`Allocator`](crate::Allocator).
///
/// Only `name` is required; every other field has a default matching the base
/// protocol (ten attempts, no backoff, a single release write, and the session
/// destroyed once the call finishes).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Name of the allocation domain; becomes `.extensions/uid/<name>`.
    pub name: String,
    /// Explicit client identity. When unset or blank, the agent's member name
    /// is used.
    pub client_id: Option<String>,
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub release_attempts: u32,
    /// Destroy the session when `get` returns instead of waiting for its TTL.
    pub destroy_session: bool,
    pub session: SessionSettings,
}

impl AllocatorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client_id: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::None,
            release_attempts: DEFAULT_RELEASE_ATTEMPTS,
            destroy_session: true,
            session: SessionSettings::default(),
        }
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_release_attempts(mut self, release_attempts: u32) -> Self {
        self.release_attempts = release_attempts;
        self
    }

    #[must_use]
    pub fn with_destroy_session(mut self, destroy_session: bool) -> Self {
        self.destroy_session = destroy_session;
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }
}
