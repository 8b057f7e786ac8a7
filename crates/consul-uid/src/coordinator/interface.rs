use std::sync::Arc;

use crate::{
    coordinator::{DeleteOptions, PutOutcome, ReadOptions, WriteOptions},
    error::TransportError,
    model::{AgentDescriptor, KeyValue, SessionId, SessionInfo, SessionSpec},
};

/// Namespaced key-value access with optional session-lock semantics.
pub trait KvStore {
    /// Reads `key`, returning `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the service cannot be reached.
    fn get(&self, key: &str, opts: &ReadOptions) -> Result<Option<KeyValue>, TransportError>;

    /// Writes `value` at `key`.
    ///
    /// A write the service refuses (lock held elsewhere, failed check-and-set)
    /// comes back as `Ok` with [`PutOutcome::success`] unset.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the service cannot be reached.
    fn put(&self, key: &str, value: &[u8], opts: &WriteOptions)
    -> Result<PutOutcome, TransportError>;

    /// Deletes `key` (or everything under it with `recurse`). Returns whether
    /// the service applied the delete.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the service cannot be reached.
    fn delete(&self, key: &str, opts: &DeleteOptions) -> Result<bool, TransportError>;
}

/// Session lifecycle.
pub trait SessionClient {
    /// Creates a session, returning `None` if the service refused it.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the service cannot be reached.
    fn create(&self, spec: &SessionSpec) -> Result<Option<SessionId>, TransportError>;

    /// Extends the lease of a TTL session. `false` means the session no longer
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the service cannot be reached.
    fn renew(&self, id: &SessionId) -> Result<bool, TransportError>;

    /// Invalidates the session, applying its behavior to the keys it holds.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the service cannot be reached.
    fn destroy(&self, id: &SessionId) -> Result<bool, TransportError>;

    /// Looks a session up.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the service cannot be reached.
    fn info(&self, id: &SessionId) -> Result<Option<SessionInfo>, TransportError>;
}

/// Introspection of the agent the process is attached to.
pub trait AgentClient {
    /// Describes the local agent, or `None` if it would not say.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the agent cannot be reached.
    fn describe_agent(&self) -> Result<Option<AgentDescriptor>, TransportError>;
}

/// Everything the allocator needs from a coordination service.
///
/// Implemented automatically for any type providing all three capability
/// groups.
pub trait Coordinator: KvStore + SessionClient + AgentClient {}

impl<T> Coordinator for T where T: KvStore + SessionClient + AgentClient + ?Sized {}

impl<T: KvStore + ?Sized> KvStore for &T {
    fn get(&self, key: &str, opts: &ReadOptions) -> Result<Option<KeyValue>, TransportError> {
        (**self).get(key, opts)
    }

    fn put(
        &self,
        key: &str,
        value: &[u8],
        opts: &WriteOptions,
    ) -> Result<PutOutcome, TransportError> {
        (**self).put(key, value, opts)
    }

    fn delete(&self, key: &str, opts: &DeleteOptions) -> Result<bool, TransportError> {
        (**self).delete(key, opts)
    }
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &str, opts: &ReadOptions) -> Result<Option<KeyValue>, TransportError> {
        (**self).get(key, opts)
    }

    fn put(
        &self,
        key: &str,
        value: &[u8],
        opts: &WriteOptions,
    ) -> Result<PutOutcome, TransportError> {
        (**self).put(key, value, opts)
    }

    fn delete(&self, key: &str, opts: &DeleteOptions) -> Result<bool, TransportError> {
        (**self).delete(key, opts)
    }
}

impl<T: SessionClient + ?Sized> SessionClient for &T {
    fn create(&self, spec: &SessionSpec) -> Result<Option<SessionId>, TransportError> {
        (**self).create(spec)
    }

    fn renew(&self, id: &SessionId) -> Result<bool, TransportError> {
        (**self).renew(id)
    }

    fn destroy(&self, id: &SessionId) -> Result<bool, TransportError> {
        (**self).destroy(id)
    }

    fn info(&self, id: &SessionId) -> Result<Option<SessionInfo>, TransportError> {
        (**self).info(id)
    }
}

impl<T: SessionClient + ?Sized> SessionClient for Arc<T> {
    fn create(&self, spec: &SessionSpec) -> Result<Option<SessionId>, TransportError> {
        (**self).create(spec)
    }

    fn renew(&self, id: &SessionId) -> Result<bool, TransportError> {
        (**self).renew(id)
    }

    fn destroy(&self, id: &SessionId) -> Result<bool, TransportError> {
        (**self).destroy(id)
    }

    fn info(&self, id: &SessionId) -> Result<Option<SessionInfo>, TransportError> {
        (**self).info(id)
    }
}

impl<T: AgentClient + ?Sized> AgentClient for &T {
    fn describe_agent(&self) -> Result<Option<AgentDescriptor>, TransportError> {
        (**self).describe_agent()
    }
}

impl<T: AgentClient + ?Sized> AgentClient for Arc<T> {
    fn describe_agent(&self) -> Result<Option<AgentDescriptor>, TransportError> {
        (**self).describe_agent()
    }
}
