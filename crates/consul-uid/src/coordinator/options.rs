use core::time::Duration;

use crate::model::SessionId;

/// Options for [`KvStore::get`](crate::KvStore::get).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Force a linearizable read through the leader.
    pub consistent: bool,
    /// Block until the key's modify index exceeds this value.
    pub index: Option<u64>,
    /// Upper bound on how long a blocking read may wait.
    pub wait: Option<Duration>,
}

impl ReadOptions {
    pub fn consistent() -> Self {
        Self {
            consistent: true,
            ..Self::default()
        }
    }

    /// A blocking read that returns once the key changes past `index`.
    pub fn blocking(index: u64, wait: Duration) -> Self {
        Self {
            index: Some(index),
            wait: Some(wait),
            ..Self::default()
        }
    }
}

/// Options for [`KvStore::put`](crate::KvStore::put).
///
/// `acquire` and `release` turn the write into a lock operation performed
/// atomically with the value update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub flags: Option<u64>,
    /// Check-and-set: `0` only creates the key, any other value only
    /// overwrites that exact modify index.
    pub cas: Option<u64>,
    pub acquire: Option<SessionId>,
    pub release: Option<SessionId>,
}

impl WriteOptions {
    pub fn cas(index: u64) -> Self {
        Self {
            cas: Some(index),
            ..Self::default()
        }
    }

    pub fn acquire(session: &SessionId) -> Self {
        Self {
            acquire: Some(session.clone()),
            ..Self::default()
        }
    }

    pub fn release(session: &SessionId) -> Self {
        Self {
            release: Some(session.clone()),
            ..Self::default()
        }
    }
}

/// Options for [`KvStore::delete`](crate::KvStore::delete).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Treat the key as a prefix and delete everything below it.
    pub recurse: bool,
    pub cas: Option<u64>,
}

/// Result of a write the service answered.
///
/// A rejected write is not an error: the caller decides whether to retry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutOutcome {
    pub success: bool,
    /// Raw response body, kept for diagnostics.
    pub body: String,
}

impl PutOutcome {
    pub fn accepted() -> Self {
        Self {
            success: true,
            body: String::from("true"),
        }
    }

    pub fn rejected(body: impl Into<String>) -> Self {
        Self {
            success: false,
            body: body.into(),
        }
    }
}
