use core::fmt;

/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Why a single allocation attempt was abandoned.
///
/// These are expected, transient outcomes of the locked protocol. They never
/// cross the allocator boundary on their own; the last one observed is carried
/// by [`Error::AllocationFailure`] once every attempt has been spent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RetryReason {
    /// Another live session holds the lock key.
    LockContention,
    /// The available counter holds something that is not an integer.
    CounterUnreadable,
    /// The check-and-set write of the incremented counter was rejected.
    CounterCommitRejected,
    /// The create-only write of the client record was rejected and no
    /// assignment could be read back.
    RecordWriteRejected,
    /// The session expired and a replacement could not be created.
    SessionRenewalFailed,
    /// The client record exists but does not hold an integer. It is never
    /// overwritten, so no further attempt can succeed.
    RecordUnreadable,
    /// The available counter reached `u64::MAX`.
    CounterOverflow,
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::LockContention => "lock held by another session",
            Self::CounterUnreadable => "available counter is not an integer",
            Self::CounterCommitRejected => "counter commit rejected",
            Self::RecordWriteRejected => "client record write rejected",
            Self::SessionRenewalFailed => "session could not be renewed or replaced",
            Self::RecordUnreadable => "client record is not an integer",
            Self::CounterOverflow => "available counter exhausted",
        };
        f.write_str(reason)
    }
}

/// All errors surfaced by [`Allocator`](crate::Allocator).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The namespace name or the client identity is malformed. Not retried.
    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },

    /// The coordination service could not be used: the session could not be
    /// created, the agent could not be described, or the transport failed.
    #[error("coordination service unavailable: {context}")]
    CoordinationUnavailable { context: String },

    /// No identifier could be allocated right now. Safe to retry later.
    #[error("unable to allocate an id after {attempts} attempts: {reason}")]
    AllocationFailure { attempts: u32, reason: RetryReason },
}

impl Error {
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn unavailable(context: impl Into<String>) -> Self {
        Self::CoordinationUnavailable {
            context: context.into(),
        }
    }
}

/// The coordination service could not be reached, or answered with something
/// that could not be understood.
///
/// Rejections (a lock already held, a failed check-and-set) are *not* transport
/// errors; they are reported as values by the coordination traits.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        let context = match &err.source {
            Some(source) => format!("{}: {source}", err.message),
            None => err.message,
        };
        Self::CoordinationUnavailable { context }
    }
}
