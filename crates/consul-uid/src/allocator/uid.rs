#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    allocator::{AllocatorConfig, lease::Lease},
    backoff::{SleepProvider, ThreadSleep},
    coordinator::{Coordinator, ReadOptions, WriteOptions},
    error::{Error, Result, RetryReason},
    identity::IdentityResolver,
    model::SessionId,
    namespace::Namespace,
};

/// Outcome of one pass through the locked protocol.
enum Step {
    Allocated(u64),
    Retry(RetryReason),
    Abort(RetryReason),
}

/// What the client record currently says.
enum Record {
    Assigned(u64),
    /// Nothing assigned yet; `cas` is the index a create must present (`0`
    /// when the key does not exist, the current index for an empty value).
    Vacant {
        cas: u64,
    },
    Corrupt,
}

/// Hands out one stable, namespace-unique integer per client identity.
///
/// Every call to [`Allocator::get`] first looks for an existing assignment and
/// returns it without touching the lock. Otherwise it opens a session and runs
/// a bounded loop of:
///
/// 1. renew the session,
/// 2. read the available counter,
/// 3. acquire the lock key,
/// 4. check-and-set the counter to `value + 1`,
/// 5. release the lock,
/// 6. create the client record with `value`.
///
/// Contention and rejected writes simply consume an attempt. The lock key is
/// the only serialization point; the allocator holds no local mutex and keeps
/// nothing but the memoised identity between calls.
///
/// ## See Also
/// - [`MemoryCoordinator`] for an in-process coordination service
///
/// [`MemoryCoordinator`]: crate::MemoryCoordinator
pub struct Allocator<C, S = ThreadSleep> {
    coordinator: C,
    sleep: S,
    namespace: Namespace,
    identity: IdentityResolver,
    config: AllocatorConfig,
}

impl<C> Allocator<C, ThreadSleep>
where
    C: Coordinator,
{
    /// Creates an allocator that sleeps the calling thread between attempts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the namespace name or an explicit
    /// client id is malformed, or if `max_attempts` / `release_attempts` is
    /// zero.
    pub fn new(coordinator: C, config: AllocatorConfig) -> Result<Self> {
        Self::with_sleep(coordinator, config, ThreadSleep)
    }
}

impl<C, S> Allocator<C, S> {
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &C {
        &self.coordinator
    }
}

impl<C, S> Allocator<C, S>
where
    C: Coordinator,
    S: SleepProvider,
{
    /// Creates an allocator with a custom [`SleepProvider`].
    ///
    /// # Errors
    ///
    /// See [`Allocator::new`].
    pub fn with_sleep(coordinator: C, config: AllocatorConfig, sleep: S) -> Result<Self> {
        let namespace = Namespace::new(&config.name)?;
        if config.max_attempts == 0 {
            return Err(Error::configuration("max_attempts must be at least 1"));
        }
        if config.release_attempts == 0 {
            return Err(Error::configuration("release_attempts must be at least 1"));
        }
        let identity = IdentityResolver::new(config.client_id.as_deref())?;

        Ok(Self {
            coordinator,
            sleep,
            namespace,
            identity,
            config,
        })
    }

    /// The identity this allocator allocates under, resolved on first use.
    ///
    /// # Errors
    ///
    /// See [`IdentityResolver::resolve`].
    pub fn client_id(&self) -> Result<&str> {
        self.identity.resolve(&self.coordinator)
    }

    /// Returns the integer already assigned to this client, without
    /// allocating one.
    ///
    /// # Errors
    ///
    /// - [`Error::CoordinationUnavailable`] if the service cannot be reached.
    /// - [`Error::AllocationFailure`] with [`RetryReason::RecordUnreadable`] if
    ///   the client record holds something other than an integer.
    pub fn peek(&self) -> Result<Option<u64>> {
        let client_id = self.client_id()?;
        match self.read_record(&self.namespace.client_key(client_id))? {
            Record::Assigned(uid) => Ok(Some(uid)),
            Record::Vacant { .. } => Ok(None),
            Record::Corrupt => Err(Error::AllocationFailure {
                attempts: 0,
                reason: RetryReason::RecordUnreadable,
            }),
        }
    }

    /// Returns this client's integer, allocating it on first use.
    ///
    /// Repeated calls return the same value; only the first one takes the
    /// lock.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] if the resolved identity is malformed.
    /// - [`Error::CoordinationUnavailable`] if the session cannot be created
    ///   or the service becomes unreachable mid-protocol.
    /// - [`Error::AllocationFailure`] once `max_attempts` attempts have failed.
    ///   Nothing was assigned; it is safe to call again later.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self), fields(namespace = %self.namespace))
    )]
    pub fn get(&self) -> Result<u64> {
        let client_id = self.client_id()?;
        let record_key = self.namespace.client_key(client_id);

        let mut record_cas = match self.read_record(&record_key)? {
            Record::Assigned(uid) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(client_id, uid, "client already has an id");
                return Ok(uid);
            }
            Record::Vacant { cas } => cas,
            Record::Corrupt => {
                return Err(Error::AllocationFailure {
                    attempts: 0,
                    reason: RetryReason::RecordUnreadable,
                });
            }
        };

        let spec = self.config.session.spec_for(&self.namespace, client_id);
        let mut lease = Lease::open(&self.coordinator, spec, self.config.destroy_session)?;

        let mut reason = RetryReason::LockContention;
        for attempt in 1..=self.config.max_attempts {
            if let Some(delay) = self.config.backoff.delay_before(attempt) {
                self.sleep.sleep_for(delay);
            }

            match self.attempt(&mut lease, client_id, &record_key, &mut record_cas)? {
                Step::Allocated(uid) => {
                    #[cfg(feature = "tracing")]
                    tracing::info!(client_id, uid, attempt, "allocated id");
                    return Ok(uid);
                }
                Step::Retry(why) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(client_id, attempt, reason = %why, "attempt failed, retrying");
                    reason = why;
                }
                Step::Abort(why) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(client_id, attempt, reason = %why, "allocation cannot succeed");
                    return Err(Error::AllocationFailure {
                        attempts: attempt,
                        reason: why,
                    });
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(
            client_id,
            attempts = self.config.max_attempts,
            reason = %reason,
            "unable to allocate an id"
        );
        Err(Error::AllocationFailure {
            attempts: self.config.max_attempts,
            reason,
        })
    }

    fn attempt(
        &self,
        lease: &mut Lease<'_, C>,
        client_id: &str,
        record_key: &str,
        record_cas: &mut u64,
    ) -> Result<Step> {
        let Some(session) = lease.refresh()?.cloned() else {
            return Ok(Step::Retry(RetryReason::SessionRenewalFailed));
        };

        let counter_key = self.namespace.counter_key();
        let read = ReadOptions::consistent();
        let (auid, counter_cas) = match self.coordinator.get(&counter_key, &read)? {
            None => (0, 0),
            Some(kv) if kv.is_empty() => (0, kv.modify_index),
            Some(kv) => match kv.as_u64() {
                Some(auid) => (auid, kv.modify_index),
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        key = %counter_key,
                        value = ?kv.value_str(),
                        "available counter is not an integer"
                    );
                    return Ok(Step::Retry(RetryReason::CounterUnreadable));
                }
            },
        };
        let Some(next) = auid.checked_add(1) else {
            return Ok(Step::Abort(RetryReason::CounterOverflow));
        };

        let lock_key = self.namespace.lock_key();
        let acquired = self.coordinator.put(
            &lock_key,
            client_id.as_bytes(),
            &WriteOptions::acquire(&session),
        )?;
        if !acquired.success {
            #[cfg(feature = "tracing")]
            tracing::debug!(key = %lock_key, body = %acquired.body, "lock is held elsewhere");
            return Ok(Step::Retry(RetryReason::LockContention));
        }

        // The counter may have moved between the read and the acquire; the
        // check-and-set refuses the write in that case.
        let committed = self.coordinator.put(
            &counter_key,
            next.to_string().as_bytes(),
            &WriteOptions::cas(counter_cas),
        )?;
        if !committed.success {
            self.release(&lock_key, client_id, &session);
            return Ok(Step::Retry(RetryReason::CounterCommitRejected));
        }

        self.release(&lock_key, client_id, &session);

        let written = self.coordinator.put(
            record_key,
            auid.to_string().as_bytes(),
            &WriteOptions::cas(*record_cas),
        )?;
        if written.success {
            return Ok(Step::Allocated(auid));
        }

        // Someone sharing this identity may have finished first.
        match self.read_record(record_key)? {
            Record::Assigned(uid) => {
                #[cfg(feature = "tracing")]
                tracing::info!(
                    client_id,
                    uid,
                    discarded = auid,
                    "client record was written concurrently"
                );
                Ok(Step::Allocated(uid))
            }
            Record::Vacant { cas } => {
                *record_cas = cas;
                Ok(Step::Retry(RetryReason::RecordWriteRejected))
            }
            Record::Corrupt => Ok(Step::Abort(RetryReason::RecordUnreadable)),
        }
    }

    /// Releases the lock key, retrying up to `release_attempts` times. A lock
    /// that stays held is left to the session's lock delay and expiry.
    fn release(&self, lock_key: &str, client_id: &str, session: &SessionId) {
        let opts = WriteOptions::release(session);
        for _attempt in 1..=self.config.release_attempts {
            match self.coordinator.put(lock_key, client_id.as_bytes(), &opts) {
                Ok(outcome) if outcome.success => return,
                Ok(_outcome) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        key = lock_key,
                        attempt = _attempt,
                        body = %_outcome.body,
                        "lock release rejected"
                    );
                }
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        key = lock_key,
                        attempt = _attempt,
                        error = %_e,
                        "lock release failed"
                    );
                }
            }
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(
            key = lock_key,
            session = %session,
            "unable to release lock, relying on session expiry"
        );
    }

    fn read_record(&self, key: &str) -> Result<Record> {
        let record = match self.coordinator.get(key, &ReadOptions::consistent())? {
            None => Record::Vacant { cas: 0 },
            Some(kv) if kv.is_empty() => Record::Vacant {
                cas: kv.modify_index,
            },
            Some(kv) => match kv.as_u64() {
                Some(uid) => Record::Assigned(uid),
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(key, value = ?kv.value_str(), "client record is not an integer");
                    Record::Corrupt
                }
            },
        };
        Ok(record)
    }
}
