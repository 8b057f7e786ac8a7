use std::{
    collections::{BTreeMap, HashMap},
    time::Instant,
};

use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicU64, Ordering};

use crate::{
    coordinator::{
        AgentClient, DeleteOptions, KvStore, PutOutcome, ReadOptions, SessionClient, WriteOptions,
    },
    error::TransportError,
    model::{
        AgentConfig, AgentDescriptor, KeyValue, Member, SessionBehavior, SessionId, SessionInfo,
        SessionSpec,
    },
};

/// Node name reported by [`MemoryCoordinator::new`].
pub const DEFAULT_NODE_NAME: &str = "memory";

/// How many times each coordination primitive has been invoked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub kv_gets: u64,
    /// Every write, including acquires and releases.
    pub kv_puts: u64,
    pub acquires: u64,
    pub releases: u64,
    pub kv_deletes: u64,
    pub session_creates: u64,
    pub session_renews: u64,
    pub session_destroys: u64,
    pub agent_describes: u64,
}

#[derive(Default)]
struct CallStats {
    kv_gets: AtomicU64,
    kv_puts: AtomicU64,
    acquires: AtomicU64,
    releases: AtomicU64,
    kv_deletes: AtomicU64,
    session_creates: AtomicU64,
    session_renews: AtomicU64,
    session_destroys: AtomicU64,
    agent_describes: AtomicU64,
}

impl CallStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CallCounts {
        CallCounts {
            kv_gets: self.kv_gets.load(Ordering::Relaxed),
            kv_puts: self.kv_puts.load(Ordering::Relaxed),
            acquires: self.acquires.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            kv_deletes: self.kv_deletes.load(Ordering::Relaxed),
            session_creates: self.session_creates.load(Ordering::Relaxed),
            session_renews: self.session_renews.load(Ordering::Relaxed),
            session_destroys: self.session_destroys.load(Ordering::Relaxed),
            agent_describes: self.agent_describes.load(Ordering::Relaxed),
        }
    }
}

struct Entry {
    value: Vec<u8>,
    flags: u64,
    create_index: u64,
    modify_index: u64,
    lock_index: u64,
    session: Option<SessionId>,
}

impl Entry {
    fn to_key_value(&self, key: &str) -> KeyValue {
        KeyValue {
            key: key.to_owned(),
            value: self.value.clone(),
            flags: self.flags,
            create_index: self.create_index,
            modify_index: self.modify_index,
            lock_index: self.lock_index,
            session: self.session.clone(),
        }
    }
}

#[derive(Default)]
struct State {
    /// Raft-like index bumped by every mutation.
    index: u64,
    next_session: u64,
    entries: BTreeMap<String, Entry>,
    sessions: HashMap<SessionId, SessionInfo>,
    /// Keys that cannot be acquired again until the deadline passes.
    lock_delays: HashMap<String, Instant>,
}

impl State {
    fn next_index(&mut self) -> u64 {
        self.index += 1;
        self.index
    }

    /// Applies the session's behavior to every key it holds.
    fn invalidate(&mut self, id: &SessionId) -> bool {
        let Some(info) = self.sessions.remove(id) else {
            return false;
        };

        let held: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.session.as_ref() == Some(id))
            .map(|(key, _)| key.clone())
            .collect();

        let now = Instant::now();
        for key in held {
            match info.spec.behavior {
                SessionBehavior::Release => {
                    let index = self.next_index();
                    if let Some(entry) = self.entries.get_mut(&key) {
                        entry.session = None;
                        entry.modify_index = index;
                    }
                    if !info.spec.lock_delay.is_zero() {
                        self.lock_delays.insert(key, now + info.spec.lock_delay);
                    }
                }
                SessionBehavior::Delete => {
                    self.entries.remove(&key);
                }
            }
        }
        true
    }

    /// Whether `key` is still inside a lock delay. A passed deadline is
    /// dropped on the way.
    fn in_lock_delay(&mut self, key: &str) -> bool {
        match self.lock_delays.get(key) {
            Some(until) if Instant::now() < *until => true,
            Some(_) => {
                self.lock_delays.remove(key);
                false
            }
            None => false,
        }
    }
}

/// A single-process coordination service with Consul's session, lock and
/// check-and-set semantics.
///
/// Useful for tests, benchmarks, and embedding the allocator where every
/// client lives in the same process. It also keeps per-primitive call counts
/// and can simulate an unreachable service or an expired session.
pub struct MemoryCoordinator {
    state: Mutex<State>,
    stats: CallStats,
    unreachable: AtomicBool,
    agent: Option<AgentDescriptor>,
}

impl Default for MemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordinator {
    /// Creates an empty store whose agent reports [`DEFAULT_NODE_NAME`].
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            stats: CallStats::default(),
            unreachable: AtomicBool::new(false),
            agent: Some(Self::agent_named(DEFAULT_NODE_NAME)),
        }
    }

    /// Reports `name` as the agent's node and member name.
    #[must_use]
    pub fn with_node_name(mut self, name: impl Into<String>) -> Self {
        self.agent = Some(Self::agent_named(&name.into()));
        self
    }

    /// Makes [`AgentClient::describe_agent`] answer `None`.
    #[must_use]
    pub fn without_agent(mut self) -> Self {
        self.agent = None;
        self
    }

    fn agent_named(name: &str) -> AgentDescriptor {
        AgentDescriptor {
            config: AgentConfig {
                node_name: name.to_owned(),
                datacenter: String::from("dc1"),
            },
            member: Member {
                name: name.to_owned(),
                addr: String::from("127.0.0.1"),
                port: 8301,
                tags: BTreeMap::new(),
                status: 1,
            },
        }
    }

    pub fn stats(&self) -> CallCounts {
        self.stats.snapshot()
    }

    /// While set, every call fails with a [`TransportError`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Invalidates a session as if its TTL ran out or a health check failed.
    pub fn expire_session(&self, id: &SessionId) -> bool {
        self.state.lock().invalidate(id)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Reads an entry without counting the call or checking reachability.
    pub fn entry(&self, key: &str) -> Option<KeyValue> {
        self.state
            .lock()
            .entries
            .get(key)
            .map(|entry| entry.to_key_value(key))
    }

    /// Every key currently stored, in order.
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }

    fn check_reachable(&self) -> Result<(), TransportError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(TransportError::new("connection refused"));
        }
        Ok(())
    }
}

impl KvStore for MemoryCoordinator {
    fn get(&self, key: &str, _opts: &ReadOptions) -> Result<Option<KeyValue>, TransportError> {
        self.check_reachable()?;
        CallStats::bump(&self.stats.kv_gets);
        Ok(self.entry(key))
    }

    fn put(
        &self,
        key: &str,
        value: &[u8],
        opts: &WriteOptions,
    ) -> Result<PutOutcome, TransportError> {
        self.check_reachable()?;
        CallStats::bump(&self.stats.kv_puts);
        if opts.acquire.is_some() {
            CallStats::bump(&self.stats.acquires);
        }
        if opts.release.is_some() {
            CallStats::bump(&self.stats.releases);
        }

        let mut state = self.state.lock();
        if opts.acquire.is_some() && opts.release.is_some() {
            return Ok(PutOutcome::rejected("conflicting flags"));
        }

        let delayed = opts.acquire.is_some() && state.in_lock_delay(key);
        let existing = state.entries.get(key);
        if let Some(cas) = opts.cas {
            let matches = match existing {
                None => cas == 0,
                Some(entry) => entry.modify_index == cas,
            };
            if !matches {
                return Ok(PutOutcome::rejected("false"));
            }
        }
        if let Some(session) = &opts.acquire {
            if !state.sessions.contains_key(session) {
                let body = format!("invalid session \"{session}\"");
                return Ok(PutOutcome::rejected(body));
            }
            let holder = existing.and_then(|entry| entry.session.as_ref());
            match holder {
                Some(holder) if holder != session => return Ok(PutOutcome::rejected("false")),
                None if delayed => return Ok(PutOutcome::rejected("false")),
                _ => {}
            }
        }
        if let Some(session) = &opts.release {
            let held = existing.is_some_and(|entry| entry.session.as_ref() == Some(session));
            if !held {
                return Ok(PutOutcome::rejected("false"));
            }
        }

        let index = state.next_index();
        let entry = state.entries.entry(key.to_owned()).or_insert(Entry {
            value: Vec::new(),
            flags: 0,
            create_index: index,
            modify_index: index,
            lock_index: 0,
            session: None,
        });
        entry.value = value.to_vec();
        entry.modify_index = index;
        if let Some(flags) = opts.flags {
            entry.flags = flags;
        }
        if let Some(session) = &opts.acquire {
            if entry.session.is_none() {
                entry.lock_index += 1;
            }
            entry.session = Some(session.clone());
        }
        if opts.release.is_some() {
            entry.session = None;
        }

        Ok(PutOutcome::accepted())
    }

    fn delete(&self, key: &str, opts: &DeleteOptions) -> Result<bool, TransportError> {
        self.check_reachable()?;
        CallStats::bump(&self.stats.kv_deletes);

        let mut state = self.state.lock();
        if let Some(cas) = opts.cas {
            let matches = state
                .entries
                .get(key)
                .is_some_and(|entry| entry.modify_index == cas);
            if !matches {
                return Ok(false);
            }
        }

        state.next_index();
        if opts.recurse {
            state.entries.retain(|k, _| !k.starts_with(key));
        } else {
            state.entries.remove(key);
        }
        Ok(true)
    }
}

impl SessionClient for MemoryCoordinator {
    fn create(&self, spec: &SessionSpec) -> Result<Option<SessionId>, TransportError> {
        self.check_reachable()?;
        CallStats::bump(&self.stats.session_creates);

        let mut state = self.state.lock();
        state.next_session += 1;
        let id = SessionId::new(format!("mem-session-{:012x}", state.next_session));
        let create_index = state.next_index();
        state.sessions.insert(
            id.clone(),
            SessionInfo {
                id: id.clone(),
                spec: spec.clone(),
                create_index,
            },
        );
        Ok(Some(id))
    }

    fn renew(&self, id: &SessionId) -> Result<bool, TransportError> {
        self.check_reachable()?;
        CallStats::bump(&self.stats.session_renews);
        Ok(self.state.lock().sessions.contains_key(id))
    }

    fn destroy(&self, id: &SessionId) -> Result<bool, TransportError> {
        self.check_reachable()?;
        CallStats::bump(&self.stats.session_destroys);
        self.state.lock().invalidate(id);
        Ok(true)
    }

    fn info(&self, id: &SessionId) -> Result<Option<SessionInfo>, TransportError> {
        self.check_reachable()?;
        Ok(self.state.lock().sessions.get(id).cloned())
    }
}

impl AgentClient for MemoryCoordinator {
    fn describe_agent(&self) -> Result<Option<AgentDescriptor>, TransportError> {
        self.check_reachable()?;
        CallStats::bump(&self.stats.agent_describes);
        Ok(self.agent.clone())
    }
}
