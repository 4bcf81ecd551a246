//! The shared, process-wide broker state: configuration, user directory,
//! client registry, and subscription index, behind one exclusion boundary
//! (SPEC_FULL §3, §4.4, §9 "Global mutable state").
//!
//! Every mutation and every read that must observe a consistent view goes
//! through `Inner` under a single `parking_lot::Mutex`. Sections are short:
//! look up a key, mutate/read, return. Nothing here ever awaits.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::auth::{self, AuthOutcome};
use crate::config::Config;


/// Capacity of a connection's outbound queue (SPEC_FULL §5 "Resource bounds",
/// §9 "Outbound sink type"). Fixed and independent of `max_connections`: large
/// enough that a burst of QoS-0 fan-out doesn't spuriously disconnect a live
/// but momentarily slow subscriber, small enough to bound memory per client.
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// One client's record in the registry (SPEC_FULL §3 "Client record").
struct ClientRecord {
    username: Option<String>,
    connected: bool,
    subscriptions: HashSet<String>,
    sender: mpsc::Sender<Bytes>,
    /// Fires to forcibly close this client's connection task on eviction
    /// (SPEC_FULL §4.3 "Eviction"). `None` once already used or for a
    /// synthetic admin-subscription id that has no connection task.
    kill: Option<oneshot::Sender<()>>,
}

/// Read-only snapshot of a client record for the admin surface
/// (`list_clients`, SPEC_FULL §6).
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub username: Option<String>,
    pub connected: bool,
    pub subscriptions: Vec<String>,
}

struct Inner {
    config: Config,
    clients: HashMap<Arc<str>, ClientRecord>,
    /// topic -> ordered, duplicate-free list of subscriber client ids
    /// (SPEC_FULL §3 "Subscription index", §4.4 tie-break policy).
    index: HashMap<String, Vec<Arc<str>>>,
}

pub struct BrokerState {
    inner: Mutex<Inner>,
}

/// Whether a subscription filter matches a published topic. String equality
/// in the baseline (SPEC_FULL §4.5, §9 "Wildcard matching" open item) — an
/// implementer wanting standard `+`/`#` wildcard matching replaces this
/// function alone.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    filter == topic
}

impl BrokerState {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Mutex::new(Inner {
                config,
                clients: HashMap::new(),
                index: HashMap::new(),
            }),
        }
    }

    // ---- configuration & user directory (SPEC_FULL §6 admin surface) ----

    pub fn get_config(&self) -> Config {
        self.inner.lock().config.clone()
    }

    /// Mutates configuration in place. Does not re-bind the listener
    /// (SPEC_FULL §3, documented behavior).
    pub fn update_config(&self, new_config: Config) {
        self.inner.lock().config = new_config;
    }

    pub fn list_users(&self) -> Vec<String> {
        self.inner.lock().config.users.keys().cloned().collect()
    }

    pub fn add_user(&self, username: String, password: String) {
        self.inner.lock().config.users.insert(username, password);
    }

    pub fn remove_user(&self, username: &str) -> bool {
        self.inner.lock().config.users.remove(username).is_some()
    }

    /// Authenticate a CONNECT attempt. Does not perform the `max_connections`
    /// check — the caller does that first, per SPEC_FULL §4.3's ordering.
    pub fn authenticate(&self, username: Option<&str>, password: Option<&[u8]>) -> AuthOutcome {
        let inner = self.inner.lock();
        auth::authenticate(
            inner.config.allow_anonymous,
            &inner.config.users,
            username,
            password,
        )
    }

    pub fn client_count(&self) -> usize {
        self.inner.lock().clients.len()
    }

    // ---- client registry & subscription index ----

    /// Register a newly-accepted client, evicting any existing connection
    /// with the same `client_id` first (SPEC_FULL §4.3 "On Accepted").
    /// Returns `true` if an existing connection was evicted.
    pub fn register_client(
        &self,
        client_id: Arc<str>,
        username: Option<String>,
        sender: mpsc::Sender<Bytes>,
        kill: oneshot::Sender<()>,
    ) -> bool {
        let mut inner = self.inner.lock();
        let evicted = Self::evict_locked(&mut inner, &client_id);
        inner.clients.insert(
            client_id,
            ClientRecord {
                username,
                connected: true,
                subscriptions: HashSet::new(),
                sender,
                kill: Some(kill),
            },
        );
        evicted
    }

    /// Remove `client_id` from the registry and purge every topic list
    /// referencing it (SPEC_FULL §4.3 "Closing semantics"). Idempotent.
    pub fn remove_client(&self, client_id: &str) {
        let mut inner = self.inner.lock();
        Self::purge_locked(&mut inner, client_id);
    }

    /// Eviction path used on duplicate CONNECT: close the old connection's
    /// task and purge its index entries before the new record is installed.
    fn evict_locked(inner: &mut Inner, client_id: &str) -> bool {
        if let Some(old) = inner.clients.remove(client_id) {
            for topic in &old.subscriptions {
                Self::remove_from_index(&mut inner.index, topic, client_id);
            }
            if let Some(kill) = old.kill {
                let _ = kill.send(());
            }
            debug!(client_id, "evicted duplicate-id connection");
            true
        } else {
            false
        }
    }

    fn purge_locked(inner: &mut Inner, client_id: &str) {
        if let Some(record) = inner.clients.remove(client_id) {
            for topic in &record.subscriptions {
                Self::remove_from_index(&mut inner.index, topic, client_id);
            }
        }
    }

    fn remove_from_index(index: &mut HashMap<String, Vec<Arc<str>>>, topic: &str, client_id: &str) {
        if let Some(ids) = index.get_mut(topic) {
            ids.retain(|id| id.as_ref() != client_id);
            if ids.is_empty() {
                index.remove(topic);
            }
        }
    }

    /// Mark a client not-connected without touching the index — only the
    /// owning connection's own close-transition purges the index
    /// (SPEC_FULL §3 "Client record" lifecycle, §4.5 rule 4).
    pub fn mark_disconnected(&self, client_id: &str) {
        if let Some(record) = self.inner.lock().clients.get_mut(client_id) {
            record.connected = false;
        }
    }

    /// Add `topic` to `client_id`'s subscription set and to the index.
    /// A no-op beyond idempotence if already subscribed (SPEC_FULL §8).
    /// Accepts ids with no registry entry (the admin-subscription shim,
    /// SPEC_FULL §9) — the index never requires the id to pre-exist.
    pub fn add_subscription(&self, client_id: &Arc<str>, topic: String) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.clients.get_mut(client_id.as_ref()) {
            record.subscriptions.insert(topic.clone());
        }
        let ids = inner.index.entry(topic).or_default();
        if !ids.iter().any(|id| id == client_id) {
            ids.push(client_id.clone());
        }
    }

    /// Remove `topic` from `client_id`'s subscription set and the index.
    /// A no-op if not subscribed (SPEC_FULL §8).
    pub fn remove_subscription(&self, client_id: &str, topic: &str) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.clients.get_mut(client_id) {
            record.subscriptions.remove(topic);
        }
        Self::remove_from_index(&mut inner.index, topic, client_id);
    }

    /// Snapshot of `(client_id, sender)` for every currently-connected,
    /// registered client whose subscriptions match `topic`, excluding
    /// `exclude` (the publisher — SPEC_FULL §4.5 rules 1-3). Taken entirely
    /// under the lock; the caller writes to sockets after releasing it.
    pub fn snapshot_subscribers(&self, topic: &str, exclude: &str) -> Vec<(Arc<str>, mpsc::Sender<Bytes>)> {
        let inner = self.inner.lock();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        for (filter, ids) in inner.index.iter() {
            if !topic_matches(filter, topic) {
                continue;
            }
            for id in ids {
                if id.as_ref() == exclude || !seen.insert(id.as_ref()) {
                    continue;
                }
                if let Some(record) = inner.clients.get(id.as_ref()) {
                    if record.connected {
                        out.push((id.clone(), record.sender.clone()));
                    }
                }
            }
        }
        out
    }

    // ---- admin introspection (SPEC_FULL §6) ----

    pub fn list_clients(&self) -> HashMap<String, ClientInfo> {
        let inner = self.inner.lock();
        inner
            .clients
            .iter()
            .map(|(id, record)| {
                (
                    id.to_string(),
                    ClientInfo {
                        username: record.username.clone(),
                        connected: record.connected,
                        subscriptions: record.subscriptions.iter().cloned().collect(),
                    },
                )
            })
            .collect()
    }

    pub fn list_topics(&self) -> HashMap<String, Vec<String>> {
        let inner = self.inner.lock();
        inner
            .index
            .iter()
            .map(|(topic, ids)| (topic.clone(), ids.iter().map(|id| id.to_string()).collect()))
            .collect()
    }

    /// Invariant-check helper reused across tests (SPEC_FULL §8).
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let inner = self.inner.lock();
        for (id, record) in inner.clients.iter() {
            for topic in &record.subscriptions {
                let ids = inner
                    .index
                    .get(topic)
                    .unwrap_or_else(|| panic!("topic {topic} missing from index for {id}"));
                assert_eq!(
                    ids.iter().filter(|x| x.as_ref() == id.as_ref()).count(),
                    1,
                    "client {id} should appear exactly once in index[{topic}]"
                );
            }
        }
        for (topic, ids) in inner.index.iter() {
            assert!(!ids.is_empty(), "topic {topic} has an empty subscriber list");
            for id in ids {
                if let Some(record) = inner.clients.get(id) {
                    assert!(
                        record.subscriptions.contains(topic),
                        "index[{topic}] references {id} which doesn't list it"
                    );
                } else {
                    warn!(client_id = %id, topic, "index references an id with no registry record (admin-subscription shim)");
                }
            }
        }
    }
}
