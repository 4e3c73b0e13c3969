//! Session and memory storage.
//!
//! The orchestrator talks to sessions through the `SessionStore` trait so a
//! bounded or persistent implementation can be swapped in later without
//! touching pipeline code. The in-memory implementation here keeps a bounded
//! note history per session and supports idle pruning.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Per-session state: a bounded history of run notes plus activity stamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Last read or write.
    pub last_activity: DateTime<Utc>,
    /// Recent notes, oldest first.
    pub notes: Vec<String>,
}

/// Key-value session store the orchestrator depends on.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create the session if it does not exist.
    async fn ensure_session(&self, session_id: &str);

    /// Append a note to the session history (e.g. a one-line run summary).
    async fn record_note(&self, session_id: &str, note: String);

    /// The last `limit` session notes joined into a context string for the
    /// oracle.
    async fn context(&self, session_id: &str, limit: usize) -> String;

    /// Fetch a session snapshot.
    async fn get(&self, session_id: &str) -> Option<SessionState>;

    /// Delete a session. Returns whether it existed.
    async fn delete(&self, session_id: &str) -> bool;
}

/// In-memory `SessionStore` with a bounded per-session history.
#[derive(Debug)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
    history_limit: usize,
}

impl InMemorySessionStore {
    /// Create a store keeping at most `history_limit` notes per session.
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            history_limit,
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove sessions idle longer than `timeout`. Returns how many were
    /// removed.
    pub async fn prune_idle(&self, timeout: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::zero());
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_activity >= cutoff);
        let pruned = before - sessions.len();
        if pruned > 0 {
            info!(pruned, "Pruned idle sessions");
        }
        pruned
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn ensure_session(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!(session_id, "Created session");
            SessionState {
                created_at: Utc::now(),
                last_activity: Utc::now(),
                notes: Vec::new(),
            }
        });
    }

    async fn record_note(&self, session_id: &str, note: String) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.notes.push(note);
            while session.notes.len() > self.history_limit {
                session.notes.remove(0);
            }
            session.last_activity = Utc::now();
        }
    }

    async fn context(&self, session_id: &str, limit: usize) -> String {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|s| {
                let start = s.notes.len().saturating_sub(limit);
                s.notes[start..].join("\n")
            })
            .unwrap_or_default()
    }

    async fn get(&self, session_id: &str) -> Option<SessionState> {
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn delete(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            debug!(session_id, "Deleted session");
        }
        removed
    }
}

// ── Memory bank ─────────────────────────────────────────────────────

/// A long-term memory entry with an optional time-to-live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Stored value.
    pub value: serde_json::Value,
    /// When the entry was stored.
    pub stored_at: DateTime<Utc>,
    /// Lifetime; `None` means permanent.
    pub ttl: Option<Duration>,
}

impl MemoryEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl {
            Some(ttl) => {
                let age = (now - self.stored_at).to_std().unwrap_or(Duration::ZERO);
                age >= ttl
            }
            None => false,
        }
    }
}

/// Keyed long-term storage with TTL expiry on read. No background sweeper:
/// expired entries are dropped the next time they are touched.
#[derive(Debug, Default)]
pub struct MemoryBank {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryBank {
    /// Create an empty memory bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under a key, replacing any previous entry.
    pub async fn store(&self, key: impl Into<String>, value: serde_json::Value, ttl: Option<Duration>) {
        let key = key.into();
        debug!(key = %key, "Stored memory entry");
        self.entries.write().await.insert(
            key,
            MemoryEntry {
                value,
                stored_at: Utc::now(),
                ttl,
            },
        );
    }

    /// Retrieve a value. Expired entries are removed and reported absent.
    pub async fn retrieve(&self, key: &str) -> Option<serde_json::Value> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                debug!(key, "Memory entry expired");
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// All live keys.
    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// Delete an entry. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Drop everything.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
