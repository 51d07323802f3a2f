//! In-process, time-bounded storage of processed uploads.
//!
//! Sessions live in one mutex-guarded map. Lookups and sweep deletions take the
//! same lock, and a lookup hands out an `Arc`, so a request that already
//! obtained a session keeps reading it even if the sweep removes it a moment
//! later. Expired sessions are reported as not found on lookup whether or not
//! the sweep has run yet.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::compact::CompactEntry;
use crate::error::{HarcurlError, Result};
use crate::har::CapturedEntry;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct StoredSession {
    pub id: String,
    /// Filtered entries with response bodies stripped.
    pub entries: Vec<CapturedEntry>,
    pub compact: Vec<CompactEntry>,
    /// Entry count of the capture before filtering.
    pub total_entries: usize,
    pub created_at: DateTime<Utc>,
    created: Instant,
}

impl StoredSession {
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Look up a stored entry by its original capture index.
    pub fn entry_by_index(&self, index: usize) -> Option<&CapturedEntry> {
        self.entries
            .binary_search_by_key(&index, |e| e.index)
            .ok()
            .map(|pos| &self.entries[pos])
    }
}

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<StoredSession>>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<StoredSession>>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a processed upload and return its freshly generated id.
    pub fn put(
        &self,
        entries: Vec<CapturedEntry>,
        compact: Vec<CompactEntry>,
        total_entries: usize,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(StoredSession {
            id: id.clone(),
            entries,
            compact,
            total_entries,
            created_at: Utc::now(),
            created: Instant::now(),
        });
        self.lock().insert(id.clone(), session);
        debug!(session_id = %id, "stored session");
        id
    }

    pub fn get(&self, id: &str) -> Result<Arc<StoredSession>> {
        let mut sessions = self.lock();
        let Some(session) = sessions.get(id) else {
            return Err(HarcurlError::NotFound(id.to_string()));
        };
        if session.age() > self.ttl {
            sessions.remove(id);
            return Err(HarcurlError::NotFound(id.to_string()));
        }
        Ok(Arc::clone(session))
    }

    /// Delete every session older than the TTL. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let ttl = self.ttl;
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, session| session.age() <= ttl);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Teardown: drop every session.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Run [`SessionStore::sweep`] on a fixed interval until the task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep();
                if removed > 0 {
                    info!(removed, remaining = store.len(), "expired sessions swept");
                }
            }
        })
    }
}
