//! In-memory session provider with recency-ordered expiration.
//!
//! Sessions live in an LRU list keyed by id, most recently accessed at the
//! front. New sessions are appended at the back and only move forward once
//! they are accessed. The expiration sweep walks from the back and stops at
//! the first session that is still live.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};

use crate::attributes::Attributes;
use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::persistence::{Backing, FileStore};
use crate::session::Session;

/// Whether a session last touched at `accessed` has outlived `timeout` at `now`.
///
/// Compared at whole-second granularity.
pub fn is_expired_at(accessed: DateTime<Utc>, timeout: Duration, now: DateTime<Utc>) -> bool {
    let timeout = i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX);
    accessed.timestamp().saturating_add(timeout) < now.timestamp()
}

/// Session provider holding the working set in memory, optionally shadowed
/// by per-session files.
pub struct MemoryProvider {
    sessions: RwLock<LruCache<String, Session>>,
    backing: Backing,
    config: ProviderConfig,
}

impl MemoryProvider {
    /// Create a provider from configuration.
    ///
    /// With a `save_path` the provider is file-backed; the directory is
    /// created if missing. Persisted sessions are not read until
    /// [`load_sessions`](Self::load_sessions) is called.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;

        let backing = match &config.save_path {
            Some(dir) => Backing::File(Arc::new(FileStore::with_write_timeout(
                dir,
                config.persist_timeout,
            )?)),
            None => Backing::Memory,
        };

        let lru = match config.max_sessions.and_then(NonZeroUsize::new) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };

        Ok(Self {
            sessions: RwLock::new(lru),
            backing,
            config,
        })
    }

    /// Create a memory-only provider with the given timeout.
    pub fn in_memory(timeout: Duration) -> Result<Self> {
        Self::new(ProviderConfig::new().with_timeout(timeout))
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Idle timeout, fixed at construction.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self.backing, Backing::File(_))
    }

    pub fn file_store(&self) -> Option<&Arc<FileStore>> {
        match &self.backing {
            Backing::Memory => None,
            Backing::File(store) => Some(store),
        }
    }

    /// Fresh attribute bag wired to this provider's persistence layer.
    pub fn new_attributes(&self, sid: impl Into<String>) -> Attributes {
        Attributes::with_backing(sid, self.backing.clone())
    }

    pub fn is_expired(&self, session: &Session) -> bool {
        is_expired_at(
            session.attributes().time_accessed(),
            self.config.timeout,
            Utc::now(),
        )
    }

    /// Check whether a session is in memory. Does not affect recency.
    pub async fn has_session(&self, sid: &str) -> bool {
        self.sessions.read().await.contains(sid)
    }

    /// Look up a session, marking it accessed and moving it to the front.
    ///
    /// A session that has already expired but not yet been swept is evicted
    /// and reported absent. On a miss, a file-backed provider tries to reload
    /// the session from disk.
    pub async fn get_session(&self, sid: &str) -> Option<Session> {
        {
            let mut sessions = self.sessions.write().await;
            match sessions.peek(sid).map(|session| self.is_expired(session)) {
                Some(true) => {
                    if let Some(session) = sessions.pop(sid) {
                        debug!(session_id = %sid, "Session expired on access");
                        self.discard(vec![session]).await;
                    }
                    return None;
                }
                Some(false) => {
                    let session = sessions.get(sid)?;
                    session.attributes().touch();
                    trace!(session_id = %sid, "Session found in memory");
                    return Some(session.clone());
                }
                None => {}
            }
        }

        self.reload(sid).await
    }

    /// Register a new session at the back of the recency list.
    ///
    /// Fails if the id is blank or already present; the existing session is
    /// left untouched.
    pub async fn add_new_session(&self, session: Session) -> Result<()> {
        let sid = session.id().to_string();
        if sid.trim().is_empty() {
            return Err(Error::EmptySessionId);
        }

        let len = {
            let mut sessions = self.sessions.write().await;
            if sessions.contains(&sid) {
                return Err(Error::DuplicateSessionId(sid));
            }
            let evicted = sessions.push(sid.clone(), session);
            sessions.demote(&sid);
            if let Some((_, evicted)) = evicted {
                self.spill(evicted).await;
            }
            sessions.len()
        };

        trace!(session_id = %sid, cache_size = len, "Session added");
        Ok(())
    }

    /// Remove a session from memory and disk. Unknown ids are not an error.
    ///
    /// The write lock is held until the file is gone, so a concurrent
    /// [`get_session`](Self::get_session) cannot reload it from disk.
    pub async fn remove_session(&self, sid: &str) -> Result<()> {
        if sid.is_empty() {
            return Ok(());
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.pop(sid) {
            debug!(session_id = %sid, "Session removed");
            session.attributes().release();
            session.attributes().wait_for_writes().await;
        }

        let removed = self.remove_files(vec![sid.to_string()]).await;
        drop(sessions);
        removed
    }

    /// Evict expired sessions, oldest first. Returns how many were evicted.
    ///
    /// The tail is inspected under the read lock, then re-checked under the
    /// write lock before eviction, since another task may have touched or
    /// removed it in between.
    pub async fn remove_expired(&self) -> usize {
        let mut count = 0;

        loop {
            let candidate = {
                let sessions = self.sessions.read().await;
                match sessions.peek_lru() {
                    Some((sid, session)) if self.is_expired(session) => sid.clone(),
                    _ => break,
                }
            };

            let mut sessions = self.sessions.write().await;
            let still_expired = matches!(
                sessions.peek_lru(),
                Some((sid, session)) if *sid == candidate && self.is_expired(session)
            );
            if still_expired && let Some((sid, session)) = sessions.pop_lru() {
                trace!(session_id = %sid, "Evicting expired session");
                self.discard(vec![session]).await;
                count += 1;
            }
        }

        if count > 0 {
            debug!(count, "Removed expired sessions");
        }
        count
    }

    /// Restore persisted sessions into memory.
    ///
    /// `make` builds a session around each loaded attribute bag. Sessions that
    /// are already expired have their files deleted instead of being admitted.
    /// Returns the number of sessions admitted.
    pub async fn load_sessions<F>(&self, mut make: F) -> Result<usize>
    where
        F: FnMut(Attributes) -> Session + Send + 'static,
    {
        let Some(store) = self.file_store().cloned() else {
            return Ok(0);
        };

        let mut loaded = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            store.load_all(|attrs| out.push(make(attrs)))?;
            Ok::<_, Error>(out)
        })
        .await
        .map_err(|e| Error::Persistence(e.to_string()))??;

        // Newest first, so the oldest end up at the back where the sweep looks.
        loaded.sort_by_key(|s| std::cmp::Reverse(s.attributes().time_accessed()));

        let mut admitted = 0;
        let mut expired = Vec::new();
        for session in loaded {
            if self.is_expired(&session) {
                expired.push(session.id().to_string());
                continue;
            }
            match self.add_new_session(session).await {
                Ok(()) => admitted += 1,
                Err(e) => warn!(error = %e, "Skipping persisted session"),
            }
        }

        let stale = expired.len();
        if let Err(e) = self.remove_files(expired).await {
            warn!(error = %e, "Failed to delete expired session files");
        }

        info!(admitted, stale, "Restored persisted sessions");
        Ok(admitted)
    }

    /// Write every in-memory session to disk. Returns how many were written.
    pub async fn persist_all(&self) -> usize {
        if !self.is_persistent() {
            return 0;
        }

        let sessions: Vec<Session> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(_, session)| session.clone())
            .collect();

        let mut saved = 0;
        for session in &sessions {
            match session.attributes().flush().await {
                Ok(()) => saved += 1,
                Err(e) => {
                    warn!(session_id = %session.id(), error = %e, "Failed to persist session")
                }
            }
        }

        debug!(saved, total = sessions.len(), "Persisted sessions");
        saved
    }

    /// Number of sessions in memory.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Session ids from most to least recently used.
    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(sid, _)| sid.clone())
            .collect()
    }

    pub async fn stats(&self) -> ProviderStats {
        let sessions = self.sessions.read().await;
        ProviderStats {
            size: sessions.len(),
            capacity: self.config.max_sessions,
            persistent: self.is_persistent(),
            timeout: self.config.timeout,
        }
    }

    async fn reload(&self, sid: &str) -> Option<Session> {
        let store = Arc::clone(self.file_store()?);
        let owned = sid.to_string();
        let loader = Arc::clone(&store);
        let loaded = tokio::task::spawn_blocking(move || loader.load(&owned)).await;

        let attrs = match loaded {
            Ok(Ok(Some(attrs))) => attrs,
            Ok(Ok(None)) => return None,
            Ok(Err(e)) => {
                warn!(session_id = %sid, error = %e, "Failed to reload session from disk");
                return None;
            }
            Err(e) => {
                warn!(session_id = %sid, error = %e, "Session reload task failed");
                return None;
            }
        };

        let session = Session::new(attrs);
        if self.is_expired(&session) {
            debug!(session_id = %sid, "Persisted session expired, deleting");
            let _sessions = self.sessions.write().await;
            self.discard(vec![session]).await;
            return None;
        }
        session.attributes().touch();

        {
            let mut sessions = self.sessions.write().await;
            if let Some(existing) = sessions.get(sid) {
                // Another task reloaded it first
                existing.attributes().touch();
                return Some(existing.clone());
            }
            // Removed while we were reading the file
            if !store.has(sid) {
                trace!(session_id = %sid, "Session file gone before reload finished");
                return None;
            }
            if let Some((_, evicted)) = sessions.push(sid.to_string(), session.clone()) {
                self.spill(evicted).await;
            }
        }

        debug!(session_id = %sid, "Session reloaded from disk");
        Some(session)
    }

    /// Drop a session pushed out at capacity. Its file is rewritten so the
    /// mtime matches the last access, since a later reload judges expiry by
    /// the mtime. Callers hold the write lock.
    async fn spill(&self, session: Session) {
        debug!(session_id = %session.id(), "Session dropped from memory at capacity");
        if let Err(e) = session.attributes().flush().await {
            warn!(session_id = %session.id(), error = %e, "Failed to persist evicted session");
        }
    }

    /// Release evicted sessions and delete their files.
    ///
    /// Callers hold the write lock so the files cannot be reloaded meanwhile.
    async fn discard(&self, sessions: Vec<Session>) {
        let mut sids = Vec::with_capacity(sessions.len());
        for session in sessions {
            session.attributes().release();
            session.attributes().wait_for_writes().await;
            sids.push(session.id().to_string());
        }
        if let Err(e) = self.remove_files(sids).await {
            warn!(error = %e, "Failed to delete session files");
        }
    }

    /// Delete session files, continuing past failures. Returns the last error.
    async fn remove_files(&self, sids: Vec<String>) -> Result<()> {
        let Some(store) = self.file_store().cloned() else {
            return Ok(());
        };
        if sids.is_empty() {
            return Ok(());
        }

        tokio::task::spawn_blocking(move || {
            let mut last_err = None;
            for sid in &sids {
                if let Err(e) = store.remove(sid) {
                    warn!(session_id = %sid, error = %e, "Failed to delete session file");
                    last_err = Some(e);
                }
            }
            last_err.map_or(Ok(()), Err)
        })
        .await
        .map_err(|e| Error::Persistence(e.to_string()))?
    }
}

impl std::fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryProvider")
            .field("backing", &self.backing)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Provider statistics.
#[derive(Debug, Clone)]
pub struct ProviderStats {
    /// Sessions currently in memory.
    pub size: usize,

    /// Configured in-memory cap, if any.
    pub capacity: Option<usize>,

    /// Whether sessions are shadowed on disk.
    pub persistent: bool,

    pub timeout: Duration,
}
