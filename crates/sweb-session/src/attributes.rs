//! Per-session attribute bag.
//!
//! Reads take a shared lock and never block each other. Mutations take the
//! exclusive lock only long enough to update the map and snapshot it; the
//! disk write happens afterwards, serialized per session so that a slower,
//! older snapshot never overwrites a newer one.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::persistence::{Backing, FileStore};

/// Decode an encoded attribute map. Empty input is an empty map.
pub fn decode_map(encoded: &[u8]) -> Result<HashMap<String, Value>> {
    if encoded.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(serde_json::from_slice(encoded)?)
}

/// Encode an attribute map.
pub fn encode_map(kv: &HashMap<String, Value>) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(kv)?)
}

#[derive(Debug, Default)]
struct Bag {
    kv: HashMap<String, Value>,
    /// Bumped on every change that must reach disk.
    version: u64,
}

/// What a mutation needs written once the map lock is released.
enum PendingWrite {
    Save(Vec<u8>),
    Truncate,
}

/// Mutable key/value bag owned by one session.
#[derive(Debug)]
pub struct Attributes {
    sid: String,
    bag: RwLock<Bag>,
    accessed_ms: AtomicI64,
    backing: RwLock<Backing>,
    /// Highest bag version known to be on disk. Held for the whole life of
    /// a disk write, including one that outlived `persist_timeout`.
    written: Arc<tokio::sync::Mutex<u64>>,
}

impl Attributes {
    /// Create an empty, memory-only attribute bag.
    pub fn new(sid: impl Into<String>) -> Self {
        Self::with_backing(sid, Backing::Memory)
    }

    pub(crate) fn with_backing(sid: impl Into<String>, backing: Backing) -> Self {
        Self {
            sid: sid.into(),
            bag: RwLock::new(Bag::default()),
            accessed_ms: AtomicI64::new(Utc::now().timestamp_millis()),
            backing: RwLock::new(backing),
            written: Arc::new(tokio::sync::Mutex::new(0)),
        }
    }

    /// Rebuild a bag from persisted state.
    pub(crate) fn restore(
        sid: impl Into<String>,
        kv: HashMap<String, Value>,
        time_accessed: DateTime<Utc>,
        backing: Backing,
    ) -> Self {
        let attrs = Self::with_backing(sid, backing);
        attrs.bag.write().kv = kv;
        attrs.set_time_accessed(time_accessed);
        attrs
    }

    /// Identifier of the owning session.
    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Last time the session was touched.
    pub fn time_accessed(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.accessed_ms.load(Ordering::Acquire))
            .unwrap_or_default()
    }

    pub fn set_time_accessed(&self, t: DateTime<Utc>) {
        self.accessed_ms.store(t.timestamp_millis(), Ordering::Release);
    }

    /// Mark the session as accessed now.
    pub fn touch(&self) {
        self.set_time_accessed(Utc::now());
    }

    /// Get a raw attribute value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.bag.read().kv.get(key).cloned()
    }

    /// Get an attribute deserialized into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.bag.read().kv.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.bag.read().kv.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.bag.read().kv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bag.read().kv.is_empty()
    }

    /// Set an attribute.
    ///
    /// Storing a value equal to the current one does not touch the disk.
    /// A persistence failure is returned, but the in-memory value is kept.
    pub async fn set(&self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let key = key.into();
        let persisted = self.store().is_some();

        let pending = {
            let mut bag = self.bag.write();
            if bag.kv.get(&key) == Some(&value) {
                return Ok(());
            }
            bag.kv.insert(key, value);
            bag.version += 1;
            if persisted {
                Some((bag.version, PendingWrite::Save(encode_map(&bag.kv)?)))
            } else {
                None
            }
        };

        match pending {
            Some((version, write)) => self.persist(version, write).await,
            None => Ok(()),
        }
    }

    /// Delete an attribute. Deleting an absent key is a no-op.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let persisted = self.store().is_some();

        let pending = {
            let mut bag = self.bag.write();
            if bag.kv.remove(key).is_none() {
                return Ok(());
            }
            bag.version += 1;
            if persisted {
                Some((bag.version, PendingWrite::Save(encode_map(&bag.kv)?)))
            } else {
                None
            }
        };

        match pending {
            Some((version, write)) => self.persist(version, write).await,
            None => Ok(()),
        }
    }

    /// Remove every attribute. The session file is truncated, not deleted.
    pub async fn clear(&self) -> Result<()> {
        let version = {
            let mut bag = self.bag.write();
            bag.kv.clear();
            bag.version += 1;
            bag.version
        };
        self.persist(version, PendingWrite::Truncate).await
    }

    /// Drop the map and detach from the persistence layer.
    ///
    /// Called when the owning session leaves the provider. The bag stays
    /// usable but nothing written to it is persisted any more.
    pub fn release(&self) {
        *self.backing.write() = Backing::Memory;
        self.bag.write().kv = HashMap::new();
    }

    /// Write the current map to disk even if nothing changed since the last
    /// write, refreshing the file's access time.
    pub async fn flush(&self) -> Result<()> {
        if self.store().is_none() {
            return Ok(());
        }
        let (version, encoded) = {
            let bag = self.bag.read();
            (bag.version, encode_map(&bag.kv)?)
        };
        self.write_through(version, PendingWrite::Save(encoded), true).await
    }

    /// Wait until an in-flight disk write has finished.
    pub(crate) async fn wait_for_writes(&self) {
        drop(self.written.lock().await);
    }

    /// Serialize the attribute map.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_map(&self.bag.read().kv)
    }

    /// Replace the attribute map with a decoded one. Empty input clears it.
    pub fn decode(&self, encoded: &[u8]) -> Result<()> {
        let kv = decode_map(encoded)?;
        self.bag.write().kv = kv;
        Ok(())
    }

    fn store(&self) -> Option<Arc<FileStore>> {
        match &*self.backing.read() {
            Backing::Memory => None,
            Backing::File(store) => Some(Arc::clone(store)),
        }
    }

    async fn persist(&self, version: u64, write: PendingWrite) -> Result<()> {
        self.write_through(version, write, false).await
    }

    async fn write_through(&self, version: u64, write: PendingWrite, force: bool) -> Result<()> {
        let Some(store) = self.store() else {
            return Ok(());
        };

        let mut written = Arc::clone(&self.written).lock_owned().await;
        let superseded = if force {
            *written > version
        } else {
            *written >= version
        };
        if superseded {
            trace!(session_id = %self.sid, version, "Newer snapshot already persisted");
            return Ok(());
        }

        let sid = self.sid.clone();
        let accessed = self.time_accessed();
        let timeout = store.write_timeout();
        let mut task = tokio::task::spawn_blocking(move || match write {
            PendingWrite::Save(bytes) => store.write(&sid, &bytes, accessed),
            PendingWrite::Truncate => store.clear(&sid),
        });

        let outcome = tokio::time::timeout(timeout, &mut task).await;
        match outcome {
            Ok(Ok(result)) => {
                result?;
                *written = (*written).max(version);
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Persistence(e.to_string())),
            Err(_) => {
                warn!(session_id = %self.sid, ?timeout, "Session write timed out");
                // The blocking write cannot be cancelled; the gate stays held
                // until it lands.
                let sid = self.sid.clone();
                tokio::spawn(async move {
                    match task.await {
                        Ok(Ok(())) => *written = (*written).max(version),
                        Ok(Err(e)) => {
                            warn!(session_id = %sid, error = %e, "Late session write failed")
                        }
                        Err(e) => {
                            warn!(session_id = %sid, error = %e, "Late session write task failed")
                        }
                    }
                });
                Err(Error::PersistTimeout(self.sid.clone()))
            }
        }
    }
}
