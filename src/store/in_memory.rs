use super::clock::{Clock, SystemClock};
use super::KeyValueStore;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

/// In-process key-value store with lazy TTL expiry.
///
/// Expired entries stay hidden until [`InMemoryStore::purge_expired`] drops
/// them; [`InMemoryStore::spawn_janitor`] runs that sweep periodically.
/// Only safe as a lock backend for a single process; multi-instance
/// deployments need a shared store such as Redis.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    fn entries(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    fn deadline(&self, ttl_secs: u64) -> StoreResult<DateTime<Utc>> {
        i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .ok_or(StoreError::InvalidTtl(ttl_secs))
    }

    /// Entries held in memory, expired ones included
    pub fn stored_entries(&self) -> StoreResult<usize> {
        Ok(self.entries()?.len())
    }

    /// Sweep expired entries every `every` until the store is dropped.
    pub fn spawn_janitor(&self, every: std::time::Duration) -> JoinHandle<()> {
        let entries = Arc::downgrade(&self.entries);
        let clock = Arc::clone(&self.clock);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(entries) = entries.upgrade() else {
                    debug!("In-memory store dropped, stopping janitor");
                    break;
                };
                let store = InMemoryStore {
                    entries,
                    clock: Arc::clone(&clock),
                };
                if let Err(e) = store.purge_expired() {
                    warn!(error = %e, "Failed to purge expired entries");
                }
            }
        })
    }

    /// Drop expired entries and return how many live keys remain.
    pub fn purge_expired(&self) -> StoreResult<usize> {
        let now = self.clock.now();
        let mut entries = self.entries()?;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        debug!(purged = before - entries.len(), "Purged expired entries");
        Ok(entries.len())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now();
        let entries = self.entries()?;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set_with_expiry(&self, key: &str, ttl_secs: u64, value: &str) -> StoreResult<()> {
        let expires_at = Some(self.deadline(ttl_secs)?);
        let mut entries = self.entries()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_if_not_exists(&self, key: &str, value: &str) -> StoreResult<bool> {
        let now = self.clock.now();
        // Check and insert under one guard so racing callers see exactly one winner
        let mut entries = self.entries()?;
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<()> {
        let now = self.clock.now();
        let deadline = self.deadline(ttl_secs)?;
        let mut entries = self.entries()?;
        if let Some(entry) = entries.get_mut(key).filter(|e| e.is_live(now)) {
            entry.expires_at = Some(deadline);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries()?.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let now = self.clock.now();
        Ok(self.entries()?.get(key).is_some_and(|e| e.is_live(now)))
    }
}
