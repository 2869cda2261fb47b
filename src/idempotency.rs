//! Idempotency gate: duplicate suppression and single-flight locking for
//! capture requests.
//!
//! Two records live in the shared store for every `(org_id, idempotency_key)`:
//!
//! - `idempotency:<org>:<key>`: the serialized response of a completed
//!   capture, kept for the result TTL (24h by default) and never rewritten.
//! - `processing:<org>:<key>`: a lock marker created with set-if-not-exists
//!   and expired after the lock TTL (5m by default) so a crashed worker
//!   cannot block the key forever.
//!
//! Every store failure degrades to "not cached" / "not locked". Duplicate
//! suppression sits on top of a processing path that is already correct, so
//! a store outage must never turn into a rejected capture.

use crate::constants::{
    DEFAULT_LOCK_TTL_SECS, DEFAULT_RESULT_TTL_SECS, LOCK_KEY_PREFIX, LOCK_MARKER,
    RESPONSE_KEY_PREFIX,
};
use crate::metrics::IdempotencyMetrics;
use crate::store::KeyValueStore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

pub fn response_key(org_id: &str, idempotency_key: &str) -> String {
    format!("{RESPONSE_KEY_PREFIX}:{org_id}:{idempotency_key}")
}

pub fn lock_key(org_id: &str, idempotency_key: &str) -> String {
    format!("{LOCK_KEY_PREFIX}:{org_id}:{idempotency_key}")
}

/// Hex SHA-256 of the raw request payload
pub fn payload_fingerprint(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

fn idempotency_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9._:\-]{1,255}$").expect("valid regex"))
}

fn org_id_pattern() -> &'static Regex {
    // No ':' so that org and key cannot be shifted into each other inside a store key
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9._\-]{1,128}$").expect("valid regex"))
}

pub fn is_valid_idempotency_key(key: &str) -> bool {
    idempotency_key_pattern().is_match(key)
}

pub fn is_valid_org_id(org_id: &str) -> bool {
    org_id_pattern().is_match(org_id)
}

/// Completed capture response as stored under the response key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Response body exactly as first returned to the caller
    pub body: String,
    /// Fingerprint of the request that produced `body`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_sha256: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    /// This caller created the lock marker
    Acquired,
    /// Another attempt holds the lock
    Held,
    /// The store could not be reached; nothing is known about other attempts
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSettings {
    pub result_ttl_secs: u64,
    pub lock_ttl_secs: u64,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            result_ttl_secs: DEFAULT_RESULT_TTL_SECS,
            lock_ttl_secs: DEFAULT_LOCK_TTL_SECS,
        }
    }
}

/// Owns the response and lock records; nothing else writes those keys.
#[derive(Clone)]
pub struct IdempotencyGate {
    store: Arc<dyn KeyValueStore>,
    settings: GateSettings,
}

impl IdempotencyGate {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: GateSettings) -> Self {
        Self { store, settings }
    }

    /// Previously stored response, or `None` on miss, store failure, or an
    /// undecodable record.
    pub async fn lookup(&self, idempotency_key: &str, org_id: &str) -> Option<CachedResponse> {
        let key = response_key(org_id, idempotency_key);
        let raw = match self.store.get(&key).await {
            Ok(raw) => raw?,
            Err(e) => {
                IdempotencyMetrics::record_store_error("lookup");
                warn!(org_id, idempotency_key, error = %e, "Idempotency lookup failed, treating as uncached");
                return None;
            }
        };

        match serde_json::from_str::<CachedResponse>(&raw) {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!(org_id, idempotency_key, error = %e, "Discarding undecodable cached response");
                None
            }
        }
    }

    /// Attempt to create the processing lock, distinguishing contention from
    /// an unreachable store.
    pub async fn try_lock(&self, idempotency_key: &str, org_id: &str) -> LockAttempt {
        let key = lock_key(org_id, idempotency_key);
        match self.store.set_if_not_exists(&key, LOCK_MARKER).await {
            Ok(true) => {}
            Ok(false) => {
                IdempotencyMetrics::record_lock_contended();
                debug!(org_id, idempotency_key, "Processing lock already held");
                return LockAttempt::Held;
            }
            Err(e) => {
                IdempotencyMetrics::record_store_error("acquire_lock");
                warn!(org_id, idempotency_key, error = %e, "Failed to acquire processing lock");
                return LockAttempt::Unavailable;
            }
        }

        // Marker exists now; the TTL is a follow-up step and only best-effort
        if let Err(e) = self.store.expire(&key, self.settings.lock_ttl_secs).await {
            IdempotencyMetrics::record_store_error("expire_lock");
            warn!(org_id, idempotency_key, error = %e, "Failed to set processing lock TTL");
        }

        IdempotencyMetrics::record_lock_acquired();
        LockAttempt::Acquired
    }

    /// `true` only if this caller created the lock marker
    pub async fn try_acquire_lock(&self, idempotency_key: &str, org_id: &str) -> bool {
        self.try_lock(idempotency_key, org_id).await == LockAttempt::Acquired
    }

    pub async fn release_lock(&self, idempotency_key: &str, org_id: &str) {
        let key = lock_key(org_id, idempotency_key);
        if let Err(e) = self.store.delete(&key).await {
            IdempotencyMetrics::record_store_error("release_lock");
            warn!(org_id, idempotency_key, error = %e, "Failed to release processing lock, leaving it to expire");
        }
    }

    pub async fn store(&self, idempotency_key: &str, org_id: &str, response: &CachedResponse) {
        let key = response_key(org_id, idempotency_key);
        let encoded = match serde_json::to_string(response) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(org_id, idempotency_key, error = %e, "Failed to encode cached response");
                return;
            }
        };
        if let Err(e) = self
            .store
            .set_with_expiry(&key, self.settings.result_ttl_secs, &encoded)
            .await
        {
            IdempotencyMetrics::record_store_error("store");
            warn!(org_id, idempotency_key, error = %e, "Failed to store idempotent response");
        }
    }
}
