//! Composition root: turns a [`Config`] into a ready [`AppState`].

use crate::capture::{CaptureService, StubIngestor};
use crate::config::Config;
use crate::idempotency::IdempotencyGate;
use crate::server::AppState;
use crate::store::{InMemoryStore, KeyValueStore};
use crate::validator::{EpcisEventValidator, EventValidator, SchemaEventValidator};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub async fn build_store(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    match config.store.redis_url.as_deref() {
        #[cfg(feature = "redis")]
        Some(url) => {
            let store = crate::store::RedisStore::connect(url).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            tracing::warn!("redis_url is set but this build lacks the `redis` feature, using in-memory store");
            Ok(in_memory_store(config))
        }
        None => {
            info!("Using in-memory idempotency store (single instance only)");
            Ok(in_memory_store(config))
        }
    }
}

/// In-memory store with its expiry sweep running; must be called inside a Tokio runtime.
fn in_memory_store(config: &Config) -> Arc<dyn KeyValueStore> {
    let store = InMemoryStore::new();
    store.spawn_janitor(Duration::from_secs(config.store.purge_interval_secs));
    Arc::new(store)
}

pub fn build_validator(config: &Config) -> Result<Arc<dyn EventValidator>> {
    match &config.validation.schema {
        Some(path) => {
            info!("Validating events against schema {}", path.display());
            Ok(Arc::new(SchemaEventValidator::from_path(path)?))
        }
        None => Ok(Arc::new(EpcisEventValidator)),
    }
}

pub async fn build_state(config: &Config) -> Result<AppState> {
    let store = build_store(config).await?;
    let gate = IdempotencyGate::new(store, config.gate_settings());
    let validator = build_validator(config)?;
    let capture = CaptureService::new(gate, validator, Arc::new(StubIngestor));

    Ok(AppState {
        capture,
        metrics_enabled: config.metrics.enabled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_config_builds_in_memory_state() {
        let state = build_state(&Config::default()).await.unwrap();
        assert!(!state.metrics_enabled);
        assert!(state.capture.gate().try_acquire_lock("k", "org").await);
    }
}
