#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use passport_capture::capture::{CaptureContext, CaptureService, EventIngestor, StubIngestor};
use passport_capture::error::{StoreError, StoreResult};
use passport_capture::idempotency::{GateSettings, IdempotencyGate};
use passport_capture::store::{InMemoryStore, KeyValueStore};
use passport_capture::validator::{EpcisEventValidator, EventValidator, ValidationReport};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

pub fn ctx(org_id: &str, key: &str, request_id: &str) -> CaptureContext {
    CaptureContext {
        org_id: org_id.to_string(),
        idempotency_key: key.to_string(),
        request_id: request_id.to_string(),
    }
}

/// Counts calls, delegating to the EPCIS rules
#[derive(Default)]
pub struct CountingValidator {
    pub calls: AtomicUsize,
}

impl EventValidator for CountingValidator {
    fn validate(&self, events: &[Value]) -> Result<ValidationReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        EpcisEventValidator.validate(events)
    }
}

/// Counts calls, delegating to the stub ingestor
#[derive(Default)]
pub struct CountingIngestor {
    pub calls: AtomicUsize,
}

#[async_trait]
impl EventIngestor for CountingIngestor {
    async fn ingest(&self, events: &[Value], ctx: &CaptureContext) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StubIngestor.ingest(events, ctx).await
    }
}

/// Signals when ingestion starts, then blocks until a permit is released
pub struct GatedIngestor {
    pub entered: mpsc::UnboundedSender<()>,
    pub release: Arc<Semaphore>,
}

#[async_trait]
impl EventIngestor for GatedIngestor {
    async fn ingest(&self, events: &[Value], ctx: &CaptureContext) -> Result<Vec<String>> {
        let _ = self.entered.send(());
        let _permit = self.release.acquire().await?;
        StubIngestor.ingest(events, ctx).await
    }
}

pub struct FailingIngestor;

#[async_trait]
impl EventIngestor for FailingIngestor {
    async fn ingest(&self, _events: &[Value], _ctx: &CaptureContext) -> Result<Vec<String>> {
        anyhow::bail!("database connection refused at 10.0.0.7:5432")
    }
}

pub struct PanickingIngestor;

#[async_trait]
impl EventIngestor for PanickingIngestor {
    async fn ingest(&self, _events: &[Value], _ctx: &CaptureContext) -> Result<Vec<String>> {
        panic!("ingestor blew up")
    }
}

/// In-memory store whose individual operations can be switched to fail
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_set_nx: AtomicBool,
    pub fail_expire: AtomicBool,
    pub fail_delete: AtomicBool,
}

fn outage(op: &str) -> StoreError {
    StoreError::Unavailable(format!("{op}: connection reset"))
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(outage("get"));
        }
        self.inner.get(key).await
    }

    async fn set_with_expiry(&self, key: &str, ttl_secs: u64, value: &str) -> StoreResult<()> {
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(outage("set"));
        }
        self.inner.set_with_expiry(key, ttl_secs, value).await
    }

    async fn set_if_not_exists(&self, key: &str, value: &str) -> StoreResult<bool> {
        if self.fail_set_nx.load(Ordering::SeqCst) {
            return Err(outage("setnx"));
        }
        self.inner.set_if_not_exists(key, value).await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<()> {
        if self.fail_expire.load(Ordering::SeqCst) {
            return Err(outage("expire"));
        }
        self.inner.expire(key, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(outage("delete"));
        }
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists(key).await
    }
}

pub fn service_with(
    store: Arc<dyn KeyValueStore>,
    validator: Arc<dyn EventValidator>,
    ingestor: Arc<dyn EventIngestor>,
) -> CaptureService {
    let gate = IdempotencyGate::new(store, GateSettings::default());
    CaptureService::new(gate, validator, ingestor)
}
