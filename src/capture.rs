//! Capture orchestration: validates and ingests an event batch behind the
//! idempotency gate.
//!
//! Request states:
//!
//! ```text
//! RECEIVED -> CHECK_CACHE -+- hit  -> DONE (replay stored body)
//!                          +- miss -> ACQUIRE_LOCK -+- held -> PROCESSING_CONFLICT
//!                                                   +- ok   -> VALIDATE -+- valid   -> INGEST -> STORE_RESULT -> RELEASE_LOCK -> DONE
//!                                                                        +- invalid -> RELEASE_LOCK -> REJECTED
//! ```
//!
//! The result is stored before the lock is released so a racing retry sees
//! the cached response instead of re-acquiring the lock. The lock is released
//! on every path once acquired, even when the caller goes away mid-request;
//! its TTL is only the crash backstop.

use crate::error::CaptureError;
use crate::idempotency::{CachedResponse, IdempotencyGate, LockAttempt};
use crate::metrics::CaptureMetrics;
use crate::validator::EventValidator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// Caller coordinates for one capture request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureContext {
    pub org_id: String,
    pub idempotency_key: String,
    /// Diagnostic correlation only; never used for deduplication
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    pub accepted: bool,
    pub ingested_count: usize,
    pub ids: Vec<String>,
}

/// What a capture request produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Processed by this request
    Fresh { result: CaptureResult, body: String },
    /// Answered from the idempotency cache without processing
    Replayed { body: String },
}

impl CaptureOutcome {
    /// Serialized response body. Identical for the first response and every replay.
    pub fn body(&self) -> &str {
        match self {
            CaptureOutcome::Fresh { body, .. } | CaptureOutcome::Replayed { body } => body,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, CaptureOutcome::Replayed { .. })
    }

    pub fn result(&self) -> serde_json::Result<CaptureResult> {
        match self {
            CaptureOutcome::Fresh { result, .. } => Ok(result.clone()),
            CaptureOutcome::Replayed { body } => serde_json::from_str(body),
        }
    }
}

/// Deterministic id for the `index`-th event of a request
pub fn event_id(request_id: &str, index: usize) -> String {
    format!("event-{request_id}-{index}")
}

/// Persistence step for validated events; returns one id per event.
#[async_trait]
pub trait EventIngestor: Send + Sync {
    async fn ingest(&self, events: &[Value], ctx: &CaptureContext) -> anyhow::Result<Vec<String>>;
}

/// Assigns ids without persisting anything
#[derive(Debug, Default, Clone, Copy)]
pub struct StubIngestor;

#[async_trait]
impl EventIngestor for StubIngestor {
    async fn ingest(&self, events: &[Value], ctx: &CaptureContext) -> anyhow::Result<Vec<String>> {
        Ok((0..events.len())
            .map(|index| event_id(&ctx.request_id, index))
            .collect())
    }
}

#[derive(Clone)]
pub struct CaptureService {
    gate: IdempotencyGate,
    validator: Arc<dyn EventValidator>,
    ingestor: Arc<dyn EventIngestor>,
}

impl CaptureService {
    pub fn new(
        gate: IdempotencyGate,
        validator: Arc<dyn EventValidator>,
        ingestor: Arc<dyn EventIngestor>,
    ) -> Self {
        Self {
            gate,
            validator,
            ingestor,
        }
    }

    pub fn gate(&self) -> &IdempotencyGate {
        &self.gate
    }

    /// Validate and ingest one batch. Does not consult the idempotency gate.
    pub async fn capture_events(
        &self,
        events: Option<&Value>,
        ctx: &CaptureContext,
    ) -> Result<CaptureResult, CaptureError> {
        let events = match events {
            Some(Value::Array(events)) if !events.is_empty() => events,
            Some(Value::Array(_)) => return Err(CaptureError::invalid("events must not be empty")),
            _ => return Err(CaptureError::invalid("events must be an array")),
        };

        let report = self.validator.validate(events).map_err(|e| {
            error!(
                org_id = %ctx.org_id,
                idempotency_key = %ctx.idempotency_key,
                request_id = %ctx.request_id,
                error = %e,
                "Event validator failed"
            );
            CaptureError::Internal
        })?;
        if !report.is_valid {
            return Err(CaptureError::InvalidInput {
                errors: report.errors,
            });
        }

        let ids = self.ingestor.ingest(events, ctx).await.map_err(|e| {
            error!(
                org_id = %ctx.org_id,
                idempotency_key = %ctx.idempotency_key,
                request_id = %ctx.request_id,
                error = %e,
                "Event ingestion failed"
            );
            CaptureError::Internal
        })?;

        Ok(CaptureResult {
            accepted: true,
            ingested_count: ids.len(),
            ids,
        })
    }

    /// Full request flow: replay from cache, or process under the lock.
    ///
    /// `payload_sha256` is recorded next to the stored response so replays
    /// with a different payload under the same key can be flagged.
    pub async fn handle(
        &self,
        events: Option<&Value>,
        ctx: &CaptureContext,
        payload_sha256: Option<String>,
    ) -> Result<CaptureOutcome, CaptureError> {
        let span = info_span!(
            "capture",
            org_id = %ctx.org_id,
            idempotency_key = %ctx.idempotency_key,
            request_id = %ctx.request_id
        );
        self.handle_inner(events, ctx, payload_sha256)
            .instrument(span)
            .await
    }

    async fn handle_inner(
        &self,
        events: Option<&Value>,
        ctx: &CaptureContext,
        payload_sha256: Option<String>,
    ) -> Result<CaptureOutcome, CaptureError> {
        let started = Instant::now();
        let key = ctx.idempotency_key.as_str();
        let org_id = ctx.org_id.as_str();

        if let Some(cached) = self.gate.lookup(key, org_id).await {
            if let (Some(stored), Some(current)) = (&cached.payload_sha256, &payload_sha256) {
                if stored != current {
                    warn!("Idempotency key reused with a different payload, replaying original response");
                }
            }
            CaptureMetrics::record_replayed();
            let duration_ms = started.elapsed().as_millis() as u64;
            info!(duration_ms, "Replayed cached capture response");
            return Ok(CaptureOutcome::Replayed { body: cached.body });
        }

        // Locking and settling run detached so a dropped caller still caches
        // the result and releases the lock.
        let service = self.clone();
        let events = events.cloned();
        let task_ctx = ctx.clone();
        let settle = tokio::spawn(
            async move {
                service
                    .lock_and_settle(events.as_ref(), &task_ctx, payload_sha256, started)
                    .await
            }
            .in_current_span(),
        );

        match settle.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                error!(error = %join_error, "Capture settle task aborted");
                Err(CaptureError::Internal)
            }
        }
    }

    /// Takes the lock, processes the batch, stores the result on success,
    /// and releases the lock on every path once acquired.
    async fn lock_and_settle(
        &self,
        events: Option<&Value>,
        ctx: &CaptureContext,
        payload_sha256: Option<String>,
        started: Instant,
    ) -> Result<CaptureOutcome, CaptureError> {
        let key = ctx.idempotency_key.as_str();
        let org_id = ctx.org_id.as_str();

        let locked = match self.gate.try_lock(key, org_id).await {
            LockAttempt::Acquired => true,
            LockAttempt::Held => {
                CaptureMetrics::record_conflict();
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(duration_ms, "Capture already in progress for this key");
                return Err(CaptureError::AlreadyProcessing);
            }
            LockAttempt::Unavailable => {
                warn!("Idempotency store unavailable, processing without lock");
                false
            }
        };

        let processed = self.process_isolated(events, ctx).await.and_then(|result| {
            let body = serde_json::to_string(&result).map_err(|e| {
                error!(error = %e, "Failed to encode capture result");
                CaptureError::Internal
            })?;
            Ok((result, body))
        });

        let duration_ms = started.elapsed().as_millis() as u64;
        let duration_secs = started.elapsed().as_secs_f64();
        match processed {
            Ok((result, body)) => {
                let cached = CachedResponse {
                    body: body.clone(),
                    payload_sha256,
                };
                self.gate.store(key, org_id, &cached).await;
                if locked {
                    self.gate.release_lock(key, org_id).await;
                }
                CaptureMetrics::record_accepted(result.ingested_count, duration_secs);
                info!(duration_ms, ingested = result.ingested_count, "Capture accepted");
                Ok(CaptureOutcome::Fresh { result, body })
            }
            Err(err) => {
                if locked {
                    self.gate.release_lock(key, org_id).await;
                }
                match &err {
                    CaptureError::InvalidInput { errors } => {
                        CaptureMetrics::record_rejected(duration_secs);
                        info!(duration_ms, errors = ?errors, "Capture rejected");
                    }
                    _ => {
                        CaptureMetrics::record_failure(duration_secs);
                        error!(duration_ms, error = %err, "Capture failed");
                    }
                }
                Err(err)
            }
        }
    }

    /// Runs validation and ingestion on its own task so a panic in either
    /// surfaces as an internal error and the lock still gets released.
    async fn process_isolated(
        &self,
        events: Option<&Value>,
        ctx: &CaptureContext,
    ) -> Result<CaptureResult, CaptureError> {
        let service = self.clone();
        let events = events.cloned();
        let task_ctx = ctx.clone();
        let task = tokio::spawn(
            async move { service.capture_events(events.as_ref(), &task_ctx).await }
                .in_current_span(),
        );

        match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                error!(error = %join_error, "Capture processing task aborted");
                Err(CaptureError::Internal)
            }
        }
    }
}
