#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod capture;
pub mod config;
pub mod constants;
pub mod error;
pub mod idempotency;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod store;
pub mod validator;

pub use capture::{CaptureContext, CaptureOutcome, CaptureResult, CaptureService, EventIngestor};
pub use error::{CaptureError, StoreError};
pub use idempotency::{CachedResponse, GateSettings, IdempotencyGate, LockAttempt};
pub use store::{InMemoryStore, KeyValueStore};
pub use validator::{EventValidator, ValidationReport};
