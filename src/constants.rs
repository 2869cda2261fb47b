//! Key namespace and TTL constants shared by the gate, config, and tests

// Key namespaces (interoperable with other capture instances sharing the store)
pub const RESPONSE_KEY_PREFIX: &str = "idempotency";
pub const LOCK_KEY_PREFIX: &str = "processing";

// Default retention windows
pub const DEFAULT_RESULT_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_LOCK_TTL_SECS: u64 = 5 * 60;

// Upper bound for either TTL
pub const MAX_TTL_SECS: u64 = 30 * 24 * 60 * 60;

// How often the in-memory store sweeps expired entries
pub const DEFAULT_PURGE_INTERVAL_SECS: u64 = 60;

// Lock marker value; only presence matters
pub const LOCK_MARKER: &str = "1";

// Request headers consumed by the capture route
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const ORG_ID_HEADER: &str = "x-org-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const SIGNATURE_HEADER: &str = "x-signature";
pub const DATE_HEADER: &str = "date";
pub const REPLAYED_HEADER: &str = "idempotent-replayed";

/// EPCIS event types accepted by the default validator
pub const EPCIS_EVENT_TYPES: &[&str] = &[
    "ObjectEvent",
    "AggregationEvent",
    "TransactionEvent",
    "TransformationEvent",
    "AssociationEvent",
];

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_EVENT_SCHEMA: &str = "schemas/capture_event.v1.json";
