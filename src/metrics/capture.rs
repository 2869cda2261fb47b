//! Capture Phase Metrics
//!
//! Outcomes of capture requests: fresh acceptances, replays served from the
//! idempotency cache, lock conflicts, client rejections, and internal failures.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct CaptureMetrics;

impl CaptureMetrics {
    pub fn record_accepted(events_ingested: usize, duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "capture", "accepted")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "capture", "events_ingested"))
            .increment(events_ingested as u64);
        Self::record_duration(duration_secs);
    }

    pub fn record_replayed() {
        ::metrics::counter!(phase_metric!(counter, "capture", "replayed")).increment(1);
    }

    pub fn record_conflict() {
        ::metrics::counter!(phase_metric!(counter, "capture", "conflicts")).increment(1);
    }

    pub fn record_rejected(duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "capture", "rejected")).increment(1);
        Self::record_duration(duration_secs);
    }

    pub fn record_failure(duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "capture", "failures")).increment(1);
        Self::record_duration(duration_secs);
    }

    fn record_duration(duration_secs: f64) {
        ::metrics::histogram!(phase_metric!(histogram, "capture", "duration_seconds"))
            .record(duration_secs);
    }
}

impl PhaseMetrics for CaptureMetrics {
    fn register_metrics() {
        use metrics::{describe_counter, describe_histogram};

        for doc in Self::metrics_documentation() {
            match doc.metric_type {
                MetricType::Counter => describe_counter!(doc.name, doc.help),
                MetricType::Histogram => describe_histogram!(doc.name, doc.help),
            }
        }
    }

    fn phase_name() -> &'static str {
        "capture"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "capture", "accepted"),
                metric_type: MetricType::Counter,
                help: "Capture requests processed and accepted",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "capture", "events_ingested"),
                metric_type: MetricType::Counter,
                help: "Events ingested by accepted capture requests",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "capture", "replayed"),
                metric_type: MetricType::Counter,
                help: "Capture requests answered from the idempotency cache",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "capture", "conflicts"),
                metric_type: MetricType::Counter,
                help: "Capture requests that lost the processing lock race",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "capture", "rejected"),
                metric_type: MetricType::Counter,
                help: "Capture requests rejected for malformed or invalid events",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "capture", "failures"),
                metric_type: MetricType::Counter,
                help: "Capture requests that failed unexpectedly",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "capture", "duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time spent processing a capture request under the lock",
                labels: vec![],
            },
        ]
    }
}
