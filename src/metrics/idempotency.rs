//! Idempotency Gate Metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct IdempotencyMetrics;

impl IdempotencyMetrics {
    /// A store call failed and the gate fell back to uncached/unlocked behavior
    pub fn record_store_error(operation: &'static str) {
        ::metrics::counter!(
            phase_metric!(counter, "idempotency", "store_errors"),
            "operation" => operation
        )
        .increment(1);
    }

    pub fn record_lock_acquired() {
        ::metrics::counter!(phase_metric!(counter, "idempotency", "locks_acquired")).increment(1);
    }

    pub fn record_lock_contended() {
        ::metrics::counter!(phase_metric!(counter, "idempotency", "locks_contended")).increment(1);
    }
}

impl PhaseMetrics for IdempotencyMetrics {
    fn register_metrics() {
        use metrics::describe_counter;

        for doc in Self::metrics_documentation() {
            describe_counter!(doc.name, doc.help);
        }
    }

    fn phase_name() -> &'static str {
        "idempotency"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "idempotency", "store_errors"),
                metric_type: MetricType::Counter,
                help: "Key-value store failures swallowed by the idempotency gate",
                labels: vec!["operation"],
            },
            MetricDoc {
                name: phase_metric!(counter, "idempotency", "locks_acquired"),
                metric_type: MetricType::Counter,
                help: "Processing locks acquired",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "idempotency", "locks_contended"),
                metric_type: MetricType::Counter,
                help: "Lock attempts that found another request already processing",
                labels: vec![],
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_documentation() {
        let docs = IdempotencyMetrics::metrics_documentation();
        assert_eq!(docs.len(), 3);
        assert!(docs
            .iter()
            .all(|d| d.name.starts_with("passport_idempotency_")));
    }
}
