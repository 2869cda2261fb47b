//! Metrics for the capture service
//!
//! Each phase defines its own metrics in a dedicated submodule so names stay
//! unique and documented in one place. Recording is a no-op until
//! [`init_metrics`] installs the Prometheus recorder.

pub mod capture;
pub mod idempotency;
pub mod registry;

pub use capture::CaptureMetrics;
pub use idempotency::IdempotencyMetrics;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Once, OnceLock};
use tracing::{info, warn};

static INIT: Once = Once::new();
static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder and register every phase's metrics.
///
/// Idempotent. Returns the render handle, or `None` when another recorder was
/// already installed by the host process.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    INIT.call_once(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HANDLE.set(handle);
            registry::register_all_metrics();
            info!("Prometheus recorder installed");
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
        }
    });
    HANDLE.get()
}

/// Prometheus text exposition of everything recorded so far
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

/// Implemented once per phase to register and document its metrics
pub trait PhaseMetrics {
    fn register_metrics();

    fn phase_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub enum MetricType {
    Counter,
    Histogram,
}

/// Builds metric names following `passport_{phase}_{name}[_total]`
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("passport_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("passport_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
