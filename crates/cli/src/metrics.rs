//! Prometheus metrics for the run.
//!
//! Batch runs have no scrape endpoint, so the registry is written out once
//! at exit in text exposition format (textfile-collector style).

use once_cell::sync::Lazy;
use prometheus::{self, Encoder, Gauge, IntGauge, Registry, TextEncoder};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Exit code of the finished run.
pub static RUN_EXIT_CODE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("windrun_run_exit_code", "Exit code of the last run").unwrap()
});

/// Wall-clock duration of the run in seconds.
pub static RUN_DURATION: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("windrun_run_duration_seconds", "Duration of the last run").unwrap()
});

fn register_metrics(registry: &Registry) {
    registry.register(Box::new(RUN_EXIT_CODE.clone())).unwrap();
    registry.register(Box::new(RUN_DURATION.clone())).unwrap();

    for metric in windrun_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contains_run_and_core_metrics() {
        RUN_EXIT_CODE.set(0);
        RUN_DURATION.set(12.5);
        windrun_core::metrics::RECONCILE_TURNS
            .with_label_values(&["idle"])
            .inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("windrun_run_exit_code 0"));
        assert!(output.contains("windrun_run_duration_seconds 12.5"));
        assert!(output.contains("windrun_reconcile_turns_total"));
    }
}
