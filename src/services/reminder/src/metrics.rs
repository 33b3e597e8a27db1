//! Metrics collection for the reminder service
//!
//! Tracks scan activity, delivery outcomes and delivery latency in a
//! dedicated prometheus registry, exported through the `/metrics` endpoint.

use std::sync::Arc;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use tracing::info;

use crate::config::MetricsConfig;
use crate::error::Result;

#[derive(Clone)]
pub struct ReminderMetrics {
    registry: Arc<Registry>,

    scans_total: IntCounter,
    sends_total: IntCounter,
    send_failures: IntCounterVec,
    skips: IntCounterVec,
    delivery_duration: Histogram,
    scan_candidates: IntGauge,
}

impl ReminderMetrics {
    pub fn new(config: &MetricsConfig) -> Result<Self> {
        let registry = Registry::new();

        let scans_total = IntCounter::with_opts(
            Opts::new("scans_total", "Number of due-notification scan passes")
                .namespace(config.namespace.clone()),
        )?;

        let sends_total = IntCounter::with_opts(
            Opts::new("sends_total", "Number of reminders delivered successfully")
                .namespace(config.namespace.clone()),
        )?;

        let send_failures = IntCounterVec::new(
            Opts::new("send_failures_total", "Number of failed delivery attempts")
                .namespace(config.namespace.clone()),
            &["kind"],
        )?;

        let skips = IntCounterVec::new(
            Opts::new("skips_total", "Number of scan candidates skipped by a guard")
                .namespace(config.namespace.clone()),
            &["reason"],
        )?;

        let delivery_duration = Histogram::with_opts(
            HistogramOpts::new(
                "delivery_duration_seconds",
                "Time taken for one push delivery attempt",
            )
            .namespace(config.namespace.clone())
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;

        let scan_candidates = IntGauge::with_opts(
            Opts::new(
                "scan_candidates",
                "Users inside the due window on the most recent scan",
            )
            .namespace(config.namespace.clone()),
        )?;

        registry.register(Box::new(scans_total.clone()))?;
        registry.register(Box::new(sends_total.clone()))?;
        registry.register(Box::new(send_failures.clone()))?;
        registry.register(Box::new(skips.clone()))?;
        registry.register(Box::new(delivery_duration.clone()))?;
        registry.register(Box::new(scan_candidates.clone()))?;

        info!("Reminder metrics initialized");

        Ok(Self {
            registry: Arc::new(registry),
            scans_total,
            sends_total,
            send_failures,
            skips,
            delivery_duration,
            scan_candidates,
        })
    }

    pub fn record_scan(&self, candidates: usize) {
        self.scans_total.inc();
        self.scan_candidates.set(candidates as i64);
    }

    pub fn record_sent(&self, duration_seconds: f64) {
        self.sends_total.inc();
        self.delivery_duration.observe(duration_seconds);
    }

    pub fn record_failure(&self, kind: &str, duration_seconds: f64) {
        self.send_failures.with_label_values(&[kind]).inc();
        self.delivery_duration.observe(duration_seconds);
    }

    pub fn record_skip(&self, reason: &str) {
        self.skips.with_label_values(&[reason]).inc();
    }

    /// Export all metrics in the Prometheus text format.
    pub fn export(&self) -> Result<String> {
        let encoder = prometheus::TextEncoder::new();
        Ok(encoder.encode_to_string(&self.registry.gather())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> ReminderMetrics {
        ReminderMetrics::new(&MetricsConfig {
            enabled: true,
            endpoint: "/metrics".to_string(),
            namespace: "test_reminder".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_export_contains_recorded_values() {
        let m = metrics();
        m.record_scan(7);
        m.record_sent(0.12);
        m.record_failure("token_invalid", 0.05);
        m.record_skip("no_token");

        let exported = m.export().unwrap();
        assert!(exported.contains("test_reminder_scans_total 1"));
        assert!(exported.contains("test_reminder_sends_total 1"));
        assert!(exported.contains("kind=\"token_invalid\""));
        assert!(exported.contains("reason=\"no_token\""));
        assert!(exported.contains("test_reminder_scan_candidates 7"));
    }

    #[test]
    fn test_counters_accumulate() {
        let m = metrics();
        m.record_sent(0.1);
        m.record_sent(0.2);

        let exported = m.export().unwrap();
        assert!(exported.contains("test_reminder_sends_total 2"));
    }
}
