// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/infrastructure/metrics.rs

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Prometheus metrics for the enforcement service itself.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Decision metrics
    checks_total: CounterVec,
    denials_total: CounterVec,
    parse_failures_total: CounterVec,
    check_duration_seconds: HistogramVec,
    ratelimit_checks_total: CounterVec,
    timeouts_total: CounterVec,
    backpressure_rejections_total: CounterVec,

    // Controller metrics
    reconciles_total: CounterVec,
    overrides_skipped_tenants: Gauge,
    watch_restarts_total: Counter,

    // State gauges
    active_tenants: Gauge,
    active_buckets: Gauge,
    inflight_checks: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let checks_total = CounterVec::new(
            Opts::new(
                "tollgate_checks_total",
                "Total number of ext-authz checks by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(checks_total.clone()))?;

        let denials_total = CounterVec::new(
            Opts::new(
                "tollgate_denials_total",
                "Total number of denied requests by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(denials_total.clone()))?;

        let parse_failures_total = CounterVec::new(
            Opts::new(
                "tollgate_parse_failures_total",
                "Total number of payload parse failures by guessed cause",
            ),
            &["cause"],
        )?;
        registry.register(Box::new(parse_failures_total.clone()))?;

        let check_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "tollgate_check_duration_seconds",
                "Authorization check duration in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25,
            ]),
            &["surface"],
        )?;
        registry.register(Box::new(check_duration_seconds.clone()))?;

        let ratelimit_checks_total = CounterVec::new(
            Opts::new(
                "tollgate_ratelimit_checks_total",
                "Total number of descriptor ratelimit checks by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(ratelimit_checks_total.clone()))?;

        let timeouts_total = CounterVec::new(
            Opts::new(
                "tollgate_timeouts_total",
                "Checks abandoned at the per-call deadline",
            ),
            &["surface"],
        )?;
        registry.register(Box::new(timeouts_total.clone()))?;

        let backpressure_rejections_total = CounterVec::new(
            Opts::new(
                "tollgate_backpressure_rejections_total",
                "Checks rejected by the in-flight ceiling",
            ),
            &["surface"],
        )?;
        registry.register(Box::new(backpressure_rejections_total.clone()))?;

        let reconciles_total = CounterVec::new(
            Opts::new(
                "tollgate_reconciles_total",
                "Overrides reconciles by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(reconciles_total.clone()))?;

        let overrides_skipped_tenants = Gauge::new(
            "tollgate_overrides_skipped_tenants",
            "Tenants skipped in the last reconcile due to unparseable entries",
        )?;
        registry.register(Box::new(overrides_skipped_tenants.clone()))?;

        let watch_restarts_total = Counter::new(
            "tollgate_watch_restarts_total",
            "Times the overrides watch subscription was re-established",
        )?;
        registry.register(Box::new(watch_restarts_total.clone()))?;

        let active_tenants = Gauge::new(
            "tollgate_active_tenants",
            "Tenants currently present in the limit store",
        )?;
        registry.register(Box::new(active_tenants.clone()))?;

        let active_buckets = Gauge::new(
            "tollgate_active_buckets",
            "Token buckets currently allocated",
        )?;
        registry.register(Box::new(active_buckets.clone()))?;

        let inflight_checks = Gauge::new(
            "tollgate_inflight_checks",
            "Authorization checks currently in flight",
        )?;
        registry.register(Box::new(inflight_checks.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            checks_total,
            denials_total,
            parse_failures_total,
            check_duration_seconds,
            ratelimit_checks_total,
            timeouts_total,
            backpressure_rejections_total,
            reconciles_total,
            overrides_skipped_tenants,
            watch_restarts_total,
            active_tenants,
            active_buckets,
            inflight_checks,
        })
    }

    pub fn record_check(&self, allowed: bool, duration_secs: f64) {
        let outcome = if allowed { "allowed" } else { "denied" };
        self.checks_total.with_label_values(&[outcome]).inc();
        self.check_duration_seconds
            .with_label_values(&["ext_authz"])
            .observe(duration_secs);
    }

    pub fn record_denial(&self, reason: &str) {
        self.denials_total.with_label_values(&[reason]).inc();
    }

    pub fn record_parse_failure(&self, cause: &str) {
        self.parse_failures_total.with_label_values(&[cause]).inc();
    }

    pub fn record_ratelimit_check(&self, over_limit: bool) {
        let outcome = if over_limit { "over_limit" } else { "ok" };
        self.ratelimit_checks_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_timeout(&self, surface: &str) {
        self.timeouts_total.with_label_values(&[surface]).inc();
    }

    pub fn record_backpressure(&self, surface: &str) {
        self.backpressure_rejections_total
            .with_label_values(&[surface])
            .inc();
    }

    pub fn record_reconcile(&self, success: bool, skipped_tenants: usize) {
        let outcome = if success { "success" } else { "error" };
        self.reconciles_total.with_label_values(&[outcome]).inc();
        if success {
            self.overrides_skipped_tenants.set(skipped_tenants as f64);
        }
    }

    pub fn record_watch_restart(&self) {
        self.watch_restarts_total.inc();
    }

    pub fn set_active_tenants(&self, count: usize) {
        self.active_tenants.set(count as f64);
    }

    pub fn set_active_buckets(&self, count: usize) {
        self.active_buckets.set(count as f64);
    }

    pub fn set_inflight_checks(&self, count: i64) {
        self.inflight_checks.set(count as f64);
    }

    /// Gathers all metrics in Prometheus text format.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(metrics.gather().is_ok());
    }

    #[test]
    fn test_record_check() {
        let metrics = Metrics::new().unwrap();
        metrics.record_check(true, 0.002);
        metrics.record_check(false, 0.001);

        let output = metrics.gather().unwrap();
        assert!(output.contains("tollgate_checks_total"));
        assert!(output.contains("tollgate_check_duration_seconds"));
    }

    #[test]
    fn test_record_denial_by_reason() {
        let metrics = Metrics::new().unwrap();
        metrics.record_denial("samples_rate_exceeded");

        let output = metrics.gather().unwrap();
        assert!(output.contains("samples_rate_exceeded"));
    }

    #[test]
    fn test_record_reconcile() {
        let metrics = Metrics::new().unwrap();
        metrics.record_reconcile(true, 2);

        let output = metrics.gather().unwrap();
        assert!(output.contains("tollgate_reconciles_total"));
        assert!(output.contains("tollgate_overrides_skipped_tenants 2"));
    }
}
