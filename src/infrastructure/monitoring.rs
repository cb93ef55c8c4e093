// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/infrastructure/monitoring.rs

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{DenialRecord, ParseDiagnostics};
use crate::infrastructure::metrics::Metrics;

/// Pairs structured enforcement logging with metric updates so callers emit
/// both through one call.
#[derive(Clone)]
pub struct EnforcementMonitor {
    metrics: Arc<Metrics>,
}

impl EnforcementMonitor {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Records a denied request.
    pub fn record_denial(&self, record: &DenialRecord) {
        warn!(
            event = "request_denied",
            tenant = %record.tenant,
            reason = %record.reason,
            series = record.observed.series,
            samples = record.observed.samples,
            body_bytes = record.observed.body_bytes,
            "Request denied"
        );
        self.metrics.record_denial(record.reason.as_str());
    }

    /// Records a payload parse failure, whether or not the request was
    /// ultimately allowed by `failure_mode_allow`.
    pub fn record_parse_failure(&self, tenant: &str, diagnostics: &ParseDiagnostics, allowed: bool) {
        warn!(
            event = "parse_failed",
            tenant = %tenant,
            encoding = %diagnostics.encoding,
            body_bytes = diagnostics.body_bytes,
            guessed_cause = %diagnostics.guessed_cause,
            allowed,
            "Payload parse failed"
        );
        self.metrics.record_parse_failure(&diagnostics.guessed_cause);
    }

    /// Records a check abandoned at its deadline.
    pub fn record_timeout(&self, surface: &str, tenant: &str) {
        warn!(
            event = "check_timeout",
            surface = %surface,
            tenant = %tenant,
            "Check abandoned at deadline, returning conservative decision"
        );
        self.metrics.record_timeout(surface);
    }

    /// Records a check shed by the in-flight ceiling.
    pub fn record_backpressure(&self, surface: &str) {
        warn!(
            event = "backpressure",
            surface = %surface,
            "In-flight ceiling reached, returning conservative decision"
        );
        self.metrics.record_backpressure(surface);
    }

    /// Records the outcome of one overrides reconcile.
    pub fn record_reconcile(&self, applied: usize, deleted: usize, skipped: usize) {
        info!(
            event = "overrides_reconciled",
            applied, deleted, skipped, "Overrides reconciled"
        );
        self.metrics.record_reconcile(true, skipped);
    }

    pub fn record_reconcile_error(&self, error: &dyn std::fmt::Display) {
        warn!(event = "reconcile_failed", error = %error, "Overrides reconcile failed");
        self.metrics.record_reconcile(false, 0);
    }

    pub fn record_watch_lost(&self, error: &str) {
        warn!(
            event = "watch_lost",
            error = %error,
            "Overrides watch lost, entering poll fallback"
        );
    }

    pub fn record_watch_established(&self) {
        info!(event = "watch_established", "Overrides watch established");
        self.metrics.record_watch_restart();
    }
}
