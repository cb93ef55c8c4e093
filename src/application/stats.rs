// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/application/stats.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use super::buckets::Clock;
use crate::domain::{Decision, ObservedCounts};

/// EWMA half-life used for all tenant metrics.
pub const EWMA_HALF_LIFE_SECS: f64 = 30.0;

/// Exponentially weighted moving average with a fixed half-life.
///
/// `value = f · value + (1 − f) · sample`, `f = 0.5^(Δt / half_life)`.
#[derive(Debug, Clone, Copy)]
pub struct Ewma {
    half_life_secs: f64,
    value: f64,
    last_update: Option<Instant>,
}

impl Ewma {
    pub fn new(half_life_secs: f64) -> Self {
        Self {
            half_life_secs,
            value: 0.0,
            last_update: None,
        }
    }

    pub fn update(&mut self, sample: f64, now: Instant) {
        match self.last_update {
            None => self.value = sample,
            Some(prev) => {
                let dt = now.saturating_duration_since(prev).as_secs_f64();
                let f = 0.5_f64.powf(dt / self.half_life_secs);
                self.value = f * self.value + (1.0 - f) * sample;
            }
        }
        self.last_update = Some(now);
    }

    /// Current average with decay applied for the elapsed silence, so an
    /// idle tenant's rates drain toward zero between requests.
    pub fn read(&self, now: Instant) -> f64 {
        match self.last_update {
            None => 0.0,
            Some(prev) => {
                let dt = now.saturating_duration_since(prev).as_secs_f64();
                self.value * 0.5_f64.powf(dt / self.half_life_secs)
            }
        }
    }
}

/// Event-rate estimator: each observation contributes `weight / Δt` as an
/// instantaneous rate sample into the EWMA.
#[derive(Debug, Clone, Copy)]
struct RateEwma {
    ewma: Ewma,
    last_event: Option<Instant>,
}

impl RateEwma {
    fn new() -> Self {
        Self {
            ewma: Ewma::new(EWMA_HALF_LIFE_SECS),
            last_event: None,
        }
    }

    fn observe(&mut self, weight: f64, now: Instant) {
        if let Some(prev) = self.last_event {
            let dt = now.saturating_duration_since(prev).as_secs_f64().max(1e-3);
            self.ewma.update(weight / dt, now);
        }
        self.last_event = Some(now);
    }

    fn read(&self, now: Instant) -> f64 {
        self.ewma.read(now)
    }
}

#[derive(Debug)]
struct TenantStats {
    allowed: u64,
    denied: u64,
    rps: RateEwma,
    samples_per_second: RateEwma,
    bytes_per_second: RateEwma,
    avg_response_time_ms: Ewma,
    last_series: u32,
    last_labels: u64,
    peak_series: u32,
    last_seen: DateTime<Utc>,
}

impl TenantStats {
    fn new() -> Self {
        Self {
            allowed: 0,
            denied: 0,
            rps: RateEwma::new(),
            samples_per_second: RateEwma::new(),
            bytes_per_second: RateEwma::new(),
            avg_response_time_ms: Ewma::new(EWMA_HALF_LIFE_SECS),
            last_series: 0,
            last_labels: 0,
            peak_series: 0,
            last_seen: Utc::now(),
        }
    }
}

/// Read-only view of one tenant's running metrics.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TenantStatsSnapshot {
    pub allowed_requests: u64,
    pub denied_requests: u64,
    pub rps: f64,
    pub samples_per_second: f64,
    pub bytes_per_second: f64,
    pub avg_response_time_ms: f64,
    pub last_series_count: u32,
    pub last_labels_count: u64,
    pub peak_series_count: u32,
    pub last_seen: DateTime<Utc>,
}

/// Totals shown on the overview endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OverviewSnapshot {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub denied_requests: u64,
    pub allow_percent: f64,
    pub active_tenants: usize,
}

/// Per-tenant cardinality view for the admin surface.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TenantCardinality {
    pub tenant: String,
    pub last_series_count: u32,
    pub last_labels_count: u64,
    pub peak_series_count: u32,
}

/// Running counters updated on every decision.
///
/// Totals are plain atomics; per-tenant state sits in a sharded map with a
/// small mutex per tenant, taken only for that tenant's own updates.
pub struct StatsRegistry {
    total: AtomicU64,
    allowed: AtomicU64,
    denied: AtomicU64,
    tenants: DashMap<String, Mutex<TenantStats>>,
    clock: Arc<dyn Clock>,
}

impl StatsRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            total: AtomicU64::new(0),
            allowed: AtomicU64::new(0),
            denied: AtomicU64::new(0),
            tenants: DashMap::new(),
            clock,
        }
    }

    pub fn record_decision(&self, tenant: &str, decision: &Decision, observed: &ObservedCounts) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if decision.allowed {
            self.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied.fetch_add(1, Ordering::Relaxed);
        }
        if tenant.is_empty() {
            return;
        }

        let now = self.clock.now();
        let entry = self
            .tenants
            .entry(tenant.to_string())
            .or_insert_with(|| Mutex::new(TenantStats::new()));
        let mut stats = entry.lock();
        if decision.allowed {
            stats.allowed += 1;
            stats
                .samples_per_second
                .observe(observed.samples as f64, now);
            stats
                .bytes_per_second
                .observe(observed.body_bytes as f64, now);
        } else {
            stats.denied += 1;
        }
        stats.rps.observe(1.0, now);
        stats.last_series = observed.series;
        stats.last_labels = observed.labels;
        stats.peak_series = stats.peak_series.max(observed.series);
        stats.last_seen = Utc::now();
    }

    /// Feeds one check's wall-clock latency into the tenant's EWMA.
    pub fn record_response_time(&self, tenant: &str, millis: f64) {
        if tenant.is_empty() {
            return;
        }
        if let Some(entry) = self.tenants.get(tenant) {
            let now = self.clock.now();
            entry.lock().avg_response_time_ms.update(millis, now);
        }
    }

    pub fn tenant(&self, tenant: &str) -> Option<TenantStatsSnapshot> {
        let entry = self.tenants.get(tenant)?;
        let stats = entry.lock();
        let now = self.clock.now();
        Some(TenantStatsSnapshot {
            allowed_requests: stats.allowed,
            denied_requests: stats.denied,
            rps: stats.rps.read(now),
            samples_per_second: stats.samples_per_second.read(now),
            bytes_per_second: stats.bytes_per_second.read(now),
            avg_response_time_ms: stats.avg_response_time_ms.read(now),
            last_series_count: stats.last_series,
            last_labels_count: stats.last_labels,
            peak_series_count: stats.peak_series,
            last_seen: stats.last_seen,
        })
    }

    pub fn overview(&self) -> OverviewSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let allowed = self.allowed.load(Ordering::Relaxed);
        let denied = self.denied.load(Ordering::Relaxed);
        OverviewSnapshot {
            total_requests: total,
            allowed_requests: allowed,
            denied_requests: denied,
            allow_percent: if total == 0 {
                100.0
            } else {
                allowed as f64 / total as f64 * 100.0
            },
            active_tenants: self.tenants.len(),
        }
    }

    pub fn cardinality(&self) -> Vec<TenantCardinality> {
        let mut rows: Vec<_> = self
            .tenants
            .iter()
            .map(|entry| {
                let stats = entry.value().lock();
                TenantCardinality {
                    tenant: entry.key().clone(),
                    last_series_count: stats.last_series,
                    last_labels_count: stats.last_labels,
                    peak_series_count: stats.peak_series,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.peak_series_count.cmp(&a.peak_series_count));
        rows
    }

    pub fn remove_tenant(&self, tenant: &str) {
        self.tenants.remove(tenant);
    }

    pub fn active_tenants(&self) -> usize {
        self.tenants.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::buckets::ManualClock;
    use crate::domain::Reason;
    use std::time::Duration;

    #[test]
    fn test_ewma_converges_to_constant_input() {
        let clock = ManualClock::new();
        let mut ewma = Ewma::new(30.0);
        for _ in 0..100 {
            clock.advance(Duration::from_secs(1));
            ewma.update(10.0, clock.now());
        }
        assert!((ewma.read(clock.now()) - 10.0).abs() < 0.5);
    }

    #[test]
    fn test_ewma_half_life() {
        let clock = ManualClock::new();
        let mut ewma = Ewma::new(30.0);
        ewma.update(100.0, clock.now());
        clock.advance(Duration::from_secs(30));
        assert!((ewma.read(clock.now()) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_overview_counts() {
        let clock = Arc::new(ManualClock::new());
        let stats = StatsRegistry::new(clock);
        let observed = ObservedCounts::default();
        stats.record_decision("t1", &Decision::allow(), &observed);
        stats.record_decision("t1", &Decision::deny(Reason::BodyTooLarge, 413), &observed);
        stats.record_decision("t2", &Decision::allow(), &observed);

        let overview = stats.overview();
        assert_eq!(overview.total_requests, 3);
        assert_eq!(overview.allowed_requests, 2);
        assert_eq!(overview.denied_requests, 1);
        assert_eq!(overview.active_tenants, 2);
        assert!((overview.allow_percent - 66.666).abs() < 0.1);
    }

    #[test]
    fn test_tenant_snapshot_tracks_counts() {
        let clock = Arc::new(ManualClock::new());
        let stats = StatsRegistry::new(clock.clone());
        let observed = ObservedCounts {
            body_bytes: 512,
            series: 50,
            samples: 100,
            labels: 200,
        };
        stats.record_decision("t1", &Decision::allow(), &observed);
        let snap = stats.tenant("t1").unwrap();
        assert_eq!(snap.allowed_requests, 1);
        assert_eq!(snap.last_series_count, 50);
        assert_eq!(snap.peak_series_count, 50);
    }

    #[test]
    fn test_missing_tenant_not_tracked() {
        let clock = Arc::new(ManualClock::new());
        let stats = StatsRegistry::new(clock);
        stats.record_decision("", &Decision::deny(Reason::NoTenant, 400), &ObservedCounts::default());
        assert_eq!(stats.active_tenants(), 0);
        assert_eq!(stats.overview().total_requests, 1);
    }

    #[test]
    fn test_remove_tenant() {
        let clock = Arc::new(ManualClock::new());
        let stats = StatsRegistry::new(clock);
        stats.record_decision("t1", &Decision::allow(), &ObservedCounts::default());
        stats.remove_tenant("t1");
        assert!(stats.tenant("t1").is_none());
    }
}
