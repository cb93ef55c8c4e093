// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/application/state.rs

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use crate::application::buckets::{BucketRegistry, Clock};
use crate::application::denial_log::DenialLog;
use crate::application::limit_store::LimitStore;
use crate::application::stats::StatsRegistry;
use crate::domain::{EnforcementConfig, TenantLimits};
use crate::infrastructure::{EnforcementMonitor, Metrics};

/// All mutable enforcement state, owned in one place and passed by `Arc`
/// into every surface. There are no process-wide singletons; tests build
/// isolated instances.
pub struct EnforcementState {
    pub store: LimitStore,
    pub buckets: BucketRegistry,
    pub denials: DenialLog,
    pub stats: StatsRegistry,
    pub monitor: EnforcementMonitor,
    ready: AtomicBool,
    inflight: AtomicI64,
}

impl EnforcementState {
    pub fn new(
        default_limits: TenantLimits,
        default_enforcement: EnforcementConfig,
        denial_capacity: usize,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store: LimitStore::new(default_limits, default_enforcement),
            buckets: BucketRegistry::new(clock.clone()),
            denials: DenialLog::new(denial_capacity),
            stats: StatsRegistry::new(clock),
            monitor: EnforcementMonitor::new(metrics),
            ready: AtomicBool::new(false),
            inflight: AtomicI64::new(0),
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        self.monitor.metrics()
    }

    /// Upserts a tenant and reshapes its live buckets in place.
    pub fn upsert_tenant(
        &self,
        tenant: &str,
        limits: TenantLimits,
        enforcement: EnforcementConfig,
    ) {
        self.buckets.apply_limits(tenant, &limits, &enforcement);
        self.store.set(tenant, limits, enforcement);
    }

    /// Removes a tenant together with its buckets and stats.
    pub fn remove_tenant(&self, tenant: &str) -> bool {
        let existed = self.store.delete(tenant);
        self.buckets.remove_tenant(tenant);
        self.stats.remove_tenant(tenant);
        existed
    }

    /// Flips once the controller has completed its first successful
    /// reconcile; `/readyz` reports this.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn inflight(&self) -> i64 {
        self.inflight.load(Ordering::Relaxed)
    }

    /// RAII guard counting one in-flight check.
    pub fn inflight_guard(self: &Arc<Self>) -> InflightGuard {
        self.inflight.fetch_add(1, Ordering::Relaxed);
        InflightGuard {
            state: Arc::clone(self),
        }
    }
}

pub struct InflightGuard {
    state: Arc<EnforcementState>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.state.inflight.fetch_sub(1, Ordering::Relaxed);
    }
}
