// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/application/buckets.rs

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::domain::{Dimension, EnforcementConfig, TenantLimits};

/// Monotonic clock source for refill math. Injected so tests can drive
/// time by hand; wall-clock time is never used here.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// The production clock.
#[derive(Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A manually advanced clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: std::time::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Token bucket state. Invariant: `0 <= tokens <= capacity`.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Charges `amount` tokens if available. A denied take leaves the
    /// bucket unchanged apart from the refill.
    fn take(&mut self, amount: f64, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= amount {
            self.tokens -= amount;
            true
        } else {
            false
        }
    }

    /// Replaces capacity and refill rate in place, clamping the token count
    /// into the new `[0, capacity]` range. Tokens are deliberately not reset
    /// to capacity so a limit update never grants a free burst.
    fn reshape(&mut self, capacity: f64, refill_rate: f64) {
        self.capacity = capacity;
        self.refill_rate = refill_rate;
        self.tokens = self.tokens.clamp(0.0, capacity);
    }
}

/// Outcome of a single take.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TakeOutcome {
    pub allowed: bool,
    /// Tokens left after the take; `f64::INFINITY` for disabled dimensions.
    pub remaining: f64,
}

/// Per-(tenant, dimension) token buckets behind a sharded map.
///
/// Buckets are created lazily on first reference and hold their own mutex,
/// so a take serializes only callers of the same bucket. There is no global
/// lock on the take path.
pub struct BucketRegistry {
    buckets: DashMap<(String, Dimension), Mutex<TokenBucket>>,
    clock: Arc<dyn Clock>,
}

impl BucketRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
        }
    }

    /// Charges `amount` against the tenant's bucket for `dimension`.
    ///
    /// `rate` and `capacity` describe the bucket the caller's limits
    /// snapshot expects; a bucket created under older limits is reshaped in
    /// place before the charge. A `rate` of 0 disables the dimension and
    /// always allows without touching any bucket.
    pub fn take(
        &self,
        tenant: &str,
        dimension: Dimension,
        amount: f64,
        rate: f64,
        capacity: f64,
    ) -> TakeOutcome {
        if rate <= 0.0 {
            return TakeOutcome {
                allowed: true,
                remaining: f64::INFINITY,
            };
        }

        let now = self.clock.now();
        let key = (tenant.to_string(), dimension);
        let entry = self
            .buckets
            .entry(key)
            .or_insert_with(|| Mutex::new(TokenBucket::new(capacity, rate, now)));
        let mut bucket = entry.lock();
        if bucket.capacity != capacity || bucket.refill_rate != rate {
            bucket.reshape(capacity, rate);
        }
        let allowed = bucket.take(amount, now);
        TakeOutcome {
            allowed,
            remaining: bucket.tokens,
        }
    }

    /// Reshapes a tenant's existing buckets after a limits update. Buckets
    /// for dimensions the tenant has never used stay absent; they will be
    /// created with the new shape on first take.
    pub fn apply_limits(&self, tenant: &str, limits: &TenantLimits, enforcement: &EnforcementConfig) {
        for dimension in Dimension::ALL {
            let key = (tenant.to_string(), dimension);
            if let Some(entry) = self.buckets.get(&key) {
                let rate = limits.rate(dimension);
                let capacity = limits.capacity(dimension, enforcement.burst_percent_override);
                entry.lock().reshape(capacity, rate);
            }
        }
    }

    /// Drops all buckets belonging to a tenant.
    pub fn remove_tenant(&self, tenant: &str) {
        for dimension in Dimension::ALL {
            self.buckets.remove(&(tenant.to_string(), dimension));
        }
    }

    /// Tokens currently available, after an up-to-date refill. `None` when
    /// the tenant has never charged this dimension.
    pub fn remaining(&self, tenant: &str, dimension: Dimension) -> Option<f64> {
        let key = (tenant.to_string(), dimension);
        let entry = self.buckets.get(&key)?;
        let mut bucket = entry.lock();
        bucket.refill(self.clock.now());
        Some(bucket.tokens)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
