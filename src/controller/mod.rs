// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/controller/mod.rs
//
// Keeps the limit store consistent with the overrides document. The loop
// is a small state machine: Init → Reconciling → Watching ⇄ PollingFallback,
// terminal Stopped on shutdown. Watch loss triggers the fallback; a
// successful resubscribe leaves it.

pub mod source;
pub mod translate;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::application::{EnforcementState, TenantEntry};
use crate::error::SourceError;

pub use source::{FileOverridesSource, OverridesSource, SourceEvent, Subscription};

/// Where the sync loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Init,
    Reconciling,
    Watching,
    PollingFallback,
    Stopped,
}

/// Controller timing knobs.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub poll_fallback: Duration,
    pub watch_backoff_base: Duration,
    pub watch_backoff_cap: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_fallback: Duration::from_secs(30),
            watch_backoff_base: Duration::from_secs(1),
            watch_backoff_cap: Duration::from_secs(30),
        }
    }
}

/// Outcome of one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Tenants upserted because they were new or changed.
    pub applied: usize,
    /// Tenants removed because the document no longer lists them.
    pub deleted: usize,
    /// Tenants left untouched because their entries failed translation.
    pub skipped: usize,
}

/// Exponential backoff with ±20% jitter for watch resubscription.
struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next(&mut self) -> Duration {
        let exp = self
            .base
            .saturating_mul(2_u32.saturating_pow(self.attempt))
            .min(self.cap);
        self.attempt = self.attempt.saturating_add(1);
        let jitter = rand::thread_rng().gen_range(0.8..=1.2);
        exp.mul_f64(jitter)
    }
}

/// The overrides synchronization controller.
pub struct OverridesController {
    source: Arc<dyn OverridesSource>,
    state: Arc<EnforcementState>,
    config: ControllerConfig,
    phase: Mutex<SyncPhase>,
}

impl OverridesController {
    pub fn new(
        source: Arc<dyn OverridesSource>,
        state: Arc<EnforcementState>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            source,
            state,
            config,
            phase: Mutex::new(SyncPhase::Init),
        }
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: SyncPhase) {
        let mut current = self.phase.lock();
        if *current != phase {
            debug!(from = ?*current, to = ?phase, "controller phase transition");
            *current = phase;
        }
    }

    /// One full fetch → translate → diff → apply pass. The first success
    /// marks the service ready.
    pub async fn reconcile(&self) -> Result<ReconcileSummary, SourceError> {
        self.set_phase(SyncPhase::Reconciling);

        let text = self.source.fetch().await?;
        let raw = translate::parse_document(&text)?;

        let defaults = self.state.store.defaults().clone();
        let mut desired: HashMap<String, TenantEntry> = HashMap::with_capacity(raw.len());
        let mut skipped: Vec<String> = Vec::new();

        for (tenant, value) in &raw {
            match translate::translate_tenant(value, &defaults) {
                Ok(translated) => {
                    if !translated.ignored_keys.is_empty() {
                        debug!(
                            tenant = %tenant,
                            keys = ?translated.ignored_keys,
                            "ignoring unrecognized override keys"
                        );
                    }
                    desired.insert(
                        tenant.clone(),
                        TenantEntry {
                            limits: translated.limits,
                            enforcement: translated.enforcement,
                        },
                    );
                }
                Err(e) => {
                    // A broken entry never aborts the batch; the tenant's
                    // previously applied state stays in force.
                    warn!(tenant = %tenant, error = %e, "skipping unparseable tenant entry");
                    skipped.push(tenant.clone());
                }
            }
        }

        let mut summary = ReconcileSummary {
            skipped: skipped.len(),
            ..Default::default()
        };

        let current = self.state.store.list();
        for (tenant, entry) in &desired {
            let unchanged = current
                .iter()
                .any(|(name, existing)| name == tenant && existing == entry);
            if !unchanged {
                self.state
                    .upsert_tenant(tenant, entry.limits.clone(), entry.enforcement.clone());
                summary.applied += 1;
            }
        }
        for (tenant, _) in &current {
            if !desired.contains_key(tenant) && !skipped.iter().any(|s| s == tenant) {
                self.state.remove_tenant(tenant);
                summary.deleted += 1;
            }
        }

        self.state
            .monitor
            .record_reconcile(summary.applied, summary.deleted, summary.skipped);
        self.state.metrics().set_active_tenants(self.state.store.len());
        self.state.mark_ready();
        Ok(summary)
    }

    async fn reconcile_logged(&self) {
        if let Err(e) = self.reconcile().await {
            self.state.monitor.record_reconcile_error(&e);
        }
    }

    /// Runs the watch-or-poll loop until `shutdown` flips.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = Backoff::new(
            self.config.watch_backoff_base,
            self.config.watch_backoff_cap,
        );

        info!(source = %self.source.describe(), "overrides controller started");

        'outer: loop {
            if *shutdown.borrow() {
                break;
            }

            match self.source.subscribe().await {
                Ok(mut subscription) => {
                    backoff.reset();
                    self.state.monitor.record_watch_established();
                    self.set_phase(SyncPhase::Watching);
                    // Catch up on anything missed while unsubscribed.
                    self.reconcile_logged().await;
                    self.set_phase(SyncPhase::Watching);

                    loop {
                        tokio::select! {
                            _ = shutdown.changed() => break 'outer,
                            event = subscription.next() => match event {
                                Some(SourceEvent::Changed) => {
                                    self.reconcile_logged().await;
                                    self.set_phase(SyncPhase::Watching);
                                }
                                Some(SourceEvent::Lost(message)) => {
                                    self.state.monitor.record_watch_lost(&message);
                                    break;
                                }
                                None => {
                                    self.state.monitor.record_watch_lost("subscription closed");
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "overrides watch subscription failed");
                }
            }

            // Watch is gone: poll on a timer while waiting out the backoff,
            // then try to resubscribe.
            self.set_phase(SyncPhase::PollingFallback);
            let resubscribe_after = backoff.next();
            let mut poll = tokio::time::interval(self.config.poll_fallback);
            poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            poll.tick().await; // the immediate first tick
            self.reconcile_logged().await;
            self.set_phase(SyncPhase::PollingFallback);

            let resubscribe = tokio::time::sleep(resubscribe_after);
            tokio::pin!(resubscribe);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break 'outer,
                    _ = &mut resubscribe => continue 'outer,
                    _ = poll.tick() => {
                        self.reconcile_logged().await;
                        self.set_phase(SyncPhase::PollingFallback);
                    }
                }
            }
        }

        self.set_phase(SyncPhase::Stopped);
        info!("overrides controller stopped");
    }
}
