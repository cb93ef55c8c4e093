// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/application/engine.rs

use std::sync::Arc;

use crate::application::state::EnforcementState;
use crate::domain::{Decision, DenialRecord, Dimension, ObservedCounts, Reason};
use crate::parser::{self, ParseResult};

/// Engine knobs, resolved from settings once at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Allow requests whose payload cannot be parsed.
    pub failure_mode_allow: bool,
    /// Allow requests carrying no tenant header.
    pub allow_unknown_tenant: bool,
    /// Cap on decompressed payload size.
    pub max_decompressed_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            failure_mode_allow: true,
            allow_unknown_tenant: false,
            max_decompressed_bytes: parser::DEFAULT_MAX_DECOMPRESSED,
        }
    }
}

/// One authorization request, already lifted out of the RPC envelope.
#[derive(Debug, Clone, Default)]
pub struct AuthorizeRequest {
    pub tenant: Option<String>,
    /// Compressed body bytes; `None` when the proxy did not buffer a body.
    pub body: Option<Vec<u8>>,
    /// Size claimed by the envelope, used when the body itself is absent.
    pub body_size: u64,
    pub content_encoding: String,
}

/// The decision engine: pure composition of limit store, bucket registry,
/// and parser. Each call reads one consistent limits snapshot; no lock is
/// held across the parse step.
pub struct DecisionEngine {
    state: Arc<EnforcementState>,
    config: EngineConfig,
}

impl DecisionEngine {
    pub fn new(state: Arc<EnforcementState>, config: EngineConfig) -> Self {
        Self { state, config }
    }

    pub fn state(&self) -> &Arc<EnforcementState> {
        &self.state
    }

    /// Runs the six-step evaluation: tenant presence, enforcement gate,
    /// body size, parse, cardinality, rates. First denial wins.
    pub fn authorize(&self, request: &AuthorizeRequest) -> Decision {
        let decision = self.evaluate(request);
        let tenant = request.tenant.as_deref().unwrap_or("");
        self.state
            .stats
            .record_decision(tenant, &decision.decision, &decision.observed);
        if let Some(record) = decision.record {
            if !decision.decision.allowed {
                self.state.monitor.record_denial(&record);
            }
            self.state.denials.push(record);
        }
        decision.decision
    }

    fn evaluate(&self, request: &AuthorizeRequest) -> Evaluated {
        let mut observed = ObservedCounts {
            body_bytes: request.body_size,
            ..Default::default()
        };

        // 1. Tenant presence.
        let tenant = match request.tenant.as_deref().filter(|t| !t.is_empty()) {
            Some(tenant) => tenant,
            None => {
                if self.config.allow_unknown_tenant {
                    return Evaluated::allow_with(Reason::MissingTenant, observed);
                }
                let decision = Decision::deny(Reason::NoTenant, 400);
                let record = DenialRecord::new("", Reason::NoTenant, observed);
                return Evaluated::denied(decision, record, observed);
            }
        };

        let resolved = self.state.store.get(tenant);
        let limits = &resolved.limits;
        let enforcement = &resolved.enforcement;

        // 2. Enforcement gate.
        if !enforcement.enabled {
            return Evaluated::allow(observed);
        }

        // 3. Body size.
        if enforcement.enforce_max_body_bytes
            && limits.max_body_bytes > 0
            && request.body_size > limits.max_body_bytes
        {
            let decision = Decision::deny(Reason::BodyTooLarge, 413);
            let record = DenialRecord::new(tenant, Reason::BodyTooLarge, observed).with_exceeded(
                "max_body_bytes",
                limits.max_body_bytes as f64,
                request.body_size as f64,
            );
            return Evaluated::denied(decision, record, observed);
        }

        // 4. Parse. Without a buffered body only the cardinality-independent
        // checks above can run; the request passes on those alone.
        let body = match request.body.as_deref() {
            Some(body) => body,
            None => return Evaluated::allow(observed),
        };
        let parsed = match parser::parse_with_limit(
            body,
            &request.content_encoding,
            self.config.max_decompressed_bytes,
        ) {
            Ok(parsed) => parsed,
            Err(err) => {
                let diagnostics = err.diagnostics();
                let allowed = self.config.failure_mode_allow;
                self.state
                    .monitor
                    .record_parse_failure(tenant, &diagnostics, allowed);
                let reason = if allowed {
                    Reason::ParseFailedAllowed
                } else {
                    Reason::ParseFailed
                };
                let record =
                    DenialRecord::new(tenant, reason, observed).with_parse(diagnostics);
                if allowed {
                    return Evaluated {
                        decision: Decision::allow_with(reason),
                        record: Some(record),
                        observed,
                    };
                }
                return Evaluated::denied(Decision::deny(reason, 400), record, observed);
            }
        };

        observed.series = parsed.series_count;
        observed.samples = parsed.samples_count;
        observed.labels = parsed.labels_count;

        // 5. Cardinality dimensions.
        if let Some(evaluated) =
            self.check_cardinality(tenant, limits, enforcement, &parsed, observed)
        {
            return evaluated;
        }

        // 6. Rate dimensions: samples first; a denied samples take leaves
        // the bytes bucket uncharged.
        if enforcement.enforce_samples_per_second {
            let rate = limits.rate(Dimension::Samples);
            let capacity = limits.capacity(Dimension::Samples, enforcement.burst_percent_override);
            let outcome = self.state.buckets.take(
                tenant,
                Dimension::Samples,
                parsed.samples_count as f64,
                rate,
                capacity,
            );
            if !outcome.allowed {
                let decision = Decision::deny(Reason::SamplesRateExceeded, 429);
                let record = DenialRecord::new(tenant, Reason::SamplesRateExceeded, observed)
                    .with_exceeded("samples_per_second", rate, parsed.samples_count as f64);
                return Evaluated::denied(decision, record, observed);
            }
        }
        if enforcement.enforce_bytes_per_second {
            let rate = limits.rate(Dimension::Bytes);
            let capacity = limits.capacity(Dimension::Bytes, enforcement.burst_percent_override);
            let outcome = self.state.buckets.take(
                tenant,
                Dimension::Bytes,
                request.body_size as f64,
                rate,
                capacity,
            );
            if !outcome.allowed {
                let decision = Decision::deny(Reason::BytesRateExceeded, 429);
                let record = DenialRecord::new(tenant, Reason::BytesRateExceeded, observed)
                    .with_exceeded("bytes_per_second", rate, request.body_size as f64);
                return Evaluated::denied(decision, record, observed);
            }
        }

        Evaluated::allow(observed)
    }

    fn check_cardinality(
        &self,
        tenant: &str,
        limits: &crate::domain::TenantLimits,
        enforcement: &crate::domain::EnforcementConfig,
        parsed: &ParseResult,
        observed: ObservedCounts,
    ) -> Option<Evaluated> {
        if enforcement.enforce_max_series_per_request
            && limits.max_series_per_request > 0
            && parsed.series_count > limits.max_series_per_request
        {
            let decision = Decision::deny(Reason::TooManySeries, 429);
            let record = DenialRecord::new(tenant, Reason::TooManySeries, observed).with_exceeded(
                "max_series_per_request",
                limits.max_series_per_request as f64,
                parsed.series_count as f64,
            );
            return Some(Evaluated::denied(decision, record, observed));
        }

        if enforcement.enforce_max_labels_per_series && limits.max_labels_per_series > 0 {
            let violating = parsed.series_over_label_limit(limits.max_labels_per_series);
            if violating > 0 {
                let decision = Decision::deny(Reason::TooManyLabels, 429);
                let record = DenialRecord::new(tenant, Reason::TooManyLabels, observed)
                    .with_exceeded(
                        "max_labels_per_series",
                        limits.max_labels_per_series as f64,
                        violating as f64,
                    );
                return Some(Evaluated::denied(decision, record, observed));
            }
        }

        if enforcement.enforce_max_series_per_metric && limits.max_series_per_metric > 0 {
            if let Some((metric, count)) = parsed
                .metric_series_counts
                .iter()
                .map(|(name, &count)| (name.as_str(), count))
                .find(|&(_, count)| count > limits.max_series_per_metric)
            {
                let decision = Decision::deny(Reason::TooManySeriesPerMetric, 429);
                let record = DenialRecord::new(tenant, Reason::TooManySeriesPerMetric, observed)
                    .with_exceeded(
                        format!("max_series_per_metric[{}]", metric),
                        limits.max_series_per_metric as f64,
                        count as f64,
                    );
                return Some(Evaluated::denied(decision, record, observed));
            }
        }

        None
    }
}

struct Evaluated {
    decision: Decision,
    record: Option<DenialRecord>,
    observed: ObservedCounts,
}

impl Evaluated {
    fn allow(observed: ObservedCounts) -> Self {
        Self {
            decision: Decision::allow(),
            record: None,
            observed,
        }
    }

    fn allow_with(reason: Reason, observed: ObservedCounts) -> Self {
        Self {
            decision: Decision::allow_with(reason),
            record: None,
            observed,
        }
    }

    fn denied(decision: Decision, record: DenialRecord, observed: ObservedCounts) -> Self {
        Self {
            decision,
            record: Some(record),
            observed,
        }
    }
}
