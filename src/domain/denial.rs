// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/domain/denial.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::decision::{ObservedCounts, Reason};

/// Diagnostics captured when a payload fails to parse.
///
/// The hex preview is capped at the first 32 bytes of the *compressed* body
/// and never contains decompressed label values; the admin surface that
/// exposes these records is assumed privileged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseDiagnostics {
    pub encoding: String,
    pub body_bytes: usize,
    pub preview_hex: String,
    pub guessed_cause: String,
    pub suggested_fix: String,
}

/// The limit a denied request ran into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitExceeded {
    /// Which limit, named by its `TenantLimits` field.
    pub limit: String,
    pub limit_value: f64,
    pub observed: f64,
}

/// One entry in the recent-denial ring buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenialRecord {
    pub id: Uuid,
    pub tenant: String,
    pub reason: Reason,
    pub at: DateTime<Utc>,
    pub observed: ObservedCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exceeded: Option<LimitExceeded>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse: Option<ParseDiagnostics>,
}

impl DenialRecord {
    pub fn new(tenant: impl Into<String>, reason: Reason, observed: ObservedCounts) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant: tenant.into(),
            reason,
            at: Utc::now(),
            observed,
            exceeded: None,
            parse: None,
        }
    }

    pub fn with_exceeded(mut self, limit: impl Into<String>, limit_value: f64, observed: f64) -> Self {
        self.exceeded = Some(LimitExceeded {
            limit: limit.into(),
            limit_value,
            observed,
        });
        self
    }

    pub fn with_parse(mut self, diagnostics: ParseDiagnostics) -> Self {
        self.parse = Some(diagnostics);
        self
    }

    /// True for denials caused by cardinality rather than rate or size.
    pub fn is_cardinality(&self) -> bool {
        matches!(
            self.reason,
            Reason::TooManySeries | Reason::TooManyLabels | Reason::TooManySeriesPerMetric
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinality_classification() {
        let rec = DenialRecord::new("t1", Reason::TooManySeries, ObservedCounts::default());
        assert!(rec.is_cardinality());

        let rec = DenialRecord::new("t1", Reason::SamplesRateExceeded, ObservedCounts::default());
        assert!(!rec.is_cardinality());
    }

    #[test]
    fn test_serializes_reason_code() {
        let rec = DenialRecord::new("t1", Reason::BodyTooLarge, ObservedCounts::default())
            .with_exceeded("max_body_bytes", 1024.0, 2000.0);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["reason"], "body_too_large");
        assert_eq!(json["exceeded"]["limit"], "max_body_bytes");
    }
}
