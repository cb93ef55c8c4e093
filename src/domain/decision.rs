// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/domain/decision.rs

use serde::{Deserialize, Serialize};

/// Why a request was denied, or why an allow carries a caveat.
///
/// The string form of each variant is the stable reason code exposed on the
/// `x-rls-reason` response header and in denial records; treat renames as a
/// wire-format break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Clean allow.
    None,
    /// Tenant header absent but the allow-unknown policy let it through.
    MissingTenant,
    /// Tenant header absent and policy denies.
    NoTenant,
    BodyTooLarge,
    ParseFailed,
    /// Parse failed but `failure_mode_allow` let the request through.
    ParseFailedAllowed,
    TooManySeries,
    TooManyLabels,
    TooManySeriesPerMetric,
    SamplesRateExceeded,
    BytesRateExceeded,
    /// Conservative decision after the per-call deadline expired.
    DeadlineExceeded,
    /// Conservative decision while shedding load.
    Backpressure,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::None => "",
            Reason::MissingTenant => "missing_tenant",
            Reason::NoTenant => "no_tenant",
            Reason::BodyTooLarge => "body_too_large",
            Reason::ParseFailed => "parse_failed",
            Reason::ParseFailedAllowed => "parse_failed_allowed",
            Reason::TooManySeries => "too_many_series",
            Reason::TooManyLabels => "too_many_labels",
            Reason::TooManySeriesPerMetric => "too_many_series_per_metric",
            Reason::SamplesRateExceeded => "samples_rate_exceeded",
            Reason::BytesRateExceeded => "bytes_rate_exceeded",
            Reason::DeadlineExceeded => "deadline_exceeded",
            Reason::Backpressure => "backpressure",
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: Reason,
    pub http_code: u16,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: Reason::None,
            http_code: 200,
        }
    }

    pub fn allow_with(reason: Reason) -> Self {
        Self {
            allowed: true,
            reason,
            http_code: 200,
        }
    }

    pub fn deny(reason: Reason, http_code: u16) -> Self {
        Self {
            allowed: false,
            reason,
            http_code,
        }
    }
}

/// Counts observed for one request, recorded on decisions and denials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedCounts {
    pub body_bytes: u64,
    pub series: u32,
    pub samples: u64,
    pub labels: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_are_stable() {
        assert_eq!(Reason::SamplesRateExceeded.as_str(), "samples_rate_exceeded");
        assert_eq!(Reason::NoTenant.as_str(), "no_tenant");
        assert_eq!(Reason::None.as_str(), "");
    }

    #[test]
    fn test_decision_constructors() {
        let allow = Decision::allow();
        assert!(allow.allowed);
        assert_eq!(allow.http_code, 200);

        let deny = Decision::deny(Reason::BodyTooLarge, 413);
        assert!(!deny.allowed);
        assert_eq!(deny.http_code, 413);
    }
}
