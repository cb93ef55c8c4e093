// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/domain/limits.rs

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A rate dimension charged against a tenant's token buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Samples,
    Bytes,
}

impl Dimension {
    pub const ALL: [Dimension; 2] = [Dimension::Samples, Dimension::Bytes];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Samples => "samples",
            Dimension::Bytes => "bytes",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "samples" => Some(Dimension::Samples),
            "bytes" => Some(Dimension::Bytes),
            _ => None,
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-tenant ingestion limits.
///
/// A value of 0 on any field means "no limit on this dimension". The record
/// is immutable once handed to the limit store; updates replace the whole
/// record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantLimits {
    /// Sample ingestion rate, samples per second.
    pub samples_per_second: f64,
    /// Body byte rate, bytes per second.
    pub bytes_per_second: f64,
    /// Extra bucket headroom as a percentage of the base rate, in [0, 1000].
    pub burst_percent: f64,
    /// Maximum compressed request body size in bytes.
    pub max_body_bytes: u64,
    /// Maximum number of labels on a single series.
    pub max_labels_per_series: u32,
    /// Maximum length of a single label value, informational only.
    pub max_label_value_length: u32,
    /// Maximum number of series in one request.
    pub max_series_per_request: u32,
    /// Maximum number of series sharing one metric name in one request.
    pub max_series_per_metric: u32,
}

impl Default for TenantLimits {
    fn default() -> Self {
        Self {
            samples_per_second: 0.0,
            bytes_per_second: 0.0,
            burst_percent: 0.0,
            max_body_bytes: 0,
            max_labels_per_series: 0,
            max_label_value_length: 0,
            max_series_per_request: 0,
            max_series_per_metric: 0,
        }
    }
}

impl TenantLimits {
    /// Refill rate for a dimension's bucket; 0 disables the dimension.
    pub fn rate(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Samples => self.samples_per_second,
            Dimension::Bytes => self.bytes_per_second,
        }
    }

    /// Bucket capacity for a dimension: `rate × (1 + burst_percent / 100)`.
    ///
    /// An enforcement-level `burst_percent_override` takes precedence over
    /// the limit record's own burst figure.
    pub fn capacity(&self, dimension: Dimension, burst_override: Option<f64>) -> f64 {
        let burst = burst_override.unwrap_or(self.burst_percent);
        self.rate(dimension) * (1.0 + burst / 100.0)
    }

    /// Checks the numeric ranges the admin API promises callers.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.samples_per_second.is_finite() || self.samples_per_second < 0.0 {
            return Err(ValidationError::field(
                "samples_per_second",
                "must be a finite number >= 0",
            ));
        }
        if !self.bytes_per_second.is_finite() || self.bytes_per_second < 0.0 {
            return Err(ValidationError::field(
                "bytes_per_second",
                "must be a finite number >= 0",
            ));
        }
        if !self.burst_percent.is_finite() || !(0.0..=1000.0).contains(&self.burst_percent) {
            return Err(ValidationError::field(
                "burst_percent",
                "must be within [0, 1000]",
            ));
        }
        Ok(())
    }
}

/// Per-tenant enforcement gates.
///
/// A dimension is enforced iff `enabled` and its own gate are both true.
/// With `enabled` false the decision engine short-circuits to allow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcementConfig {
    pub enabled: bool,
    pub enforce_samples_per_second: bool,
    pub enforce_bytes_per_second: bool,
    pub enforce_max_body_bytes: bool,
    pub enforce_max_labels_per_series: bool,
    pub enforce_max_series_per_request: bool,
    pub enforce_max_series_per_metric: bool,
    /// When set, replaces the limit record's `burst_percent` in capacity math.
    pub burst_percent_override: Option<f64>,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            enforce_samples_per_second: true,
            enforce_bytes_per_second: true,
            enforce_max_body_bytes: true,
            enforce_max_labels_per_series: true,
            enforce_max_series_per_request: true,
            enforce_max_series_per_metric: true,
            burst_percent_override: None,
        }
    }
}

impl EnforcementConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(burst) = self.burst_percent_override {
            if !burst.is_finite() || !(0.0..=1000.0).contains(&burst) {
                return Err(ValidationError::field(
                    "burst_percent_override",
                    "must be within [0, 1000]",
                ));
            }
        }
        Ok(())
    }
}
