// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/api/rest/dtos.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::stats::{TenantCardinality, TenantStatsSnapshot};
use crate::domain::{DenialRecord, EnforcementConfig, TenantLimits};
use crate::error::ValidationError;

/// One tenant row in the list view.
#[derive(Debug, Serialize)]
pub struct TenantSummary {
    pub id: String,
    pub limits: TenantLimits,
    pub enforcement: EnforcementConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<TenantStatsSnapshot>,
}

/// Remaining bucket tokens for the tenant detail view; absent dimensions
/// have never been charged.
#[derive(Debug, Serialize)]
pub struct BucketState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples_remaining: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_remaining: Option<f64>,
}

/// Full record returned by `GET /api/tenants/{id}`.
#[derive(Debug, Serialize)]
pub struct TenantDetail {
    pub id: String,
    pub known: bool,
    pub limits: TenantLimits,
    pub enforcement: EnforcementConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<TenantStatsSnapshot>,
    pub buckets: BucketState,
    /// How `burst_percent` is derived from a raw burst size.
    pub burst_rule: &'static str,
}

/// Request body for `PUT /api/tenants/{id}/limits`.
#[derive(Debug, Deserialize, Serialize)]
pub struct PutLimitsRequest {
    #[serde(flatten)]
    pub limits: TenantLimits,
}

impl PutLimitsRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.limits.validate()
    }
}

/// Request body for `PUT /api/tenants/{id}/enforcement`.
#[derive(Debug, Deserialize, Serialize)]
pub struct PutEnforcementRequest {
    #[serde(flatten)]
    pub enforcement: EnforcementConfig,
}

impl PutEnforcementRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.enforcement.validate()
    }
}

#[derive(Debug, Serialize)]
pub struct OverviewResponse {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub denied_requests: u64,
    pub allow_percent: f64,
    pub active_tenants: usize,
    pub ready: bool,
}

/// Query string for `GET /api/denials`.
#[derive(Debug, Deserialize, Default)]
pub struct DenialsQuery {
    pub tenant: Option<String>,
    pub limit: Option<usize>,
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct DenialsResponse {
    pub denials: Vec<DenialRecord>,
}

#[derive(Debug, Serialize)]
pub struct CardinalityResponse {
    pub tenants: Vec<TenantCardinality>,
    pub recent_violations: Vec<DenialRecord>,
}

/// Structured error body: `{code, message, field?}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}
