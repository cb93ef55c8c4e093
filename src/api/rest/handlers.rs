// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/api/rest/handlers.rs

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::application::{DenialQuery, EnforcementState};
use crate::domain::Dimension;
use crate::error::ValidationError;

use super::dtos::{
    ApiErrorBody, BucketState, CardinalityResponse, DenialsQuery, DenialsResponse,
    OverviewResponse, PutEnforcementRequest, PutLimitsRequest, TenantDetail, TenantSummary,
};

/// The rule string advertised on tenant detail responses.
pub const BURST_RULE: &str = "100*(burst/rate-1) clamp [0,1000]";

/// Shared state for every admin handler.
#[derive(Clone)]
pub struct AdminState {
    pub state: Arc<EnforcementState>,
}

/// Admin API error, rendered as `{code, message, field?}`.
#[derive(Debug)]
pub enum ApiError {
    Validation { field: String, message: String },
    NotFound(String),
    Internal(String),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let ValidationError::Field { field, message } = err;
        ApiError::Validation { field, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "validation_error".to_string(),
                    message,
                    field: Some(field),
                },
            ),
            ApiError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ApiErrorBody {
                    code: "not_found".to_string(),
                    message: format!("{} not found", resource),
                    field: None,
                },
            ),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody {
                    code: "internal".to_string(),
                    message,
                    field: None,
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// `GET /api/tenants`
pub async fn list_tenants(State(admin): State<AdminState>) -> Json<Vec<TenantSummary>> {
    let tenants = admin
        .state
        .store
        .list()
        .into_iter()
        .map(|(id, entry)| {
            let stats = admin.state.stats.tenant(&id);
            TenantSummary {
                id,
                limits: entry.limits,
                enforcement: entry.enforcement,
                stats,
            }
        })
        .collect();
    Json(tenants)
}

/// `GET /api/tenants/{id}`
pub async fn get_tenant(
    State(admin): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<TenantDetail>, ApiError> {
    let resolved = admin.state.store.get(&id);
    if !resolved.known {
        return Err(ApiError::NotFound(format!("tenant {:?}", id)));
    }

    Ok(Json(TenantDetail {
        buckets: BucketState {
            samples_remaining: admin.state.buckets.remaining(&id, Dimension::Samples),
            bytes_remaining: admin.state.buckets.remaining(&id, Dimension::Bytes),
        },
        stats: admin.state.stats.tenant(&id),
        known: resolved.known,
        limits: resolved.limits,
        enforcement: resolved.enforcement,
        burst_rule: BURST_RULE,
        id,
    }))
}

/// `PUT /api/tenants/{id}/limits`
pub async fn put_limits(
    State(admin): State<AdminState>,
    Path(id): Path<String>,
    Json(request): Json<PutLimitsRequest>,
) -> Result<StatusCode, ApiError> {
    request.validate()?;
    admin.state.store.set_limits(&id, request.limits);
    let resolved = admin.state.store.get(&id);
    admin
        .state
        .buckets
        .apply_limits(&id, &resolved.limits, &resolved.enforcement);
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /api/tenants/{id}/enforcement`
pub async fn put_enforcement(
    State(admin): State<AdminState>,
    Path(id): Path<String>,
    Json(request): Json<PutEnforcementRequest>,
) -> Result<StatusCode, ApiError> {
    request.validate()?;
    admin.state.store.set_enforcement(&id, request.enforcement);
    let resolved = admin.state.store.get(&id);
    admin
        .state
        .buckets
        .apply_limits(&id, &resolved.limits, &resolved.enforcement);
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/tenants/{id}`
pub async fn delete_tenant(
    State(admin): State<AdminState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !admin.state.remove_tenant(&id) {
        return Err(ApiError::NotFound(format!("tenant {:?}", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/overview`
pub async fn overview(State(admin): State<AdminState>) -> Json<OverviewResponse> {
    let snapshot = admin.state.stats.overview();
    Json(OverviewResponse {
        total_requests: snapshot.total_requests,
        allowed_requests: snapshot.allowed_requests,
        denied_requests: snapshot.denied_requests,
        allow_percent: snapshot.allow_percent,
        active_tenants: snapshot.active_tenants,
        ready: admin.state.is_ready(),
    })
}

/// `GET /api/denials?tenant=&limit=&since=`
pub async fn denials(
    State(admin): State<AdminState>,
    Query(query): Query<DenialsQuery>,
) -> Json<DenialsResponse> {
    let denials = admin.state.denials.query(&DenialQuery {
        tenant: query.tenant,
        since: query.since,
        limit: query.limit.unwrap_or(0),
    });
    Json(DenialsResponse { denials })
}

/// `GET /api/cardinality`
pub async fn cardinality(State(admin): State<AdminState>) -> Json<CardinalityResponse> {
    Json(CardinalityResponse {
        tenants: admin.state.stats.cardinality(),
        recent_violations: admin.state.denials.recent_cardinality(50),
    })
}

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "ok"
}

/// `GET /readyz` — ready only after the controller's first successful sync.
pub async fn readyz(State(admin): State<AdminState>) -> Response {
    if admin.state.is_ready() {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "overrides not yet synced").into_response()
    }
}

/// `GET /metrics`
pub async fn metrics(State(admin): State<AdminState>) -> Result<String, ApiError> {
    let metrics = admin.state.metrics();
    metrics.set_active_tenants(admin.state.store.len());
    metrics.set_active_buckets(admin.state.buckets.len());
    metrics.set_inflight_checks(admin.state.inflight());
    metrics.gather().map_err(|e| ApiError::Internal(e.to_string()))
}
