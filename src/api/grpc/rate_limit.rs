// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/api/grpc/rate_limit.rs

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::application::EnforcementState;
use crate::domain::Dimension;

use super::proto::{
    rate_limit_response::{Code, DescriptorStatus},
    rate_limit_service_server::RateLimitService,
    RateLimitRequest, RateLimitResponse,
};
use super::RpcConfig;

/// The descriptor ratelimit surface: stateless quota queries decoupled from
/// payload inspection. Descriptors carry `tenant` and `dimension` entries;
/// each hit charges the matching token bucket.
pub struct RateLimitSvc {
    state: Arc<EnforcementState>,
    config: RpcConfig,
}

impl RateLimitSvc {
    pub fn new(state: Arc<EnforcementState>, config: RpcConfig) -> Self {
        Self { state, config }
    }

    /// Charges one descriptor. Descriptors without a tenant entry, and
    /// dimensions this service does not know, are passed as OK rather than
    /// failing the whole request.
    fn check_descriptor(
        &self,
        descriptor: &super::proto::RateLimitDescriptor,
        request_hits: u32,
    ) -> DescriptorStatus {
        let mut tenant = None;
        let mut dimension = None;
        for entry in &descriptor.entries {
            match entry.key.as_str() {
                "tenant" => tenant = Some(entry.value.as_str()),
                "dimension" => dimension = Dimension::parse(&entry.value),
                _ => {}
            }
        }

        let (tenant, dimension) = match (tenant, dimension) {
            (Some(tenant), Some(dimension)) if !tenant.is_empty() => (tenant, dimension),
            _ => {
                return DescriptorStatus {
                    code: Code::Ok as i32,
                    limit_remaining: 0,
                }
            }
        };

        let hits = descriptor
            .hits_addend
            .unwrap_or_else(|| u64::from(request_hits.max(1)));

        let resolved = self.state.store.get(tenant);
        if !resolved.enforcement.enabled {
            return DescriptorStatus {
                code: Code::Ok as i32,
                limit_remaining: 0,
            };
        }
        let rate = resolved.limits.rate(dimension);
        let capacity = resolved
            .limits
            .capacity(dimension, resolved.enforcement.burst_percent_override);

        let outcome = self
            .state
            .buckets
            .take(tenant, dimension, hits as f64, rate, capacity);

        let code = if outcome.allowed { Code::Ok } else { Code::OverLimit };
        DescriptorStatus {
            code: code as i32,
            limit_remaining: if outcome.remaining.is_finite() {
                outcome.remaining.max(0.0) as u32
            } else {
                u32::MAX
            },
        }
    }
}

#[tonic::async_trait]
impl RateLimitService for RateLimitSvc {
    async fn should_rate_limit(
        &self,
        request: Request<RateLimitRequest>,
    ) -> Result<Response<RateLimitResponse>, Status> {
        if self.state.inflight() >= self.config.max_inflight {
            self.state.monitor.record_backpressure("ratelimit");
            let code = if self.config.fail_open { Code::Ok } else { Code::OverLimit };
            return Ok(Response::new(RateLimitResponse {
                overall_code: code as i32,
                statuses: Vec::new(),
                response_headers_to_add: Vec::new(),
            }));
        }
        let _guard = self.state.inflight_guard();

        let request = request.into_inner();
        let statuses: Vec<DescriptorStatus> = request
            .descriptors
            .iter()
            .map(|d| self.check_descriptor(d, request.hits_addend))
            .collect();

        let over_limit = statuses.iter().any(|s| s.code == Code::OverLimit as i32);
        self.state.metrics().record_ratelimit_check(over_limit);

        let overall = if over_limit { Code::OverLimit } else { Code::Ok };
        Ok(Response::new(RateLimitResponse {
            overall_code: overall as i32,
            statuses,
            response_headers_to_add: Vec::new(),
        }))
    }
}
