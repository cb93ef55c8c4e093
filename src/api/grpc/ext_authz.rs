// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/api/grpc/ext_authz.rs

use std::sync::Arc;
use std::time::Instant;

use tonic::{Request, Response, Status};
use tracing::debug;

use crate::application::{AuthorizeRequest, DecisionEngine, EnforcementState};
use crate::domain::{Decision, Reason};

use super::proto::{
    attribute_context, authorization_server::Authorization, check_response, rpc_code,
    CheckRequest, CheckResponse, DeniedHttpResponse, HeaderValue, HeaderValueOption, HttpStatus,
    OkHttpResponse, RpcStatus,
};
use super::{effective_deadline, RpcConfig};

pub const REASON_HEADER: &str = "x-rls-reason";
pub const TENANT_HEADER_ECHO: &str = "x-rls-tenant";

/// The ext-authz check surface: one RPC per proxied HTTP request.
pub struct ExtAuthzService {
    engine: Arc<DecisionEngine>,
    state: Arc<EnforcementState>,
    config: RpcConfig,
}

impl ExtAuthzService {
    pub fn new(engine: Arc<DecisionEngine>, config: RpcConfig) -> Self {
        let state = engine.state().clone();
        Self {
            engine,
            state,
            config,
        }
    }

    /// The decision returned when the check itself cannot complete:
    /// deadline expiry or load shedding.
    fn conservative(&self, reason: Reason, tenant: &str) -> CheckResponse {
        let decision = if self.config.fail_open {
            Decision::allow_with(reason)
        } else {
            Decision::deny(reason, 503)
        };
        to_check_response(&decision, tenant)
    }
}

#[tonic::async_trait]
impl Authorization for ExtAuthzService {
    async fn check(
        &self,
        request: Request<CheckRequest>,
    ) -> Result<Response<CheckResponse>, Status> {
        let started = Instant::now();
        let deadline = effective_deadline(&request, self.config.check_deadline);

        // Load shedding: past the in-flight ceiling every new check gets
        // the conservative decision so p99 latency stays bounded.
        if self.state.inflight() >= self.config.max_inflight {
            self.state.monitor.record_backpressure("ext_authz");
            return Ok(Response::new(self.conservative(Reason::Backpressure, "")));
        }
        let _guard = self.state.inflight_guard();
        self.state
            .metrics()
            .set_inflight_checks(self.state.inflight());

        let http = match request
            .into_inner()
            .attributes
            .and_then(|a| a.request)
            .and_then(|r| r.http)
        {
            Some(http) => http,
            None => {
                // No HTTP envelope at all; nothing to enforce on.
                debug!("check request without http envelope, passing through");
                return Ok(Response::new(to_check_response(&Decision::allow(), "")));
            }
        };

        // Only the write path is enforced; everything else passes through
        // without parsing.
        if !http.path.starts_with(&self.config.write_path_prefix) {
            return Ok(Response::new(to_check_response(&Decision::allow(), "")));
        }

        let authorize = authorize_request_from_envelope(&http, &self.config.tenant_header);
        let tenant = authorize.tenant.clone().unwrap_or_default();

        // Parsing multi-megabyte payloads is CPU work; run the evaluation
        // on the blocking pool and abandon it at the deadline.
        let engine = Arc::clone(&self.engine);
        let evaluation =
            tokio::task::spawn_blocking(move || engine.authorize(&authorize));
        let decision = match tokio::time::timeout(deadline, evaluation).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(join_err)) => {
                return Err(Status::internal(format!("check task failed: {join_err}")))
            }
            Err(_elapsed) => {
                self.state.monitor.record_timeout("ext_authz", &tenant);
                return Ok(Response::new(
                    self.conservative(Reason::DeadlineExceeded, &tenant),
                ));
            }
        };

        let elapsed = started.elapsed();
        self.state
            .metrics()
            .record_check(decision.allowed, elapsed.as_secs_f64());
        self.state
            .stats
            .record_response_time(&tenant, elapsed.as_secs_f64() * 1000.0);

        Ok(Response::new(to_check_response(&decision, &tenant)))
    }
}

/// Lifts the pieces the engine needs out of the ext-authz HTTP envelope.
fn authorize_request_from_envelope(
    http: &attribute_context::HttpRequest,
    tenant_header: &str,
) -> AuthorizeRequest {
    let tenant = http
        .headers
        .get(tenant_header)
        .filter(|v| !v.is_empty())
        .cloned();

    let content_encoding = http
        .headers
        .get("content-encoding")
        .cloned()
        .unwrap_or_default();

    // Prefer the raw body; fall back to the UTF-8 body field some proxies
    // send. Absent both, the engine runs its cardinality-independent checks
    // against the envelope size alone.
    let body: Option<Vec<u8>> = if !http.raw_body.is_empty() {
        Some(http.raw_body.clone())
    } else if !http.body.is_empty() {
        Some(http.body.clone().into_bytes())
    } else {
        None
    };

    let body_size = if http.size > 0 {
        http.size as u64
    } else {
        body.as_ref().map_or(0, |b| b.len() as u64)
    };

    AuthorizeRequest {
        tenant,
        body,
        body_size,
        content_encoding,
    }
}

/// Maps an engine decision onto the ext-authz wire response.
fn to_check_response(decision: &Decision, tenant: &str) -> CheckResponse {
    if decision.allowed {
        CheckResponse {
            status: Some(RpcStatus {
                code: rpc_code::OK,
                message: String::new(),
            }),
            http_response: Some(check_response::HttpResponse::OkResponse(OkHttpResponse {
                headers: Vec::new(),
            })),
        }
    } else {
        let reason = decision.reason.as_str();
        CheckResponse {
            status: Some(RpcStatus {
                code: rpc_code::PERMISSION_DENIED,
                message: reason.to_string(),
            }),
            http_response: Some(check_response::HttpResponse::DeniedResponse(
                DeniedHttpResponse {
                    status: Some(HttpStatus {
                        code: i32::from(decision.http_code),
                    }),
                    headers: vec![
                        header(REASON_HEADER, reason),
                        header(TENANT_HEADER_ECHO, tenant),
                    ],
                    body: reason.to_string(),
                },
            )),
        }
    }
}

fn header(key: &str, value: &str) -> HeaderValueOption {
    HeaderValueOption {
        header: Some(HeaderValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
