// tests/ext_authz.rs
//
// The RPC surfaces, driven directly against the service implementations:
// envelope extraction, write-path gating, denial headers, and descriptor
// ratelimit checks.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::*;
use tonic::Request;

use tollgate::api::grpc::proto::authorization_server::Authorization;
use tollgate::api::grpc::proto::rate_limit_service_server::RateLimitService;
use tollgate::api::grpc::proto::{
    attribute_context, check_response, rate_limit_descriptor, rate_limit_response,
    AttributeContext, CheckRequest, RateLimitDescriptor, RateLimitRequest,
};
use tollgate::api::grpc::{ExtAuthzService, RateLimitSvc, RpcConfig};
use tollgate::{EnforcementConfig, TenantLimits};

fn check_request(path: &str, tenant: Option<&str>, body: Vec<u8>, encoding: &str) -> CheckRequest {
    let mut headers = HashMap::new();
    if let Some(tenant) = tenant {
        headers.insert("x-scope-orgid".to_string(), tenant.to_string());
    }
    if !encoding.is_empty() {
        headers.insert("content-encoding".to_string(), encoding.to_string());
    }
    CheckRequest {
        attributes: Some(AttributeContext {
            request: Some(attribute_context::Request {
                http: Some(attribute_context::HttpRequest {
                    method: "POST".to_string(),
                    path: path.to_string(),
                    headers,
                    size: body.len() as i64,
                    raw_body: body,
                    ..Default::default()
                }),
            }),
        }),
    }
}

fn denied_headers(response: &tollgate::api::grpc::proto::CheckResponse) -> HashMap<String, String> {
    match response.http_response.as_ref().unwrap() {
        check_response::HttpResponse::DeniedResponse(denied) => denied
            .headers
            .iter()
            .filter_map(|h| h.header.as_ref())
            .map(|h| (h.key.clone(), h.value.clone()))
            .collect(),
        check_response::HttpResponse::OkResponse(_) => panic!("expected a denial"),
    }
}

#[tokio::test]
async fn test_allowed_write_returns_ok_response() {
    let (state, _clock) = test_state();
    state.upsert_tenant(
        "t1",
        TenantLimits {
            samples_per_second: 100.0,
            ..Default::default()
        },
        EnforcementConfig::default(),
    );
    let service = ExtAuthzService::new(
        test_engine(state, Default::default()),
        RpcConfig::default(),
    );

    let body = snappy(&write_request(10, 1, 1));
    let request = Request::new(check_request("/api/v1/push", Some("t1"), body, "snappy"));
    let response = service.check(request).await.unwrap().into_inner();

    assert_eq!(response.status.unwrap().code, 0);
    assert!(matches!(
        response.http_response,
        Some(check_response::HttpResponse::OkResponse(_))
    ));
}

#[tokio::test]
async fn test_denied_write_carries_reason_headers() {
    let (state, _clock) = test_state();
    state.upsert_tenant(
        "t1",
        TenantLimits {
            max_body_bytes: 8,
            ..Default::default()
        },
        EnforcementConfig::default(),
    );
    let service = ExtAuthzService::new(
        test_engine(state, Default::default()),
        RpcConfig::default(),
    );

    let body = snappy(&write_request(10, 1, 1));
    let request = Request::new(check_request("/api/v1/push", Some("t1"), body, "snappy"));
    let response = service.check(request).await.unwrap().into_inner();

    let headers = denied_headers(&response);
    assert_eq!(headers["x-rls-reason"], "body_too_large");
    assert_eq!(headers["x-rls-tenant"], "t1");

    match response.http_response.unwrap() {
        check_response::HttpResponse::DeniedResponse(denied) => {
            assert_eq!(denied.status.unwrap().code, 413);
            assert_eq!(denied.body, "body_too_large");
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_non_write_path_passes_without_parsing() {
    let (state, _clock) = test_state();
    let service = ExtAuthzService::new(
        test_engine(state.clone(), Default::default()),
        RpcConfig::default(),
    );

    // Garbage body on a read path: passed through, never parsed, never
    // counted.
    let request = Request::new(check_request(
        "/api/v1/query",
        None,
        vec![0xff; 64],
        "snappy",
    ));
    let response = service.check(request).await.unwrap().into_inner();

    assert!(matches!(
        response.http_response,
        Some(check_response::HttpResponse::OkResponse(_))
    ));
    assert_eq!(state.stats.overview().total_requests, 0);
}

#[tokio::test]
async fn test_missing_tenant_denied_with_400() {
    let (state, _clock) = test_state();
    let service = ExtAuthzService::new(
        test_engine(state, Default::default()),
        RpcConfig::default(),
    );

    let body = snappy(&write_request(1, 1, 0));
    let request = Request::new(check_request("/api/v1/push", None, body, "snappy"));
    let response = service.check(request).await.unwrap().into_inner();

    let headers = denied_headers(&response);
    assert_eq!(headers["x-rls-reason"], "no_tenant");
    match response.http_response.unwrap() {
        check_response::HttpResponse::DeniedResponse(denied) => {
            assert_eq!(denied.status.unwrap().code, 400);
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_backpressure_returns_conservative_decision() {
    let (state, _clock) = test_state();
    let service = ExtAuthzService::new(
        test_engine(state.clone(), Default::default()),
        RpcConfig {
            max_inflight: 0,
            fail_open: true,
            ..Default::default()
        },
    );

    let body = snappy(&write_request(1, 1, 0));
    let request = Request::new(check_request("/api/v1/push", Some("t1"), body, "snappy"));
    let response = service.check(request).await.unwrap().into_inner();

    // Fail-open: shed checks come back allowed.
    assert!(matches!(
        response.http_response,
        Some(check_response::HttpResponse::OkResponse(_))
    ));
}

#[tokio::test]
async fn test_ratelimit_descriptor_charges_bucket() {
    let (state, _clock) = test_state();
    state.upsert_tenant(
        "t1",
        TenantLimits {
            samples_per_second: 2.0,
            ..Default::default()
        },
        EnforcementConfig::default(),
    );
    let service = RateLimitSvc::new(state, RpcConfig::default());

    let descriptor = || RateLimitDescriptor {
        entries: vec![
            rate_limit_descriptor::Entry {
                key: "tenant".to_string(),
                value: "t1".to_string(),
            },
            rate_limit_descriptor::Entry {
                key: "dimension".to_string(),
                value: "samples".to_string(),
            },
        ],
        hits_addend: None,
    };

    // Capacity 2: two single hits pass, the third trips OVER_LIMIT.
    for expected_remaining in [1u32, 0] {
        let request = Request::new(RateLimitRequest {
            domain: "tollgate".to_string(),
            descriptors: vec![descriptor()],
            hits_addend: 0,
        });
        let response = service.should_rate_limit(request).await.unwrap().into_inner();
        assert_eq!(response.overall_code, rate_limit_response::Code::Ok as i32);
        assert_eq!(response.statuses[0].limit_remaining, expected_remaining);
    }

    let request = Request::new(RateLimitRequest {
        domain: "tollgate".to_string(),
        descriptors: vec![descriptor()],
        hits_addend: 0,
    });
    let response = service.should_rate_limit(request).await.unwrap().into_inner();
    assert_eq!(
        response.overall_code,
        rate_limit_response::Code::OverLimit as i32
    );
    assert_eq!(
        response.statuses[0].code,
        rate_limit_response::Code::OverLimit as i32
    );
}

#[tokio::test]
async fn test_ratelimit_descriptor_without_tenant_is_ok() {
    let (state, _clock) = test_state();
    let service = RateLimitSvc::new(state, RpcConfig::default());

    let request = Request::new(RateLimitRequest {
        domain: "tollgate".to_string(),
        descriptors: vec![RateLimitDescriptor {
            entries: vec![rate_limit_descriptor::Entry {
                key: "unrelated".to_string(),
                value: "x".to_string(),
            }],
            hits_addend: None,
        }],
        hits_addend: 0,
    });
    let response = service.should_rate_limit(request).await.unwrap().into_inner();
    assert_eq!(response.overall_code, rate_limit_response::Code::Ok as i32);
}

#[tokio::test]
async fn test_ratelimit_hits_addend_charges_in_bulk() {
    let (state, _clock) = test_state();
    state.upsert_tenant(
        "t1",
        TenantLimits {
            samples_per_second: 10.0,
            ..Default::default()
        },
        EnforcementConfig::default(),
    );
    let service = RateLimitSvc::new(Arc::clone(&state), RpcConfig::default());

    let request = Request::new(RateLimitRequest {
        domain: "tollgate".to_string(),
        descriptors: vec![RateLimitDescriptor {
            entries: vec![
                rate_limit_descriptor::Entry {
                    key: "tenant".to_string(),
                    value: "t1".to_string(),
                },
                rate_limit_descriptor::Entry {
                    key: "dimension".to_string(),
                    value: "samples".to_string(),
                },
            ],
            hits_addend: Some(8),
        }],
        hits_addend: 0,
    });
    let response = service.should_rate_limit(request).await.unwrap().into_inner();
    assert_eq!(response.overall_code, rate_limit_response::Code::Ok as i32);
    assert_eq!(response.statuses[0].limit_remaining, 2);
}
