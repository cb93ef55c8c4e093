// tests/engine_scenarios.rs
//
// End-to-end decision engine scenarios: parse, cardinality, and rate
// checks against tenants provisioned the way the controller provisions
// them.

mod common;

use std::time::Duration;

use common::*;
use tollgate::application::AuthorizeRequest;
use tollgate::{Dimension, EnforcementConfig, Reason, TenantLimits};

fn limits(samples_per_second: f64) -> TenantLimits {
    TenantLimits {
        samples_per_second,
        ..Default::default()
    }
}

fn request(tenant: &str, body: Vec<u8>, encoding: &str) -> AuthorizeRequest {
    AuthorizeRequest {
        tenant: Some(tenant.to_string()),
        body_size: body.len() as u64,
        body: Some(body),
        content_encoding: encoding.to_string(),
    }
}

#[tokio::test]
async fn test_snappy_write_within_rate_is_allowed() {
    let (state, _clock) = test_state();
    state.upsert_tenant("t1", limits(100.0), EnforcementConfig::default());
    let engine = test_engine(state.clone(), Default::default());

    let body = snappy(&write_request(50, 1, 2));
    let decision = engine.authorize(&request("t1", body, "snappy"));

    assert!(decision.allowed);
    assert_eq!(decision.reason, Reason::None);
    assert_eq!(state.buckets.remaining("t1", Dimension::Samples), Some(50.0));
}

#[tokio::test]
async fn test_second_write_over_rate_is_denied_without_charge() {
    let (state, _clock) = test_state();
    state.upsert_tenant("t1", limits(100.0), EnforcementConfig::default());
    let engine = test_engine(state.clone(), Default::default());

    let first = engine.authorize(&request("t1", snappy(&write_request(50, 1, 2)), "snappy"));
    assert!(first.allowed);

    let second = engine.authorize(&request("t1", snappy(&write_request(60, 1, 2)), "snappy"));
    assert!(!second.allowed);
    assert_eq!(second.http_code, 429);
    assert_eq!(second.reason, Reason::SamplesRateExceeded);
    // The denied request charged nothing.
    assert_eq!(state.buckets.remaining("t1", Dimension::Samples), Some(50.0));

    let denials = state.denials.query(&Default::default());
    assert_eq!(denials.len(), 1);
    assert_eq!(denials[0].tenant, "t1");
    assert_eq!(denials[0].observed.samples, 60);
}

#[tokio::test]
async fn test_unknown_tenant_with_permissive_defaults_is_allowed() {
    let (state, _clock) = test_state();
    let engine = test_engine(state.clone(), Default::default());

    let body = gzip(&write_request(10, 1, 1));
    let decision = engine.authorize(&request("t2", body, "gzip"));

    assert!(decision.allowed);
    let overview = state.stats.overview();
    assert_eq!(overview.allowed_requests, 1);
    let stats = state.stats.tenant("t2").expect("t2 should appear in stats");
    assert_eq!(stats.allowed_requests, 1);
}

#[tokio::test]
async fn test_oversized_body_denied_before_parsing() {
    let (state, _clock) = test_state();
    state.upsert_tenant(
        "t3",
        TenantLimits {
            max_body_bytes: 1024,
            ..Default::default()
        },
        EnforcementConfig::default(),
    );
    let engine = test_engine(state.clone(), Default::default());

    // The body is garbage: if the parser ran, this would be a parse
    // failure rather than a size denial.
    let decision = engine.authorize(&AuthorizeRequest {
        tenant: Some("t3".to_string()),
        body: Some(vec![0xff; 2000]),
        body_size: 2000,
        content_encoding: "snappy".to_string(),
    });

    assert!(!decision.allowed);
    assert_eq!(decision.http_code, 413);
    assert_eq!(decision.reason, Reason::BodyTooLarge);

    let denials = state.denials.query(&Default::default());
    assert_eq!(denials.len(), 1);
    assert!(denials[0].parse.is_none());
    assert_eq!(
        denials[0].exceeded.as_ref().unwrap().limit,
        "max_body_bytes"
    );
}

#[tokio::test]
async fn test_truncated_snappy_denied_when_failure_mode_deny() {
    let (state, _clock) = test_state();
    state.upsert_tenant("t1", limits(100.0), EnforcementConfig::default());
    let engine = test_engine(
        state.clone(),
        tollgate::EngineConfig {
            failure_mode_allow: false,
            ..Default::default()
        },
    );

    let decision = engine.authorize(&request("t1", vec![1, 2, 3, 4, 5], "snappy"));
    assert!(!decision.allowed);
    assert_eq!(decision.http_code, 400);
    assert_eq!(decision.reason, Reason::ParseFailed);

    let denials = state.denials.query(&Default::default());
    let parse = denials[0].parse.as_ref().expect("diagnostics recorded");
    assert_eq!(parse.guessed_cause, "truncated");
    assert_eq!(parse.body_bytes, 5);
}

#[tokio::test]
async fn test_parse_failure_allowed_when_failure_mode_allow() {
    let (state, _clock) = test_state();
    state.upsert_tenant("t1", limits(100.0), EnforcementConfig::default());
    let engine = test_engine(state.clone(), Default::default());

    let decision = engine.authorize(&request("t1", vec![1, 2, 3, 4, 5], "snappy"));
    assert!(decision.allowed);
    assert_eq!(decision.reason, Reason::ParseFailedAllowed);

    // The audit record still lands in the ring buffer.
    let denials = state.denials.query(&Default::default());
    assert_eq!(denials.len(), 1);
    assert!(denials[0].parse.is_some());
}

#[tokio::test]
async fn test_limit_update_reshapes_bucket_capacity() {
    let (state, clock) = test_state();
    state.upsert_tenant("t4", limits(100.0), EnforcementConfig::default());
    let engine = test_engine(state.clone(), Default::default());

    // Burn half the original bucket.
    let first = engine.authorize(&request("t4", snappy(&write_request(50, 1, 2)), "snappy"));
    assert!(first.allowed);

    // Controller applies the tightened rate: capacity becomes 10.
    state.upsert_tenant("t4", limits(10.0), EnforcementConfig::default());

    clock.advance(Duration::from_secs(1));
    let second = engine.authorize(&request("t4", snappy(&write_request(50, 1, 2)), "snappy"));
    assert!(!second.allowed);
    assert_eq!(second.reason, Reason::SamplesRateExceeded);
    assert!(state.buckets.remaining("t4", Dimension::Samples).unwrap() <= 10.0);
}

#[tokio::test]
async fn test_disabled_tenant_is_always_allowed() {
    let (state, _clock) = test_state();
    state.upsert_tenant(
        "t5",
        TenantLimits {
            samples_per_second: 1.0,
            max_body_bytes: 1,
            max_series_per_request: 1,
            ..Default::default()
        },
        EnforcementConfig {
            enabled: false,
            ..Default::default()
        },
    );
    let engine = test_engine(state.clone(), Default::default());

    for _ in 0..5 {
        let decision =
            engine.authorize(&request("t5", snappy(&write_request(100, 10, 5)), "snappy"));
        assert!(decision.allowed);
    }
    // Nothing was ever charged.
    assert_eq!(state.buckets.remaining("t5", Dimension::Samples), None);
}

#[tokio::test]
async fn test_removed_tenant_falls_back_to_defaults() {
    let (state, _clock) = test_state();
    state.upsert_tenant("t6", limits(1.0), EnforcementConfig::default());
    let engine = test_engine(state.clone(), Default::default());

    // Exhaust the tight limit.
    let first = engine.authorize(&request("t6", snappy(&write_request(1, 1, 1)), "snappy"));
    assert!(first.allowed);
    let denied = engine.authorize(&request("t6", snappy(&write_request(1, 1, 1)), "snappy"));
    assert!(!denied.allowed);

    state.remove_tenant("t6");
    assert_eq!(state.buckets.remaining("t6", Dimension::Samples), None);

    // Defaults are unlimited, so the same request now passes.
    let after = engine.authorize(&request("t6", snappy(&write_request(1, 1, 1)), "snappy"));
    assert!(after.allowed);
}

#[tokio::test]
async fn test_missing_tenant_policies() {
    let (state, _clock) = test_state();
    let engine = test_engine(state.clone(), Default::default());

    let decision = engine.authorize(&AuthorizeRequest {
        tenant: None,
        body: None,
        body_size: 0,
        content_encoding: String::new(),
    });
    assert!(!decision.allowed);
    assert_eq!(decision.http_code, 400);
    assert_eq!(decision.reason, Reason::NoTenant);

    let permissive = test_engine(
        state,
        tollgate::EngineConfig {
            allow_unknown_tenant: true,
            ..Default::default()
        },
    );
    let decision = permissive.authorize(&AuthorizeRequest {
        tenant: Some(String::new()),
        body: None,
        body_size: 0,
        content_encoding: String::new(),
    });
    assert!(decision.allowed);
    assert_eq!(decision.reason, Reason::MissingTenant);
}

#[tokio::test]
async fn test_cardinality_checks_in_order() {
    let (state, _clock) = test_state();
    state.upsert_tenant(
        "t7",
        TenantLimits {
            max_series_per_request: 10,
            max_labels_per_series: 3,
            max_series_per_metric: 5,
            ..Default::default()
        },
        EnforcementConfig::default(),
    );
    let engine = test_engine(state.clone(), Default::default());

    // 20 series > 10 per request.
    let decision = engine.authorize(&request("t7", snappy(&write_request(20, 1, 0)), "snappy"));
    assert_eq!(decision.reason, Reason::TooManySeries);
    assert_eq!(decision.http_code, 429);

    // 8 series fit, but each carries __name__ + instance + 4 extras > 3.
    let decision = engine.authorize(&request("t7", snappy(&write_request(8, 1, 4)), "snappy"));
    assert_eq!(decision.reason, Reason::TooManyLabels);

    // 8 series on one metric > 5 per metric (labels within bounds).
    let decision = engine.authorize(&request("t7", snappy(&write_request(8, 1, 0)), "snappy"));
    assert_eq!(decision.reason, Reason::TooManySeriesPerMetric);

    // All bounds respected.
    let decision = engine.authorize(&request("t7", snappy(&write_request(4, 1, 0)), "snappy"));
    assert!(decision.allowed);
}

#[tokio::test]
async fn test_bytes_rate_dimension() {
    let (state, _clock) = test_state();
    state.upsert_tenant(
        "t8",
        TenantLimits {
            bytes_per_second: 100.0,
            ..Default::default()
        },
        EnforcementConfig::default(),
    );
    let engine = test_engine(state.clone(), Default::default());

    let body = snappy(&write_request(1, 1, 0));
    let mut req = request("t8", body.clone(), "snappy");
    req.body_size = 80;
    assert!(engine.authorize(&req).allowed);

    let mut req = request("t8", body, "snappy");
    req.body_size = 80;
    let decision = engine.authorize(&req);
    assert!(!decision.allowed);
    assert_eq!(decision.reason, Reason::BytesRateExceeded);
}

#[tokio::test]
async fn test_write_path_without_body_checks_size_only() {
    let (state, _clock) = test_state();
    state.upsert_tenant(
        "t9",
        TenantLimits {
            max_body_bytes: 1024,
            samples_per_second: 1.0,
            ..Default::default()
        },
        EnforcementConfig::default(),
    );
    let engine = test_engine(state.clone(), Default::default());

    // No body buffered: size within bounds passes without touching buckets.
    let decision = engine.authorize(&AuthorizeRequest {
        tenant: Some("t9".to_string()),
        body: None,
        body_size: 512,
        content_encoding: String::new(),
    });
    assert!(decision.allowed);
    assert_eq!(state.buckets.remaining("t9", Dimension::Samples), None);

    // Size beyond bounds still denies.
    let decision = engine.authorize(&AuthorizeRequest {
        tenant: Some("t9".to_string()),
        body: None,
        body_size: 4096,
        content_encoding: String::new(),
    });
    assert_eq!(decision.reason, Reason::BodyTooLarge);
}
