// tests/common/mod.rs

#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use prost::Message;
use tower::ServiceExt;

use tollgate::api::rest::{build_router, AdminState};
use tollgate::application::buckets::ManualClock;
use tollgate::application::{DecisionEngine, EngineConfig, EnforcementState};
use tollgate::parser::remote_write::{Label, Sample, TimeSeries, WriteRequest, METRIC_NAME_LABEL};
use tollgate::{EnforcementConfig, Metrics, TenantLimits};

/// Builds an isolated enforcement state on a manual clock.
pub fn test_state() -> (Arc<EnforcementState>, Arc<ManualClock>) {
    test_state_with_defaults(TenantLimits::default(), EnforcementConfig::default())
}

pub fn test_state_with_defaults(
    default_limits: TenantLimits,
    default_enforcement: EnforcementConfig,
) -> (Arc<EnforcementState>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let state = Arc::new(EnforcementState::new(
        default_limits,
        default_enforcement,
        1000,
        clock.clone(),
        Arc::new(Metrics::new().unwrap()),
    ));
    (state, clock)
}

pub fn test_engine(state: Arc<EnforcementState>, config: EngineConfig) -> Arc<DecisionEngine> {
    Arc::new(DecisionEngine::new(state, config))
}

/// Builds an encoded `WriteRequest` with `series` time series, each
/// carrying `samples_per_series` samples and `extra_labels` labels beyond
/// `__name__`.
pub fn write_request(series: u32, samples_per_series: u32, extra_labels: u32) -> Vec<u8> {
    write_request_for_metric("test_metric", series, samples_per_series, extra_labels)
}

pub fn write_request_for_metric(
    metric: &str,
    series: u32,
    samples_per_series: u32,
    extra_labels: u32,
) -> Vec<u8> {
    let request = WriteRequest {
        timeseries: (0..series)
            .map(|i| TimeSeries {
                labels: std::iter::once(Label {
                    name: METRIC_NAME_LABEL.to_string(),
                    value: metric.to_string(),
                })
                .chain(std::iter::once(Label {
                    name: "instance".to_string(),
                    value: format!("host-{}", i),
                }))
                .chain((0..extra_labels).map(|j| Label {
                    name: format!("label_{}", j),
                    value: format!("value_{}", j),
                }))
                .collect(),
                samples: (0..samples_per_series)
                    .map(|j| Sample {
                        value: f64::from(j),
                        timestamp: 1_700_000_000_000 + i64::from(j),
                    })
                    .collect(),
            })
            .collect(),
    };
    request.encode_to_vec()
}

pub fn snappy(body: &[u8]) -> Vec<u8> {
    snap::raw::Encoder::new().compress_vec(body).unwrap()
}

pub fn gzip(body: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(body).unwrap();
    encoder.finish().unwrap()
}

/// Thin wrapper driving the admin router without a TCP listener.
pub struct TestApp {
    router: Router,
}

impl TestApp {
    pub fn new(state: Arc<EnforcementState>) -> Self {
        Self {
            router: build_router(AdminState { state }),
        }
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.request(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    pub async fn put(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        self.request(
            Request::put(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.request(Request::delete(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn request(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }
}
