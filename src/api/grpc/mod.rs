// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/api/grpc/mod.rs

pub mod ext_authz;
pub mod proto;
pub mod rate_limit;

pub use ext_authz::ExtAuthzService;
pub use rate_limit::RateLimitSvc;

use std::time::Duration;

/// Knobs shared by both RPC surfaces.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Header carrying the tenant id, lowercased for envelope lookups.
    pub tenant_header: String,
    /// Requests outside this prefix pass through unexamined.
    pub write_path_prefix: String,
    /// Hard ceiling on per-call wall-clock time.
    pub check_deadline: Duration,
    /// Conservative decision when a check times out or is shed.
    pub fail_open: bool,
    /// In-flight ceiling before load shedding.
    pub max_inflight: i64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            tenant_header: "x-scope-orgid".to_string(),
            write_path_prefix: "/api/v1/push".to_string(),
            check_deadline: Duration::from_millis(250),
            fail_open: true,
            max_inflight: 4096,
        }
    }
}

/// Effective deadline for one call: the caller's `grpc-timeout` when it is
/// tighter than the configured maximum.
pub(crate) fn effective_deadline<T>(request: &tonic::Request<T>, max: Duration) -> Duration {
    request
        .metadata()
        .get("grpc-timeout")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_grpc_timeout)
        .map_or(max, |caller| caller.min(max))
}

/// Parses the gRPC timeout wire format: an integer followed by a unit
/// letter (`H`, `M`, `S`, `m`, `u`, `n`).
fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "H" => Some(Duration::from_secs(amount.checked_mul(3600)?)),
        "M" => Some(Duration::from_secs(amount.checked_mul(60)?)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}
