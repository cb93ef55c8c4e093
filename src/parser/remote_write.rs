// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/parser/remote_write.rs
//
// Hand-maintained subset of the Prometheus remote-write protobuf schema
// (`prometheus.WriteRequest`). Field tags match the upstream definition so
// the wire format interoperates; unknown fields (exemplars, native
// histograms, metadata) are skipped by prost during decode. Maintaining the
// handful of messages by hand keeps protoc out of the build.

/// Top-level remote-write message: `prometheus.WriteRequest`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteRequest {
    #[prost(message, repeated, tag = "1")]
    pub timeseries: ::prost::alloc::vec::Vec<TimeSeries>,
}

/// `prometheus.TimeSeries`: one labelled series with its samples.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TimeSeries {
    #[prost(message, repeated, tag = "1")]
    pub labels: ::prost::alloc::vec::Vec<Label>,
    #[prost(message, repeated, tag = "2")]
    pub samples: ::prost::alloc::vec::Vec<Sample>,
}

/// `prometheus.Label`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Label {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub value: ::prost::alloc::string::String,
}

/// `prometheus.Sample`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Sample {
    #[prost(double, tag = "1")]
    pub value: f64,
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
}

/// The reserved label name carrying the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

impl TimeSeries {
    /// Metric name of this series, or `""` when the `__name__` label is absent.
    pub fn metric_name(&self) -> &str {
        self.labels
            .iter()
            .find(|l| l.name == METRIC_NAME_LABEL)
            .map(|l| l.value.as_str())
            .unwrap_or("")
    }
}
