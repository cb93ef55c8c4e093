// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/parser/mod.rs
//
// Remote-write payload inspection: decompress, decode, count. Pure
// functions, safe to call concurrently; no I/O and no shared state.

pub mod remote_write;

use std::collections::HashMap;
use std::io::Read;

use prost::Message;
use thiserror::Error;

use crate::domain::ParseDiagnostics;
use remote_write::WriteRequest;

/// Snappy bodies shorter than this are rejected before decode is attempted.
/// A well-formed block-format frame for even an empty write is longer; short
/// bodies are the signature of an edge proxy that truncated its body buffer.
pub const SNAPPY_MIN_LEN: usize = 10;

/// Bytes of the compressed body kept in diagnostic previews.
pub const PREVIEW_BYTES: usize = 32;

/// Default cap on decompressed payload size, a guard against
/// decompression bombs.
pub const DEFAULT_MAX_DECOMPRESSED: usize = 64 * 1024 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Counts extracted from one remote-write payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseResult {
    pub series_count: u32,
    pub samples_count: u64,
    /// Sum of label counts across all series.
    pub labels_count: u64,
    /// Label count of each series, in payload order.
    pub series_label_counts: Vec<u32>,
    /// Series count per metric name; series without `__name__` land under "".
    pub metric_series_counts: HashMap<String, u32>,
}

impl ParseResult {
    /// Number of series carrying more than `limit` labels.
    pub fn series_over_label_limit(&self, limit: u32) -> u32 {
        self.series_label_counts
            .iter()
            .filter(|&&n| n > limit)
            .count() as u32
    }

    /// Largest per-metric series count with its metric name.
    pub fn busiest_metric(&self) -> Option<(&str, u32)> {
        self.metric_series_counts
            .iter()
            .max_by_key(|(_, &n)| n)
            .map(|(name, &n)| (name.as_str(), n))
    }
}

/// Parse failures, each carrying enough context for the admin denials view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unsupported content encoding {encoding:?} ({body_bytes} bytes)")]
    UnsupportedEncoding {
        encoding: String,
        body_bytes: usize,
        preview_hex: String,
    },

    #[error("{encoding} decompression failed ({body_bytes} bytes): {cause}")]
    DecompressFailed {
        encoding: &'static str,
        body_bytes: usize,
        preview_hex: String,
        cause: String,
        guessed_cause: &'static str,
    },

    #[error("protobuf decode failed ({body_bytes} bytes): {cause}")]
    DecodeFailed {
        body_bytes: usize,
        preview_hex: String,
        cause: String,
    },
}

impl ParseError {
    pub fn diagnostics(&self) -> ParseDiagnostics {
        match self {
            ParseError::UnsupportedEncoding {
                encoding,
                body_bytes,
                preview_hex,
            } => ParseDiagnostics {
                encoding: encoding.clone(),
                body_bytes: *body_bytes,
                preview_hex: preview_hex.clone(),
                guessed_cause: "unsupported_encoding".to_string(),
                suggested_fix: format!(
                    "send identity, gzip, or snappy; got Content-Encoding {:?}",
                    encoding
                ),
            },
            ParseError::DecompressFailed {
                encoding,
                body_bytes,
                preview_hex,
                guessed_cause,
                ..
            } => ParseDiagnostics {
                encoding: (*encoding).to_string(),
                body_bytes: *body_bytes,
                preview_hex: preview_hex.clone(),
                guessed_cause: (*guessed_cause).to_string(),
                suggested_fix: match *guessed_cause {
                    "truncated" => {
                        "ensure the edge proxy buffers the full request body \
                         before invoking the authorization check"
                            .to_string()
                    }
                    _ => "verify the client's Content-Encoding matches the actual body"
                        .to_string(),
                },
            },
            ParseError::DecodeFailed {
                body_bytes,
                preview_hex,
                ..
            } => ParseDiagnostics {
                encoding: String::new(),
                body_bytes: *body_bytes,
                preview_hex: preview_hex.clone(),
                guessed_cause: "not_remote_write".to_string(),
                suggested_fix: "body decompressed but is not a prometheus.WriteRequest message"
                    .to_string(),
            },
        }
    }
}

fn preview(body: &[u8]) -> String {
    hex::encode(&body[..body.len().min(PREVIEW_BYTES)])
}

/// Parses a remote-write body with the default decompression cap.
pub fn parse(body: &[u8], content_encoding: &str) -> Result<ParseResult, ParseError> {
    parse_with_limit(body, content_encoding, DEFAULT_MAX_DECOMPRESSED)
}

/// Parses a remote-write body, decompressing at most `max_decompressed`
/// bytes. Accepted encodings: `""` (identity), `"gzip"`, `"snappy"`.
pub fn parse_with_limit(
    body: &[u8],
    content_encoding: &str,
    max_decompressed: usize,
) -> Result<ParseResult, ParseError> {
    let decompressed = match content_encoding {
        "" | "identity" => None,
        "gzip" => Some(decompress_gzip(body, max_decompressed)?),
        "snappy" => Some(decompress_snappy(body, max_decompressed)?),
        other => {
            return Err(ParseError::UnsupportedEncoding {
                encoding: other.to_string(),
                body_bytes: body.len(),
                preview_hex: preview(body),
            })
        }
    };
    let raw = decompressed.as_deref().unwrap_or(body);

    let request = WriteRequest::decode(raw).map_err(|e| ParseError::DecodeFailed {
        body_bytes: body.len(),
        preview_hex: preview(body),
        cause: e.to_string(),
    })?;

    let mut result = ParseResult {
        series_count: request.timeseries.len() as u32,
        series_label_counts: Vec::with_capacity(request.timeseries.len()),
        ..Default::default()
    };
    for series in &request.timeseries {
        let labels = series.labels.len() as u32;
        result.labels_count += u64::from(labels);
        result.samples_count += series.samples.len() as u64;
        result.series_label_counts.push(labels);
        *result
            .metric_series_counts
            .entry(series.metric_name().to_string())
            .or_insert(0) += 1;
    }
    Ok(result)
}

fn decompress_gzip(body: &[u8], max: usize) -> Result<Vec<u8>, ParseError> {
    let fail = |cause: String, guessed: &'static str| ParseError::DecompressFailed {
        encoding: "gzip",
        body_bytes: body.len(),
        preview_hex: preview(body),
        cause,
        guessed_cause: guessed,
    };

    if body.len() < 2 || body[..2] != GZIP_MAGIC {
        return Err(fail(
            "missing gzip magic bytes".to_string(),
            "not_gzip",
        ));
    }

    let mut out = Vec::new();
    let mut decoder = flate2::read::GzDecoder::new(body).take(max as u64 + 1);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| fail(e.to_string(), "corrupt_stream"))?;
    if out.len() > max {
        return Err(fail(
            format!("decompressed size exceeds cap of {} bytes", max),
            "too_large",
        ));
    }
    Ok(out)
}

fn decompress_snappy(body: &[u8], max: usize) -> Result<Vec<u8>, ParseError> {
    let fail = |cause: String, guessed: &'static str| ParseError::DecompressFailed {
        encoding: "snappy",
        body_bytes: body.len(),
        preview_hex: preview(body),
        cause,
        guessed_cause: guessed,
    };

    if body.len() < SNAPPY_MIN_LEN {
        return Err(fail(
            format!(
                "body is {} bytes, below the {} byte minimum for a snappy frame",
                body.len(),
                SNAPPY_MIN_LEN
            ),
            "truncated",
        ));
    }

    let expected = snap::raw::decompress_len(body)
        .map_err(|e| fail(e.to_string(), "corrupt_stream"))?;
    if expected > max {
        return Err(fail(
            format!("decompressed size {} exceeds cap of {} bytes", expected, max),
            "too_large",
        ));
    }

    snap::raw::Decoder::new()
        .decompress_vec(body)
        .map_err(|e| fail(e.to_string(), "corrupt_stream"))
}
