// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/controller/translate.rs
//
// Maps the overrides document's source-side keys onto tenant limit
// records. Unrecognized keys are reported back for logging, never fatal;
// a tenant entry only fails translation when a recognized key carries an
// unusable value.

use std::collections::BTreeMap;

use serde_yaml::Value;
use thiserror::Error;

use crate::application::TenantEntry;
use crate::domain::{EnforcementConfig, TenantLimits};
use crate::error::SourceError;

#[derive(Error, Debug, PartialEq)]
pub enum TranslateError {
    #[error("tenant entry is not a mapping")]
    NotAMapping,

    #[error("key {key:?}: {detail}")]
    BadValue { key: String, detail: String },
}

/// A parsed overrides document: tenant → raw key/value mapping.
pub type RawDocument = BTreeMap<String, Value>;

/// Parses the document text. Accepts either a bare tenant mapping or the
/// runtime-config shape with a top-level `overrides:` key.
pub fn parse_document(text: &str) -> Result<RawDocument, SourceError> {
    if text.trim().is_empty() {
        return Ok(RawDocument::new());
    }
    let root: Value = serde_yaml::from_str(text)?;
    let mut mapping = match root {
        Value::Null => return Ok(RawDocument::new()),
        Value::Mapping(m) => m,
        _ => {
            return Err(SourceError::WatchFailed {
                message: "overrides document root is not a mapping".to_string(),
            })
        }
    };

    // Runtime-config shape: the tenant mapping sits under `overrides:`.
    let wrapped = mapping.iter().find_map(|(key, value)| {
        match (key.as_str(), value) {
            (Some("overrides"), Value::Mapping(inner)) => Some(inner.clone()),
            _ => None,
        }
    });
    if let Some(inner) = wrapped {
        mapping = inner;
    }

    let mut document = RawDocument::new();
    for (key, value) in mapping {
        if let Value::String(tenant) = key {
            document.insert(tenant, value);
        }
    }
    Ok(document)
}

/// A tenant entry translated out of the document.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedTenant {
    pub limits: TenantLimits,
    pub enforcement: EnforcementConfig,
    /// Keys present in the source but unknown to the translation table.
    pub ignored_keys: Vec<String>,
}

/// Derives a burst percentage from a raw burst size:
/// `100 × (burst_size / rate − 1)`, clamped into `[0, 1000]`.
pub fn derive_burst_percent(rate: f64, burst_size: f64) -> f64 {
    if rate <= 0.0 {
        return 0.0;
    }
    (100.0 * (burst_size / rate - 1.0)).clamp(0.0, 1000.0)
}

fn as_f64(key: &str, value: &Value) -> Result<f64, TranslateError> {
    value.as_f64().ok_or_else(|| TranslateError::BadValue {
        key: key.to_string(),
        detail: format!("expected a number, got {:?}", value),
    })
}

fn as_u64(key: &str, value: &Value) -> Result<u64, TranslateError> {
    value.as_u64().ok_or_else(|| TranslateError::BadValue {
        key: key.to_string(),
        detail: format!("expected a non-negative integer, got {:?}", value),
    })
}

fn as_u32(key: &str, value: &Value) -> Result<u32, TranslateError> {
    let v = as_u64(key, value)?;
    u32::try_from(v).map_err(|_| TranslateError::BadValue {
        key: key.to_string(),
        detail: format!("{} does not fit in 32 bits", v),
    })
}

fn as_bool(key: &str, value: &Value) -> Result<bool, TranslateError> {
    value.as_bool().ok_or_else(|| TranslateError::BadValue {
        key: key.to_string(),
        detail: format!("expected a boolean, got {:?}", value),
    })
}

/// Translates one tenant's raw mapping, starting from the configured
/// defaults so absent keys keep their default meaning.
pub fn translate_tenant(
    raw: &Value,
    defaults: &TenantEntry,
) -> Result<TranslatedTenant, TranslateError> {
    let mapping = raw.as_mapping().ok_or(TranslateError::NotAMapping)?;

    let mut limits = defaults.limits.clone();
    let mut enforcement = defaults.enforcement.clone();
    let mut ignored_keys = Vec::new();
    let mut burst_size: Option<f64> = None;
    let mut direct_burst_percent = false;

    for (key, value) in mapping {
        let key = match key.as_str() {
            Some(key) => key,
            None => continue,
        };
        match key {
            "ingestion_rate" => limits.samples_per_second = as_f64(key, value)?,
            "ingestion_burst_size" => burst_size = Some(as_f64(key, value)?),
            "burst_percent" => {
                limits.burst_percent = as_f64(key, value)?.clamp(0.0, 1000.0);
                direct_burst_percent = true;
            }
            "bytes_per_second" => limits.bytes_per_second = as_f64(key, value)?,
            "max_body_bytes" => limits.max_body_bytes = as_u64(key, value)?,
            "max_series_per_query" => limits.max_series_per_request = as_u32(key, value)?,
            "max_series_per_metric" => limits.max_series_per_metric = as_u32(key, value)?,
            "max_label_names_per_series" => limits.max_labels_per_series = as_u32(key, value)?,
            "max_label_value_length" => limits.max_label_value_length = as_u32(key, value)?,
            // Recognized but carries no enforcement here: global series
            // limits live in the distributor, not at the edge.
            "max_global_series_per_user" => {}
            "enabled" => enforcement.enabled = as_bool(key, value)?,
            "enforce_samples_per_second" => {
                enforcement.enforce_samples_per_second = as_bool(key, value)?
            }
            "enforce_bytes_per_second" => {
                enforcement.enforce_bytes_per_second = as_bool(key, value)?
            }
            "enforce_max_body_bytes" => {
                enforcement.enforce_max_body_bytes = as_bool(key, value)?
            }
            "enforce_max_labels_per_series" => {
                enforcement.enforce_max_labels_per_series = as_bool(key, value)?
            }
            "enforce_max_series_per_request" => {
                enforcement.enforce_max_series_per_request = as_bool(key, value)?
            }
            "enforce_max_series_per_metric" => {
                enforcement.enforce_max_series_per_metric = as_bool(key, value)?
            }
            other => ignored_keys.push(other.to_string()),
        }
    }

    // A raw burst size only matters when no direct percentage was given.
    if let Some(burst) = burst_size {
        if !direct_burst_percent {
            limits.burst_percent = derive_burst_percent(limits.samples_per_second, burst);
        }
    }

    Ok(TranslatedTenant {
        limits,
        enforcement,
        ignored_keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> TenantEntry {
        TenantEntry {
            limits: TenantLimits::default(),
            enforcement: EnforcementConfig::default(),
        }
    }

    fn tenant_value(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_translation_table() {
        let value = tenant_value(
            r#"
ingestion_rate: 1000
ingestion_burst_size: 1500
max_series_per_query: 5000
max_label_names_per_series: 30
max_label_value_length: 2048
max_global_series_per_user: 1000000
"#,
        );
        let translated = translate_tenant(&value, &defaults()).unwrap();
        assert_eq!(translated.limits.samples_per_second, 1000.0);
        assert_eq!(translated.limits.burst_percent, 50.0);
        assert_eq!(translated.limits.max_series_per_request, 5000);
        assert_eq!(translated.limits.max_labels_per_series, 30);
        assert_eq!(translated.limits.max_label_value_length, 2048);
        assert!(translated.ignored_keys.is_empty());
    }

    #[test]
    fn test_unrecognized_keys_reported_not_fatal() {
        let value = tenant_value("ingestion_rate: 100\nshard_size: 4\n");
        let translated = translate_tenant(&value, &defaults()).unwrap();
        assert_eq!(translated.limits.samples_per_second, 100.0);
        assert_eq!(translated.ignored_keys, vec!["shard_size"]);
    }

    #[test]
    fn test_bad_value_is_an_error() {
        let value = tenant_value("ingestion_rate: fast\n");
        let err = translate_tenant(&value, &defaults()).unwrap_err();
        assert!(matches!(err, TranslateError::BadValue { .. }));
    }

    #[test]
    fn test_burst_derivation_clamps() {
        assert_eq!(derive_burst_percent(100.0, 150.0), 50.0);
        // Burst below the rate clamps to zero rather than going negative.
        assert_eq!(derive_burst_percent(100.0, 50.0), 0.0);
        // Huge burst clamps at 1000.
        assert_eq!(derive_burst_percent(1.0, 1_000_000.0), 1000.0);
        // No rate, no derivation.
        assert_eq!(derive_burst_percent(0.0, 500.0), 0.0);
    }

    #[test]
    fn test_direct_burst_percent_wins_over_derivation() {
        let value = tenant_value(
            "ingestion_rate: 100\ningestion_burst_size: 500\nburst_percent: 10\n",
        );
        let translated = translate_tenant(&value, &defaults()).unwrap();
        assert_eq!(translated.limits.burst_percent, 10.0);
    }

    #[test]
    fn test_enforcement_gates() {
        let value = tenant_value("enabled: false\nenforce_max_body_bytes: false\n");
        let translated = translate_tenant(&value, &defaults()).unwrap();
        assert!(!translated.enforcement.enabled);
        assert!(!translated.enforcement.enforce_max_body_bytes);
    }

    #[test]
    fn test_parse_document_bare_and_wrapped() {
        let bare = parse_document("t1:\n  ingestion_rate: 10\n").unwrap();
        assert!(bare.contains_key("t1"));

        let wrapped = parse_document("overrides:\n  t1:\n    ingestion_rate: 10\n").unwrap();
        assert!(wrapped.contains_key("t1"));

        let empty = parse_document("").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_parse_document_rejects_non_mapping() {
        assert!(parse_document("- a\n- b\n").is_err());
    }
}
