// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/error.rs

use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, Error>;

/// Main application error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Overrides source error: {0}")]
    Source(#[from] SourceError),

    #[error("Payload parse error: {0}")]
    Parse(#[from] crate::parser::ParseError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Deadline exceeded after {elapsed_ms} ms")]
    Deadline { elapsed_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors raised while reading or watching the overrides document.
///
/// All variants are transient from the controller's point of view: the
/// watch loop retries with backoff and the poll fallback keeps running.
/// They are only fatal when the very first reconcile at startup fails.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("overrides document unreadable at {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("overrides document malformed: {0}")]
    Malformed(#[from] serde_yaml::Error),

    #[error("watch subscription failed: {message}")]
    WatchFailed { message: String },
}

/// Validation errors surfaced to admin API callers as 400s
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("field '{field}': {message}")]
    Field { field: String, message: String },
}

impl ValidationError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            message: message.into(),
        }
    }
}

// HTTP status code mappings for the admin REST surface
impl Error {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;

        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Parse(_) => StatusCode::BAD_REQUEST,
            Error::Deadline { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
