// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/lib.rs

pub mod api;
pub mod application;
pub mod controller;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod parser;

// Re-exports for convenience
pub use application::{
    AuthorizeRequest, DecisionEngine, EngineConfig, EnforcementState, LimitStore,
};
pub use controller::{ControllerConfig, FileOverridesSource, OverridesController, SyncPhase};
pub use domain::{Decision, DenialRecord, Dimension, EnforcementConfig, Reason, TenantLimits};
pub use error::{Error, Result};
pub use infrastructure::{EnforcementMonitor, Metrics, Settings};
pub use parser::{ParseError, ParseResult};

// Common types
pub use chrono::{DateTime, Utc};
pub use std::sync::Arc;
