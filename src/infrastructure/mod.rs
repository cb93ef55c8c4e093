// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/infrastructure/mod.rs

pub mod config;
pub mod metrics;
pub mod monitoring;
pub mod telemetry;

pub use config::Settings;
pub use metrics::Metrics;
pub use monitoring::EnforcementMonitor;
