// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/domain/mod.rs

pub mod decision;
pub mod denial;
pub mod limits;

pub use decision::{Decision, ObservedCounts, Reason};
pub use denial::{DenialRecord, LimitExceeded, ParseDiagnostics};
pub use limits::{Dimension, EnforcementConfig, TenantLimits};
