// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/api/rest/mod.rs

pub mod dtos;
pub mod handlers;
pub mod routes;

pub use handlers::AdminState;
pub use routes::{build_health_router, build_router};
