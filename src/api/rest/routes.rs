// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/api/rest/routes.rs

use axum::routing::{get, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers::{self, AdminState};

/// Builds the admin router. All state rides in `AdminState`; nothing is
/// global, so tests build as many isolated routers as they like.
pub fn build_router(admin: AdminState) -> Router {
    Router::new()
        .route("/api/tenants", get(handlers::list_tenants))
        .route(
            "/api/tenants/:id",
            get(handlers::get_tenant).delete(handlers::delete_tenant),
        )
        .route("/api/tenants/:id/limits", put(handlers::put_limits))
        .route("/api/tenants/:id/enforcement", put(handlers::put_enforcement))
        .route("/api/overview", get(handlers::overview))
        .route("/api/denials", get(handlers::denials))
        .route("/api/cardinality", get(handlers::cardinality))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(admin)
}

/// The standalone liveness router served on the health listener.
pub fn build_health_router(admin: AdminState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .with_state(admin)
}
