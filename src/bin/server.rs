// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/bin/server.rs
//! Tollgate enforcement server
//!
//! Runs the ext-authz and ratelimit RPC surfaces, the admin HTTP surface,
//! and the overrides synchronization controller.
//!
//! Exit codes: 0 clean shutdown, 1 fatal startup error, 2 unrecoverable
//! runtime error.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_stream::wrappers::TcpListenerStream;
use tracing::{error, info};

use tollgate::api::grpc::proto::authorization_server::AuthorizationServer;
use tollgate::api::grpc::proto::rate_limit_service_server::RateLimitServiceServer;
use tollgate::api::grpc::{ExtAuthzService, RateLimitSvc, RpcConfig};
use tollgate::api::rest::{build_health_router, build_router, AdminState};
use tollgate::application::MonotonicClock;
use tollgate::controller::ControllerConfig;
use tollgate::infrastructure::telemetry;
use tollgate::{
    DecisionEngine, EngineConfig, EnforcementState, FileOverridesSource, Metrics,
    OverridesController, Settings,
};

const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "tollgate", version, about = "Per-tenant ingestion enforcement")]
struct Args {
    /// Overrides document path, overriding the configured one.
    #[arg(long)]
    overrides: Option<String>,
}

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut settings = match Settings::new().and_then(|s| s.validate().map(|_| s)) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("fatal: configuration error: {e}");
            return 1;
        }
    };
    if let Some(path) = args.overrides {
        settings.overrides.path = path;
    }

    telemetry::init(&settings.log);
    info!(
        ext_authz = %settings.server.ext_authz_addr,
        rate_limit = %settings.server.rate_limit_addr,
        admin = %settings.server.admin_addr,
        health = %settings.server.health_addr,
        overrides = %settings.overrides.path,
        "Starting tollgate"
    );

    match serve(settings).await {
        Ok(()) => {
            info!("Server shutdown complete");
            0
        }
        Err(e) => {
            error!(error = %e, "Fatal error");
            if e.downcast_ref::<StartupError>().is_some() {
                1
            } else {
                2
            }
        }
    }
}

/// Errors that prevent the service from ever doing useful work.
#[derive(Debug, thiserror::Error)]
#[error("startup failed: {0}")]
struct StartupError(String);

async fn serve(settings: Settings) -> Result<()> {
    let metrics = Arc::new(
        Metrics::new().map_err(|e| StartupError(format!("metrics registry: {e}")))?,
    );
    let clock = Arc::new(MonotonicClock);
    let state = Arc::new(EnforcementState::new(
        settings.defaults.limits.clone(),
        settings.defaults.enforcement.clone(),
        settings.denial_log.capacity,
        clock,
        metrics,
    ));

    let engine = Arc::new(DecisionEngine::new(
        state.clone(),
        EngineConfig {
            failure_mode_allow: settings.enforcement.failure_mode_allow,
            allow_unknown_tenant: settings.enforcement.allow_unknown_tenant,
            max_decompressed_bytes: settings.enforcement.max_decompressed_bytes,
        },
    ));

    let rpc_config = RpcConfig {
        tenant_header: settings.enforcement.tenant_header.to_lowercase(),
        write_path_prefix: settings.enforcement.write_path_prefix.clone(),
        check_deadline: Duration::from_millis(settings.enforcement.check_deadline_ms),
        fail_open: settings.enforcement.on_timeout == "allow",
        max_inflight: settings.enforcement.max_inflight,
    };

    // One full reconcile gates startup: a configuration source that cannot
    // be read on the first try is a fatal startup error.
    let source = Arc::new(FileOverridesSource::new(settings.overrides.path.clone()));
    let controller = Arc::new(OverridesController::new(
        source,
        state.clone(),
        ControllerConfig {
            poll_fallback: Duration::from_secs(settings.overrides.poll_fallback_seconds),
            watch_backoff_base: Duration::from_millis(settings.overrides.watch_backoff_base_ms),
            watch_backoff_cap: Duration::from_millis(settings.overrides.watch_backoff_cap_ms),
        },
    ));
    let summary = controller
        .reconcile()
        .await
        .map_err(|e| StartupError(format!("initial overrides reconcile: {e}")))?;
    info!(
        applied = summary.applied,
        skipped = summary.skipped,
        "Initial overrides reconcile complete"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();

    // Overrides controller.
    {
        let controller = controller.clone();
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            controller.run(shutdown).await;
            Ok::<_, anyhow::Error>(())
        });
    }

    // RPC listeners. When both services share an address they share one
    // listener as well.
    let ext_authz_addr: SocketAddr = settings
        .server
        .ext_authz_addr
        .parse()
        .map_err(|e| StartupError(format!("ext_authz_addr: {e}")))?;
    let rate_limit_addr: SocketAddr = settings
        .server
        .rate_limit_addr
        .parse()
        .map_err(|e| StartupError(format!("rate_limit_addr: {e}")))?;

    let ext_authz = AuthorizationServer::new(ExtAuthzService::new(engine, rpc_config.clone()));
    let rate_limit = RateLimitServiceServer::new(RateLimitSvc::new(state.clone(), rpc_config));

    if ext_authz_addr == rate_limit_addr {
        let listener = bind(ext_authz_addr).await?;
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            tonic::transport::Server::builder()
                .add_service(ext_authz)
                .add_service(rate_limit)
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), flipped(shutdown))
                .await
                .context("grpc listener")
        });
    } else {
        let listener = bind(ext_authz_addr).await?;
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            tonic::transport::Server::builder()
                .add_service(ext_authz)
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), flipped(shutdown))
                .await
                .context("ext-authz listener")
        });

        let listener = bind(rate_limit_addr).await?;
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            tonic::transport::Server::builder()
                .add_service(rate_limit)
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), flipped(shutdown))
                .await
                .context("ratelimit listener")
        });
    }

    // Admin surface, with liveness on its own listener.
    let admin = AdminState {
        state: state.clone(),
    };
    let admin_addr: SocketAddr = settings
        .server
        .admin_addr
        .parse()
        .map_err(|e| StartupError(format!("admin_addr: {e}")))?;
    let health_addr: SocketAddr = settings
        .server
        .health_addr
        .parse()
        .map_err(|e| StartupError(format!("health_addr: {e}")))?;

    {
        let listener = bind(admin_addr).await?;
        let router = build_router(admin.clone());
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(flipped(shutdown))
                .await
                .context("admin listener")
        });
    }
    if health_addr != admin_addr {
        let listener = bind(health_addr).await?;
        let router = build_health_router(admin);
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(flipped(shutdown))
                .await
                .context("health listener")
        });
    }

    info!("All listeners up");

    // Wait for a shutdown signal or the first task failure.
    let failure = tokio::select! {
        _ = shutdown_signal() => None,
        result = tasks.join_next() => result.map(|joined| match joined {
            Ok(Ok(())) => anyhow::anyhow!("listener exited unexpectedly"),
            Ok(Err(e)) => e,
            Err(e) => anyhow::anyhow!("task panicked: {e}"),
        }),
    };

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    let drain = async {
        while tasks.join_next().await.is_some() {}
    };
    if tokio::time::timeout(SHUTDOWN_DRAIN, drain).await.is_err() {
        error!("Drain timed out, aborting remaining tasks");
        tasks.abort_all();
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| StartupError(format!("cannot bind {addr}: {e}")).into())
}

/// Resolves once the shutdown flag flips.
fn flipped(mut rx: watch::Receiver<bool>) -> impl std::future::Future<Output = ()> {
    async move {
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
