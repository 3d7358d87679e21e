//! Distributed cron service — entry point.
//!
//! Wires a [`dcron_core::StoreGateway`] (chosen by `store.backend` in config), the job registry,
//! cron wheel, firing pipeline, control plane, and bootstrap rehydration into a running axum
//! service, then blocks on the process signals a replica needs to shut down cleanly.
//!
//! # Configuration
//!
//! A YAML file resolved from `--config <path>`, falling back to `CONFIG_PATH`, falling back to
//! `config.yaml` — see [`dcron_core::config`].

mod events;
mod response;
mod routes;
mod state;

use std::sync::Arc;

use dcron_core::config::{self, StoreBackend};
use dcron_core::{Bootstrap, ControlPlane, DcronConfig, FiringPipeline, JobRegistry, Snowflake, Wheel, SCHEDULING_TZ};
use dcron_core::dispatch::{HttpDispatcher, PubsubDispatcher};
use dcron_core::store::MemoryStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::state::{AppState, DynStore};

/// Bridges the wheel to the firing pipeline without a circular construction dependency: the wheel
/// needs a `Firer` handle at construction, but the pipeline needs the wheel to already exist to
/// attach to it. This holds an empty slot until `build_state` fills it in right after the
/// pipeline is built.
struct WheelFirer(std::sync::OnceLock<Arc<FiringPipeline<DynStore>>>);

#[async_trait::async_trait]
impl dcron_core::Firer for WheelFirer {
    async fn fire(&self, job: dcron_core::Job) {
        if let Some(pipeline) = self.0.get() {
            pipeline.fire(job).await;
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("dcron_gateway=info".parse().unwrap()))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = config::resolve_config_path(&args);
    let cfg = match config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load configuration from {config_path}: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(config_path = %config_path, port = cfg.server.port, "configuration loaded");

    let state = build_state(&cfg).await;

    events::spawn(state.clone(), &cfg.pubsub.event_channel);

    // Rehydration runs concurrently with serving traffic; `rehydrate` itself flips the wheel's
    // readiness flag true at its very first step, before anything is loaded, so `/api/ping`
    // doesn't wait on however long the import takes.
    let bootstrap = Arc::clone(&state.bootstrap);
    tokio::spawn(async move {
        match bootstrap.rehydrate().await {
            Ok(n) => tracing::info!(jobs = n, "bootstrap rehydration complete"),
            Err(e) => tracing::error!(error = %e, "bootstrap rehydration failed"),
        }
    });

    let app = routes::router()
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());
    let app = axum::Router::new().nest("/api", app);

    let addr = format!("0.0.0.0:{}", cfg.server.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "failed to bind HTTP listener");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %addr, "dcron gateway listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
    {
        tracing::error!(error = %e, "HTTP server error");
    }

    state.control.wheel().set_ready(false);
    tokio::time::sleep(std::time::Duration::from_secs(cfg.grace_shutdown_secs)).await;
    tracing::info!("shutdown complete");
}

async fn build_state(cfg: &DcronConfig) -> AppState {
    let store: DynStore = match cfg.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Redis => match dcron_core::store::RedisStore::connect(&cfg.store.redis_host).await {
            Ok(s) => Arc::new(s),
            Err(e) => {
                tracing::error!(error = %e, "failed to connect to redis");
                std::process::exit(1);
            }
        },
    };

    let registry = Arc::new(JobRegistry::new(Arc::new(store)));
    let http = Arc::new(HttpDispatcher::new());
    let pubsub = Arc::new(PubsubDispatcher::new(Arc::clone(registry.store())));

    let firer = Arc::new(WheelFirer(std::sync::OnceLock::new()));
    let firer_handle: Arc<dyn dcron_core::Firer> = Arc::clone(&firer);
    let wheel = Arc::new(Wheel::new(SCHEDULING_TZ, firer_handle));

    let pipeline = Arc::new(FiringPipeline::new(Arc::clone(&registry), http, pubsub, SCHEDULING_TZ));
    pipeline.attach_wheel(&wheel);
    let _ = firer.0.set(Arc::clone(&pipeline));

    let ids = Arc::new(Snowflake::new());
    let control = Arc::new(ControlPlane::new(
        Arc::clone(&registry),
        Arc::clone(&wheel),
        Arc::clone(&pipeline),
        Arc::clone(&ids),
        SCHEDULING_TZ,
    ));
    let bootstrap = Arc::new(Bootstrap::new(Arc::clone(&registry), Arc::clone(&wheel), Arc::clone(&pipeline)));

    AppState {
        registry,
        control,
        bootstrap,
        ids,
        tz: SCHEDULING_TZ,
    }
}

/// Waits for SIGINT/SIGTERM/SIGHUP/SIGQUIT (or Ctrl+C on non-Unix), then flips readiness false and
/// stops the wheel — in-flight fires are left to finish, matching §5's cancellation sequence.
async fn shutdown_signal(state: AppState) {
    #[cfg(unix)]
    async fn terminate() {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut sighup = signal(SignalKind::hangup()).expect("install SIGHUP handler");
        let mut sigquit = signal(SignalKind::quit()).expect("install SIGQUIT handler");
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sighup.recv() => {},
            _ = sigquit.recv() => {},
        }
    }

    #[cfg(not(unix))]
    async fn terminate() {
        std::future::pending::<()>().await;
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = terminate() => {},
    }

    tracing::info!("shutdown signal received");
    state.control.wheel().set_ready(false);
    state.control.stop();
}
