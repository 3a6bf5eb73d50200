//! Account service.
//!
//! A user-account HTTP backend built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                   ACCOUNT SERVICE                    │
//!                    │                                                      │
//!   Client Request   │  ┌──────────┐   ┌──────────────┐   ┌─────────────┐   │
//!   ─────────────────┼─▶│  global  │──▶│ ElegantRouter│──▶│   binder    │   │
//!                    │  │middleware│   │ groups/auth  │   │ + validate  │   │
//!                    │  └──────────┘   └──────────────┘   └──────┬──────┘   │
//!                    │                                           ▼          │
//!   Client Response  │  ┌──────────┐                      ┌─────────────┐   │
//!   ◀────────────────┼──│ envelope │◀─────────────────────│ UserService │   │
//!                    │  └──────────┘                      └──────┬──────┘   │
//!                    │                         store ◀──────────┴───▶ cache │
//!                    │                                                      │
//!                    │  cross-cutting: config, RequestContext, logging,     │
//!                    │  metrics, scheduler, lifecycle                       │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use account_service::config::{load_config, validate_config, AppConfig, ConfigError};
use account_service::lifecycle::{shutdown_signal, Components, Shutdown};
use account_service::observability::logging::init_logging;
use account_service::observability::{metrics, LogSink, TracingSink};
use account_service::HttpServer;

#[derive(Parser)]
#[command(name = "account-service")]
#[command(about = "User account HTTP service", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    validate_config(&config).map_err(ConfigError::Validation)?;
    let generated_secret = config.auth.ensure_secret();

    init_logging(&config.log)?;
    tracing::info!("account-service v{} starting", env!("CARGO_PKG_VERSION"));
    if generated_secret {
        tracing::warn!("auth.jwt_secret is not set; using a random secret, tokens will not survive a restart");
    }
    tracing::info!(
        bind_address = %config.server.bind_address,
        request_timeout_secs = config.server.request_timeout_secs,
        cache_enabled = config.cache.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let logger: Arc<dyn LogSink> = Arc::new(TracingSink);
    let components = Components::from_config(&config);
    let shutdown = Shutdown::new();

    let jobs = components.scheduler(&config, logger.clone())?.start(&shutdown);

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let server = HttpServer::new(
        config.server.clone(),
        &components.api,
        logger,
        shutdown.context_root(),
    );

    let serve = server.run(listener, shutdown.subscribe());
    tokio::pin!(serve);
    tokio::select! {
        result = &mut serve => result?,
        () = shutdown_signal() => {
            shutdown.trigger();
            serve.await?;
        }
    }
    // Also covers the server exiting on its own
    shutdown.drain(jobs).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
