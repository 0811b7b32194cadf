//! Tenang API server binary.
//!
//! Serves the admission-guarded router and runs the limiter sweep until
//! Ctrl-C, then drains in-flight requests and stops the sweep.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tenang_core::admission::AdmissionLimiter;
use tenang_core::auth::queries::PgUserStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "tenang_api_server", about = "Tenang API server")]
struct Args {
    /// Address to listen on. Overrides `BIND_ADDR`.
    #[arg(long)]
    bind: Option<String>,

    /// PostgreSQL connection URL. Overrides `DATABASE_URL`.
    #[arg(long)]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Key anonymous clients by forwarding headers. Overrides `TRUST_PROXY_HEADERS`.
    #[arg(long, default_value_t = false)]
    trust_proxy_headers: bool,
}

/// Cancel `shutdown` once `signal` fires. A signal listener that fails to
/// install leaves the server running.
async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("shutdown requested");
            shutdown.cancel();
        }
        Err(e) => warn!(error = %e, "failed to listen for ctrl-c; graceful shutdown disabled"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,tenang_api=debug,tenang_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = tenang_api::config::ApiConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(database_url) = args.database_url {
        config.database_url = database_url;
    }
    config.trust_proxy_headers |= args.trust_proxy_headers;

    info!(
        bind_addr = %config.bind_addr,
        max_connections = args.max_connections,
        trust_proxy_headers = config.trust_proxy_headers,
        "starting tenang_api_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.database_url)
        .await?;

    let shutdown = CancellationToken::new();
    let (limiter, sweeper) = AdmissionLimiter::start(config.limiter.clone(), &shutdown);

    let state = tenang_api::AppState::new(
        config.clone(),
        limiter,
        Arc::new(PgUserStore::new(pool)),
    );
    let app = tenang_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), shutdown.clone()));

    let serve_result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move { shutdown.cancelled().await }
    })
    .await;

    shutdown.cancel();
    sweeper.shutdown().await;

    serve_result?;
    info!("server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_cancels_shutdown() {
        let shutdown = CancellationToken::new();
        cancel_on_signal(async { Ok(()) }, shutdown.clone()).await;
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn failed_signal_listener_keeps_serving() {
        let shutdown = CancellationToken::new();
        let failed = async { Err(std::io::Error::other("no signal driver")) };
        cancel_on_signal(failed, shutdown.clone()).await;
        assert!(!shutdown.is_cancelled());
    }
}
