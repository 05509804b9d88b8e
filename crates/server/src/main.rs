//! CallReady identity server.
//!
//! Serves the JSON auth and account API on port 3000.
//!
//! # Architecture
//!
//! - Axum web framework, JSON only
//! - Process-local identity cache in front of a `PostgreSQL` identity store
//! - Signed, client-held session tokens in the `cr_session` cookie
//!
//! Without a database URL the server keeps identities in memory; they are
//! lost on restart.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::sync::Arc;

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use callready_server::config::ServerConfig;
use callready_server::db;
use callready_server::routes;
use callready_server::services::identity::{IdentityStore, MemoryIdentityStore, PgIdentityStore};
use callready_server::state::AppState;

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ServerConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry.dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry
                .environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry.sample_rate,
            traces_sample_rate: config.sentry.traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = ServerConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "callready_server=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    // The pool connects lazily so the server starts, degraded, while the
    // database is down.
    let store: Arc<dyn IdentityStore> = match &config.database_url {
        Some(url) => {
            let pool = db::create_lazy_pool(url).expect("Invalid database URL");
            tracing::info!("Identity store: PostgreSQL");
            Arc::new(PgIdentityStore::new(pool))
        }
        None => {
            tracing::warn!(
                "No CALLREADY_DATABASE_URL or DATABASE_URL set; identities are kept in memory and lost on restart"
            );
            Arc::new(MemoryIdentityStore::new())
        }
    };

    // NOTE: Migrations are NOT run automatically on startup.
    // Run them explicitly via: cargo run -p callready-cli -- migrate

    let state = AppState::new(config.clone(), store).expect("Invalid Argon2 parameters");
    let app = routes::app(state);

    let addr = config.socket_addr();
    tracing::info!("callready-server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
