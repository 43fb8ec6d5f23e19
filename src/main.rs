//! Broadcast API - Multi-Workspace Content Broadcasting
//!
//! Replicates a record from one workspace into linked copies on other
//! workspaces, together with its classification terms, attributes and
//! assets, and keeps the links between original and copies up to date.
//!
//! Link data and per-user settings persist in PostgreSQL when a database is
//! configured, otherwise in process memory.

mod broadcast;
mod config;
mod db;
mod error;
mod links;
mod models;
mod preferences;
mod routes;
mod state;
mod store;

use crate::broadcast::Broadcaster;
use crate::config::Settings;
use crate::links::{LinkRegistry, PostgresLinkStore};
use crate::preferences::PreferenceStore;
use crate::routes::create_router;
use crate::state::AppState;
use crate::store::{MemoryStore, SaveListener};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting Broadcast API...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    // Link registry and preferences: PostgreSQL when configured
    let (links, preferences) = match &settings.database {
        Some(database) => {
            let url = settings.database_url.as_deref().unwrap_or_default();
            let pool = match db::init_pool(url, database).await {
                Ok(pool) => pool,
                Err(e) => {
                    error!("❌ Failed to initialize database pool: {}", e);
                    return Err(e.into());
                }
            };
            info!("✅ Database pool created successfully");

            if let Err(e) = db::create_tables(&pool).await {
                warn!("⚠️  Warning creating tables: {}", e);
            }

            (
                LinkRegistry::new(Arc::new(PostgresLinkStore::new(pool.clone()))),
                PreferenceStore::postgres(pool),
            )
        }
        None => {
            warn!("⚠️  No database configured, links and preferences are kept in memory");
            (LinkRegistry::in_memory(), PreferenceStore::in_memory())
        }
    };

    // Content store
    let store = Arc::new(MemoryStore::new(settings.store.upload_root.clone()));
    match &settings.store.fixture {
        Some(path) => store.load_fixture(path).await?,
        None => warn!("⚠️  CONTENT_FIXTURE not set, the content store starts empty"),
    }
    info!("📁 Uploads stored under {}", settings.store.upload_root.display());

    let broadcaster = Arc::new(Broadcaster::new(
        store.clone(),
        links,
        Arc::new(preferences),
        settings.broadcast.clone(),
    ));
    let listener: Arc<dyn SaveListener> = broadcaster.clone();
    store.set_save_listener(Arc::downgrade(&listener));

    let state = Arc::new(AppState::new(broadcaster));

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   GET  /health                                 - Health check");
    info!("   POST /api/broadcast                          - Broadcast a record");
    info!("   GET  /api/links/:workspace/:record           - Link entry of a record");
    info!("   POST /api/records/actions                    - Delete, trash, restore, unlink, link unlinked");
    info!("   POST /api/records/:workspace/:record/saved   - Save hook");
    info!("   POST /api/records/:workspace/:record/lifecycle - Trash, untrash, delete propagation");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,broadcast_api=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
