//! Multi-store CD key service - main application entry point.
//!
//! One binary serves either role of the multi-site topology, selected by
//! configuration: the Primary owns the key inventory, catalog, and
//! cross-site order registry; Secondaries sync the catalog and send their
//! paid orders here for allocation and mirroring.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: HMAC-signed requests with timestamp and nonce
//!   replay protection
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build HTTP router with the signed route group
//! 5. Start the role's background schedulers
//! 6. Start server on configured port

use tracing_subscriber::EnvFilter;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, patch, post, put},
};
use tower_http::trace::TraceLayer;

use multishop::config::{self, SiteMode};
use multishop::services::{fulfillment, outbound};
use multishop::state::AppState;
use multishop::{db, handlers, middleware};

/// Cadence of the background jobs: fulfillment sweep on the Primary,
/// mirror-queue drain and catalog sync on Secondaries.
const SCHEDULER_PERIOD_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load and validate configuration
    let config = config::Config::from_env()?;
    config.validate()?;
    tracing::info!(mode = ?config.mode, site_id = %config.site_id, "Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let state = AppState::new(pool, config)?;

    // Every cross-site and event route is signed; verification runs
    // before any handler.
    let signed_routes = Router::new()
        // Cross-site protocol (served by the Primary)
        .route("/api/v1/allocate-keys", post(handlers::allocate::allocate_keys))
        .route("/api/v1/mirror-order", post(handlers::mirror::mirror_order))
        .route("/api/v1/catalog", get(handlers::catalog::get_catalog))
        .route(
            "/api/v1/payments-config",
            get(handlers::payments::get_payments_config),
        )
        .route(
            "/api/v1/payments-config",
            put(handlers::payments::update_payments_config),
        )
        // Checkout-facing gateway lookup (served by Secondaries)
        .route(
            "/api/v1/allowed-gateways",
            get(handlers::payments::get_allowed_gateways),
        )
        // Key inventory administration
        .route("/api/v1/keys/import", post(handlers::keys::import_keys))
        .route("/api/v1/keys", get(handlers::keys::list_keys))
        .route("/api/v1/keys/{id}", patch(handlers::keys::update_key))
        .route("/api/v1/keys/{id}", delete(handlers::keys::delete_key))
        // Storefront event intake
        .route("/api/v1/orders/paid", post(handlers::orders::order_paid))
        // Site registry
        .route("/api/v1/sites", post(handlers::sites::register_site))
        .route("/api/v1/sites", get(handlers::sites::list_sites))
        // Apply signature verification to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::signature::verify_signature,
        ));

    // Combine signed routes with public routes
    let app = Router::new()
        // Public routes (no authentication required)
        .route("/health", get(handlers::health::health_check))
        // Merge signed routes
        .merge(signed_routes)
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        // Share application state with all handlers via State extraction
        .with_state(state.clone());

    spawn_schedulers(state.clone());

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", state.config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Start serving HTTP requests
    // This blocks forever, handling requests concurrently with tokio
    axum::serve(listener, app).await?;

    Ok(())
}

/// Start the hourly background jobs for this installation's role.
///
/// The Primary re-attempts open backorders as a safety net behind the
/// import-triggered reconciliation. Secondaries drain the mirror retry
/// queue and refresh their catalog copy. Job failures are logged and the
/// loop keeps its cadence; nothing here can take the server down.
fn spawn_schedulers(state: AppState) {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(SCHEDULER_PERIOD_SECS));
        // The first tick fires immediately; skip it so a crash-looping
        // process does not hammer the jobs on every restart.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match state.config.mode {
                SiteMode::Primary => {
                    if let Err(e) =
                        fulfillment::sweep(&state.pool, &state.config, &state.cipher).await
                    {
                        tracing::error!(error = %e, "fulfillment sweep failed");
                    }
                }
                SiteMode::Secondary => {
                    if let Err(e) = outbound::drain_mirror_queue(&state).await {
                        tracing::error!(error = %e, "mirror queue drain failed");
                    }
                    if let Err(e) = outbound::sync_catalog(&state).await {
                        tracing::error!(error = %e, "catalog sync failed");
                    }
                }
            }
        }
    });
}
