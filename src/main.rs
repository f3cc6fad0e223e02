use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

mod audit;
mod catalog;
mod config;
mod db;
mod error;
mod export;
mod filters;
mod handlers;
mod models;
mod reconciliation;
mod seed;

use crate::config::Config;

/// Shared application state, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (ignored in production where env vars are injected)
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,oos_service=debug")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = Config::from_env()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Out-of-Stock Service — Rust + Axum  ║");
    info!("╚══════════════════════════════════════╝");

    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    info!("Database connection pool established.");

    info!("Running migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations complete.");

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        db: pool,
        config: Arc::new(config),
    };

    let app = build_router(state);

    info!("Listening on http://{}", addr);
    info!(
        "Quick-start: POST http://{}/api/seed (with x-operator-id / x-operator-name headers)",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        // ── Health ──────────────────────────────────────────────────────────
        .route("/health", get(handlers::health))

        // ── Customers ───────────────────────────────────────────────────────
        .route(
            "/api/customers",
            get(handlers::customers::list_customers).post(handlers::customers::create_customer),
        )
        .route(
            "/api/customers/:id",
            get(handlers::customers::get_customer)
                .put(handlers::customers::update_customer)
                .delete(handlers::customers::delete_customer),
        )

        // ── Products ────────────────────────────────────────────────────────
        .route(
            "/api/products",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route(
            "/api/products/:id",
            get(handlers::products::get_product)
                .put(handlers::products::update_product)
                .delete(handlers::products::delete_product),
        )

        // ── Out-of-stock requests ───────────────────────────────────────────
        .route(
            "/api/requests",
            get(handlers::requests::list_requests).post(handlers::requests::create_request),
        )
        .route("/api/requests/batch", post(handlers::requests::create_request_batch))
        .route("/api/requests/batch/update", post(handlers::requests::batch_update))
        .route("/api/requests/batch/delete", post(handlers::requests::batch_delete))
        .route("/api/requests/grouped", get(handlers::requests::grouped_requests))
        .route("/api/requests/summary", get(handlers::requests::request_summary))
        .route("/api/requests/export/csv", get(handlers::requests::export_csv))
        .route(
            "/api/requests/:id",
            get(handlers::requests::get_request)
                .put(handlers::requests::update_request)
                .delete(handlers::requests::delete_request),
        )
        .route("/api/requests/:id/status", post(handlers::requests::change_status))

        // ── Deliveries ──────────────────────────────────────────────────────
        .route(
            "/api/requests/:id/deliveries",
            post(handlers::deliveries::apply_delivery),
        )
        .route("/api/deliveries/batch", post(handlers::deliveries::apply_batch))

        // ── Audit history ───────────────────────────────────────────────────
        .route("/api/audit-logs", get(handlers::audit::list_audit_logs))
        .route("/api/audit-logs/entity/:id", get(handlers::audit::entity_history))

        // ── Seed ────────────────────────────────────────────────────────────
        .route("/api/seed", post(handlers::seed::seed_data))

        // ── Middleware ──────────────────────────────────────────────────────
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
