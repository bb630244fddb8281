//! Application startup and lifecycle management.

use axum::{
    extract::State, http::StatusCode, middleware, response::IntoResponse, routing::get,
    routing::post, Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;

use crate::config::BankfeedConfig;
use crate::handlers::{accounts, automatch, categories, rules, transactions};
use crate::services::{get_metrics, init_metrics, Database};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: BankfeedConfig,
    pub db: Arc<Database>,
    /// Cancelled on shutdown; batch passes checkpoint on it between
    /// transactions.
    pub shutdown: CancellationToken,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "bankfeed-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "bankfeed-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: BankfeedConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the harness.
    pub async fn build_without_migrations(config: BankfeedConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(
        config: BankfeedConfig,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let state = AppState {
            config: config.clone(),
            db: Arc::new(db),
            shutdown: CancellationToken::new(),
        };

        let addr: SocketAddr = format!("{}:{}", config.common.host, config.common.port)
            .parse()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid listen address: {}", e)))?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Bankfeed service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Token that cancels in-flight batch work on shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            // Bank accounts and imports
            .route(
                "/accounts",
                post(accounts::register_account).get(accounts::list_accounts),
            )
            .route("/accounts/:account_id", get(accounts::get_account))
            .route(
                "/accounts/:account_id/imports",
                post(transactions::import_transactions),
            )
            .route(
                "/accounts/:account_id/transactions",
                get(transactions::list_transactions),
            )
            // Transaction match lifecycle
            .route(
                "/transactions/:transaction_id",
                get(transactions::get_transaction),
            )
            .route(
                "/transactions/:transaction_id/suggestions",
                get(transactions::get_suggestions),
            )
            .route(
                "/transactions/:transaction_id/match",
                post(transactions::apply_match),
            )
            .route(
                "/transactions/:transaction_id/accept",
                post(transactions::accept_suggestion),
            )
            .route(
                "/transactions/:transaction_id/reject",
                post(transactions::reject_suggestion),
            )
            .route(
                "/transactions/:transaction_id/unmatch",
                post(transactions::unmatch_transaction),
            )
            .route(
                "/transactions/:transaction_id/exclude",
                post(transactions::exclude_transaction),
            )
            .route(
                "/transactions/:transaction_id/reconcile",
                post(transactions::reconcile_transaction),
            )
            // Batch matching and rules
            .route("/automatch", post(automatch::run_auto_match))
            .route("/rules", post(rules::create_rule).get(rules::list_rules))
            .route(
                "/rules/:rule_id",
                get(rules::get_rule)
                    .patch(rules::update_rule)
                    .delete(rules::delete_rule),
            )
            .route(
                "/categories",
                post(categories::create_category).get(categories::list_categories),
            )
            .route("/stats", get(transactions::stats))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
            )
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(self.state);

        tracing::info!(
            service = "bankfeed-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await
    }
}
