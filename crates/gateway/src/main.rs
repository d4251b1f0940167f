//! CaseGraph API Gateway
//!
//! The HTTP surface over the citation graph engine.
//! Handles:
//! - Document registration and lifecycle
//! - Citation edges and extraction runs
//! - Case-level citation map queries
//! - Observability (logging, metrics, tracing)

mod handlers;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use casegraph_common::{
    config::AppConfig,
    db::{DbPool, MemoryStore, Repository, Store},
    extraction::{create_extractor, ExtractionOrchestrator},
    metrics,
    query::QueryService,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub orchestrator: ExtractionOrchestrator,
    pub query: QueryService,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!("Starting CaseGraph API Gateway v{}", casegraph_common::VERSION);

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port != 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()?;
        info!("Prometheus exporter listening on {}", metrics_addr);
    }

    // Select the store backend
    let store: Arc<dyn Store> = if config.uses_memory_store() {
        info!("Using in-memory store backend");
        Arc::new(MemoryStore::new())
    } else {
        info!("Connecting to database...");
        let pool = DbPool::new(&config.database).await?;
        Arc::new(Repository::new(pool))
    };

    let extractor = create_extractor(&config.extractor);
    let state = AppState {
        config: config.clone(),
        store: store.clone(),
        orchestrator: ExtractionOrchestrator::new(store.clone(), extractor),
        query: QueryService::new(store, config.retry.clone()),
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Case endpoints
        .route(
            "/cases/{case_id}/documents",
            post(handlers::documents::create_document),
        )
        .route(
            "/cases/{case_id}/documents",
            get(handlers::documents::list_case_documents),
        )
        .route(
            "/cases/{case_id}/citation-map",
            get(handlers::documents::get_citation_map),
        )
        // Document endpoints
        .route("/documents/{id}", get(handlers::documents::get_document))
        .route(
            "/documents/{id}",
            delete(handlers::documents::delete_document),
        )
        .route(
            "/documents/{id}/processing-status",
            put(handlers::documents::update_processing_status),
        )
        // Citation endpoints
        .route(
            "/documents/{id}/citations",
            get(handlers::citations::get_document_citations),
        )
        .route(
            "/documents/{id}/citations",
            post(handlers::citations::create_citation),
        )
        .route(
            "/documents/{id}/extract-citations",
            post(handlers::extraction::extract_citations),
        );

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
