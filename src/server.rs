//! # Server Configuration
//!
//! This module contains the server setup and configuration for the
//! analytics API.

use std::sync::Arc;

use axum::{Router, routing::get};
use sea_orm::DatabaseConnection;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::handlers;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/reports/top-products", get(handlers::reports::top_products))
        .route(
            "/reports/visual-content",
            get(handlers::reports::visual_content),
        )
        .route(
            "/channels/{channel_name}/activity",
            get(handlers::channels::channel_activity),
        )
        .route("/search/messages", get(handlers::search::search_messages))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    // Resolve the configured bind address
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState {
        config: Arc::new(config),
        db,
    };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile, "analytics API listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::reports::top_products,
        crate::handlers::reports::visual_content,
        crate::handlers::channels::channel_activity,
        crate::handlers::search::search_messages,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::reports::TopProduct,
            crate::handlers::reports::VisualContentStats,
            crate::handlers::channels::ChannelActivity,
            crate::handlers::search::MessageSearchResult,
        )
    ),
    info(
        title = "Medical Telegram Analytics API",
        description = "Read-only analytics over scraped Telegram medical channels",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
