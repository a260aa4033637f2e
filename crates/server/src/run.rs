//! Router assembly and server lifecycle.

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::ws::{ws_handler, AppState};

/// Build the application router. Exposed so tests can serve it on an
/// ephemeral port.
pub fn router(state: Arc<AppState>, cors_allowed_origins: Option<&str>) -> Router {
    let mut router = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = build_cors_layer(cors_allowed_origins) {
        router = router.layer(cors);
    }
    router
}

/// Bind and serve until the token is cancelled.
pub async fn serve(config: AppConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let state = AppState::new();
    let router = router(state, config.cors_allowed_origins.as_deref());

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %config.bind_addr(), "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

fn build_cors_layer(allowed_origins: Option<&str>) -> Option<CorsLayer> {
    let allowed_origins = allowed_origins.map(str::trim).filter(|s| !s.is_empty())?;

    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    if allowed_origins == "*" {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect();
        if origins.is_empty() {
            return None;
        }
        cors = cors.allow_origin(origins);
    }

    Some(cors)
}
