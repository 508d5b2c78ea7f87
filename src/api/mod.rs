//! Roomcast HTTP Surface
//!
//! HTTP layer for Roomcast, built with Axum.
//!
//! # Endpoints
//!
//! ## WebSocket
//! - `GET /ws?roomId={room}&authorization={token}` - Join a room
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use roomcast::api::{serve, AppState};
//! use roomcast::config::Config;
//! use roomcast::history::{HistorySink, NoopHistoryPublisher};
//! use roomcast::identity::HttpIdentityValidator;
//! use roomcast::websocket::BroadcastHub;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let validator = Arc::new(HttpIdentityValidator::new(config.identity.client_config())?);
//!     let (history, _) = HistorySink::spawn(Arc::new(NoopHistoryPublisher), 1024);
//!     let hub = Arc::new(BroadcastHub::new(config.hub_config(), validator, history));
//!
//!     serve(AppState::new(hub), &config.server).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::websocket::{websocket_handler, BroadcastHub};

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .route("/ws", get(websocket_handler))
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Bind the configured address and serve until a shutdown signal
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<(), ApiError> {
    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Roomcast listening on {}", addr);
    serve_on(listener, state, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// The hub is told to shut down first, so every live session leaves its
/// room and closes before the listener stops.
pub async fn serve_on(
    listener: TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), ApiError> {
    let hub = Arc::clone(&state.hub);
    let router = build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.await;
            drain_hub(&hub).await;
        })
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Roomcast shut down gracefully");
    Ok(())
}

async fn drain_hub(hub: &BroadcastHub) {
    hub.shutdown();

    // Sessions leave on their own tasks; give them a moment.
    for _ in 0..50 {
        if hub.stats().await.connections == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::health::HealthResponse;
    use crate::history::{HistorySink, NoopHistoryPublisher};
    use crate::identity::{Identity, StaticIdentityValidator};
    use crate::websocket::HubConfig;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::util::ServiceExt;

    fn create_test_state() -> AppState {
        let validator =
            StaticIdentityValidator::new().with_token("tokA", Identity::new(1, "a@x.com"));
        let (history, _) = HistorySink::spawn(Arc::new(NoopHistoryPublisher), 16);
        let hub = BroadcastHub::new(HubConfig::default(), Arc::new(validator), history);
        AppState::new(Arc::new(hub))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let app = build_router(create_test_state());
        let response = app.oneshot(get("/health/live")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready() {
        let state = create_test_state();
        let hub = Arc::clone(&state.hub);
        let app = build_router(state);

        let response = app.clone().oneshot(get("/health/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        hub.shutdown();
        let response = app.oneshot(get("/health/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health_full() {
        let app = build_router(create_test_state());
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.rooms, 0);
        assert_eq!(health.connections, 0);
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_ws_requires_room_id() {
        let app = build_router(create_test_state());
        let response = app.oneshot(get("/ws?authorization=tokA")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ws_requires_authorization() {
        let app = build_router(create_test_state());
        let response = app.oneshot(get("/ws?roomId=r1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ws_refused_during_shutdown() {
        let state = create_test_state();
        let hub = Arc::clone(&state.hub);
        let app = build_router(state);
        hub.shutdown();

        let request = Request::builder()
            .uri("/ws?roomId=r1&authorization=tokA")
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-version", "13")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
        assert_eq!(hub.stats().await.rooms, 0);
    }

    #[tokio::test]
    async fn test_ws_without_upgrade_headers() {
        let app = build_router(create_test_state());
        let response = app
            .oneshot(get("/ws?roomId=r1&authorization=tokA"))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = build_router(create_test_state());
        let response = app.oneshot(get("/api/v1/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
