//! Helm Broker API Layer
//!
//! This crate exposes the broker over the Open Service Broker v2 HTTP API
//! using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers for the OSB endpoints and health probes
//! - **Routes**: Cluster-wide and namespaced route trees
//! - **Middleware**: Request tracing, request ids, API version check
//! - **Error Handling**: Conversion of service errors to OSB error bodies
//! - **Responses**: Response bodies and helpers
//!
//! # Example
//!
//! ```rust,no_run
//! use helm_broker_api::build_api_server;
//! use helm_broker_service::Broker;
//!
//! # async fn example(broker: Broker) -> std::io::Result<()> {
//! let app = build_api_server(broker);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod routes;

// Re-export main types for convenience
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::AppState;
pub use middleware::{MiddlewareConfig, UuidRequestIdGenerator, API_VERSION_HEADER};
pub use responses::{
    ComponentHealth, EmptyResponse, HealthResponse, HealthStatus, OperationResponse,
};
pub use routes::build_router;

use axum::Router;
use helm_broker_service::Broker;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

/// Build a complete API server with the default middleware
pub fn build_api_server(broker: Broker) -> Router {
    build_api_server_with_config(broker, MiddlewareConfig::default())
}

/// Build API server with custom middleware configuration
pub fn build_api_server_with_config(broker: Broker, config: MiddlewareConfig) -> Router {
    let mut router = build_router(AppState::new(broker));

    if config.enable_tracing {
        router = router.layer(middleware::trace_layer());
    }

    if config.enable_request_id {
        router = router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestIdGenerator));
    }

    router
}
