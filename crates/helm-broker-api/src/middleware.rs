//! API middleware
//!
//! Request tracing, request ids and the broker API version check.

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    request_id::{MakeRequestId, RequestId},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
    LatencyUnit,
};
use tracing::Level;
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying the broker API version
pub const API_VERSION_HEADER: &str = "x-broker-api-version";

/// Supported major version of the broker API
pub const SUPPORTED_API_MAJOR: &str = "2";

/// Request ID generator using UUIDs
#[derive(Clone, Default)]
pub struct UuidRequestIdGenerator;

impl MakeRequestId for UuidRequestIdGenerator {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Build trace layer
pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .latency_unit(LatencyUnit::Millis)
                .level(Level::INFO),
        )
}

/// Reject requests without a supported `X-Broker-API-Version` header
pub async fn require_api_version(request: Request, next: Next) -> Response {
    let version = request
        .headers()
        .get(API_VERSION_HEADER)
        .map(|value| value.to_str().unwrap_or_default().trim().to_string());

    match version {
        Some(version) if is_supported(&version) => next.run(request).await,
        Some(version) => ApiError::precondition_failed(format!(
            "Unsupported broker API version {:?}, expected {}.x",
            version, SUPPORTED_API_MAJOR
        ))
        .into_response(),
        None => ApiError::precondition_failed("Missing X-Broker-API-Version header")
            .into_response(),
    }
}

fn is_supported(version: &str) -> bool {
    let mut parts = version.split('.');
    parts.next() == Some(SUPPORTED_API_MAJOR)
        && parts.all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// Middleware configuration
#[derive(Debug, Clone)]
pub struct MiddlewareConfig {
    /// Enable request tracing
    pub enable_tracing: bool,

    /// Attach and propagate `x-request-id`
    pub enable_request_id: bool,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            enable_tracing: true,
            enable_request_id: true,
        }
    }
}

impl MiddlewareConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable/disable tracing
    pub fn with_tracing(mut self, enable: bool) -> Self {
        self.enable_tracing = enable;
        self
    }

    /// Enable/disable request ids
    pub fn with_request_id(mut self, enable: bool) -> Self {
        self.enable_request_id = enable;
        self
    }
}
