//! API response types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use helm_broker_core::OperationId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body of an accepted asynchronous operation
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResponse {
    pub operation: OperationId,
}

/// Empty JSON object, `{}`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EmptyResponse {}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: HealthStatus,

    /// Service version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Component health checks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<HashMap<String, ComponentHealth>>,
}

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Component health status
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthResponse {
    /// Create a healthy response
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            version: None,
            checks: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Add a component health check
    pub fn with_check(mut self, name: impl Into<String>, health: ComponentHealth) -> Self {
        self.checks
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), health);
        self
    }

    /// Unhealthy when any component is
    pub fn compute_status(mut self) -> Self {
        let unhealthy = self
            .checks
            .as_ref()
            .map(|checks| checks.values().any(|c| c.status == HealthStatus::Unhealthy))
            .unwrap_or(false);
        self.status = if unhealthy {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        };
        self
    }
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        let status_code = match self.status {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status_code, Json(self)).into_response()
    }
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
        }
    }
}

/// 202 with the id of the started operation
pub fn accepted(operation: OperationId) -> (StatusCode, Json<OperationResponse>) {
    (StatusCode::ACCEPTED, Json(OperationResponse { operation }))
}

/// 200 with an empty body
pub fn ok_empty() -> (StatusCode, Json<EmptyResponse>) {
    (StatusCode::OK, Json(EmptyResponse::default()))
}

/// 410 with an empty body
pub fn gone() -> (StatusCode, Json<EmptyResponse>) {
    (StatusCode::GONE, Json(EmptyResponse::default()))
}
