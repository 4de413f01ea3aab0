//! API request handlers
//!
//! Every handler serves both the cluster-wide routes and the namespaced
//! ones; the optional `namespace` path segment selects the broker scope.
//! Instances provisioned through one scope are invisible to the others.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use helm_broker_core::{
    AddonId, BindingId, ChartValues, InstanceId, Namespace, OperationId, PlanId,
};
use helm_broker_service::{
    BindRequest, BindResponse, Broker, Catalog, DeprovisionRequest, DeprovisionResponse,
    LastOperationRequest, LastOperationResponse, ProvisionRequest, ProvisionResponse,
    UnbindRequest,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::{
    error::{ApiError, ApiResult},
    responses::{accepted, gone, ok_empty, ComponentHealth, HealthResponse},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub broker: Broker,
}

impl AppState {
    pub fn new(broker: Broker) -> Self {
        Self { broker }
    }
}

// ============================================================================
// Path and query parameters
// ============================================================================

/// Path of the catalog route
#[derive(Debug, Deserialize)]
pub struct BrokerPath {
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Path of the instance routes
#[derive(Debug, Deserialize)]
pub struct InstancePath {
    #[serde(default)]
    pub namespace: Option<String>,
    pub instance_id: String,
}

/// Path of the binding routes
#[derive(Debug, Deserialize)]
pub struct BindingPath {
    #[serde(default)]
    pub namespace: Option<String>,
    pub instance_id: String,
    pub binding_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AsyncQuery {
    #[serde(default)]
    pub accepts_incomplete: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct LastOperationQuery {
    #[serde(default)]
    pub operation: Option<String>,
}

/// Platform context sent with provision and bind requests
#[derive(Debug, Default, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    pub platform: Option<String>,

    /// Namespace the instance is created in
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Body of `PUT service_instances/{instance_id}`
#[derive(Debug, Deserialize)]
pub struct ProvisionBody {
    pub service_id: String,
    pub plan_id: String,

    #[serde(default)]
    pub context: Option<RequestContext>,

    #[serde(default)]
    pub parameters: Option<Value>,
}

/// Body of `PUT service_bindings/{binding_id}`
#[derive(Debug, Default, Deserialize)]
pub struct BindBody {
    #[serde(default)]
    pub service_id: Option<String>,

    #[serde(default)]
    pub plan_id: Option<String>,

    #[serde(default)]
    pub parameters: Option<Value>,
}

fn broker_namespace(namespace: &Option<String>) -> Namespace {
    namespace
        .as_deref()
        .map(Namespace::from)
        .unwrap_or_else(Namespace::cluster_wide)
}

fn instance_id(raw: &str) -> ApiResult<InstanceId> {
    InstanceId::parse(raw).map_err(|e| ApiError::bad_request(e.to_string()))
}

fn parameters(raw: Option<Value>) -> ApiResult<ChartValues> {
    ChartValues::from_value(raw.unwrap_or(Value::Null))
        .map_err(|e| ApiError::bad_request(format!("Invalid parameters: {}", e)))
}

fn require_async(query: &AsyncQuery) -> ApiResult<()> {
    if query.accepts_incomplete {
        Ok(())
    } else {
        Err(ApiError::async_required())
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[instrument(skip(state))]
pub async fn get_catalog(
    State(state): State<AppState>,
    Path(path): Path<BrokerPath>,
) -> ApiResult<Json<Catalog>> {
    let namespace = broker_namespace(&path.namespace);
    let catalog = state.broker.catalog.get_catalog(&namespace).await?;
    debug!(services = catalog.services.len(), "Serving catalog");
    Ok(Json(catalog))
}

// ============================================================================
// Instances
// ============================================================================

#[instrument(skip(state, body))]
pub async fn provision(
    State(state): State<AppState>,
    Path(path): Path<InstancePath>,
    Query(query): Query<AsyncQuery>,
    Json(body): Json<ProvisionBody>,
) -> ApiResult<Response> {
    require_async(&query)?;

    let broker_namespace = broker_namespace(&path.namespace);
    let namespace = body
        .context
        .as_ref()
        .and_then(|ctx| ctx.namespace.clone())
        .map(Namespace::from)
        .unwrap_or_else(|| broker_namespace.clone());

    let request = ProvisionRequest {
        instance_id: instance_id(&path.instance_id)?,
        addon_id: AddonId::from(body.service_id),
        plan_id: PlanId::from(body.plan_id),
        broker_namespace,
        namespace,
        parameters: parameters(body.parameters)?,
    };
    info!(
        addon_id = %request.addon_id,
        plan_id = %request.plan_id,
        namespace = %request.namespace,
        "Provision requested"
    );

    let response = match state.broker.provision.provision(request).await? {
        ProvisionResponse::AlreadyExists => ok_empty().into_response(),
        ProvisionResponse::Accepted { operation_id } => accepted(operation_id).into_response(),
    };
    Ok(response)
}

#[instrument(skip(state))]
pub async fn deprovision(
    State(state): State<AppState>,
    Path(path): Path<InstancePath>,
    Query(query): Query<AsyncQuery>,
) -> ApiResult<Response> {
    require_async(&query)?;

    let request = DeprovisionRequest {
        instance_id: instance_id(&path.instance_id)?,
        namespace: broker_namespace(&path.namespace),
    };

    let response = match state.broker.deprovision.deprovision(request).await? {
        DeprovisionResponse::Gone => gone().into_response(),
        DeprovisionResponse::Accepted { operation_id } => accepted(operation_id).into_response(),
    };
    Ok(response)
}

#[instrument(skip(state))]
pub async fn last_operation(
    State(state): State<AppState>,
    Path(path): Path<InstancePath>,
    Query(query): Query<LastOperationQuery>,
) -> ApiResult<Json<LastOperationResponse>> {
    let request = LastOperationRequest {
        instance_id: instance_id(&path.instance_id)?,
        namespace: broker_namespace(&path.namespace),
        operation_id: query
            .operation
            .filter(|op| !op.trim().is_empty())
            .map(OperationId::from),
    };

    let response = state.broker.last_operation.last_operation(request).await?;
    Ok(Json(response))
}

// ============================================================================
// Bindings
// ============================================================================

#[instrument(skip(state, body))]
pub async fn bind(
    State(state): State<AppState>,
    Path(path): Path<BindingPath>,
    Json(body): Json<BindBody>,
) -> ApiResult<(StatusCode, Json<BindResponse>)> {
    let request = BindRequest {
        instance_id: instance_id(&path.instance_id)?,
        binding_id: BindingId::from(path.binding_id),
        namespace: broker_namespace(&path.namespace),
        parameters: parameters(body.parameters)?,
    };

    let response = state.broker.bind.bind(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[instrument(skip(state))]
pub async fn get_binding(
    State(state): State<AppState>,
    Path(path): Path<BindingPath>,
) -> ApiResult<Json<BindResponse>> {
    let instance_id = instance_id(&path.instance_id)?;
    let namespace = broker_namespace(&path.namespace);
    let response = state
        .broker
        .bind
        .get_binding(&instance_id, &namespace)
        .await?;
    Ok(Json(response))
}

#[instrument(skip(state))]
pub async fn unbind(
    State(state): State<AppState>,
    Path(path): Path<BindingPath>,
) -> ApiResult<Response> {
    let request = UnbindRequest {
        instance_id: instance_id(&path.instance_id)?,
        binding_id: BindingId::from(path.binding_id),
    };

    state.broker.unbind.unbind(request).await?;
    Ok(ok_empty().into_response())
}

// ============================================================================
// Health
// ============================================================================

/// Liveness probe
pub async fn live() -> HealthResponse {
    HealthResponse::healthy().with_version(env!("CARGO_PKG_VERSION"))
}

/// Readiness probe; the broker is ready once its storage answers
pub async fn ready(State(state): State<AppState>) -> HealthResponse {
    let storage = match state
        .broker
        .catalog
        .get_catalog(&Namespace::cluster_wide())
        .await
    {
        Ok(_) => ComponentHealth::healthy(),
        Err(e) => ComponentHealth::unhealthy(format!("Storage error: {}", e)),
    };

    HealthResponse::healthy()
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_check("storage", storage)
        .compute_status()
}
