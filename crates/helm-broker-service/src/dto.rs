//! Data Transfer Objects (DTOs) for service layer
//!
//! Request and response types used at the service boundary. Catalog types
//! serialize to the Open Service Broker v2 wire format.

use helm_broker_core::{
    AddonId, BindingId, ChartValues, Credentials, InstanceId, Namespace, OperationId,
    OperationState, PlanId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// Catalog DTOs
// ============================================================================

/// Catalog of service offerings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub services: Vec<ServiceOffering>,
}

/// One addon as advertised to the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceOffering {
    pub id: AddonId,
    pub name: String,
    pub description: String,
    pub bindable: bool,
    pub plan_updateable: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,

    pub metadata: ServiceMetadata,
    pub plans: Vec<ServicePlan>,
}

/// Presentation metadata of a service offering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_display_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// One plan of a service offering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePlan {
    pub id: PlanId,
    pub name: String,
    pub description: String,
    pub bindable: bool,
    pub free: bool,

    #[serde(default)]
    pub metadata: PlanMetadata,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schemas: Option<PlanSchemas>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Parameter schemas of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSchemas {
    pub service_instance: ServiceInstanceSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstanceSchema {
    pub create: InputParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputParameters {
    pub parameters: Value,
}

// ============================================================================
// Provisioning DTOs
// ============================================================================

/// Request to provision an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Platform-supplied instance id
    pub instance_id: InstanceId,

    /// Requested addon (OSB service id)
    pub addon_id: AddonId,

    /// Requested plan
    pub plan_id: PlanId,

    /// Scope the addon and its chart are resolved in
    #[serde(default)]
    pub broker_namespace: Namespace,

    /// Namespace the release is installed into
    pub namespace: Namespace,

    /// Provisioning parameters
    #[serde(default)]
    pub parameters: ChartValues,
}

/// Outcome of a provisioning request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionResponse {
    /// An identical instance is already provisioned
    AlreadyExists,
    /// Provisioning runs asynchronously under `operation_id`
    Accepted { operation_id: OperationId },
}

/// Request to deprovision an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeprovisionRequest {
    pub instance_id: InstanceId,

    /// Scope the request arrived in
    #[serde(default)]
    pub namespace: Namespace,
}

/// Outcome of a deprovisioning request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeprovisionResponse {
    /// The instance does not exist
    Gone,
    /// Deprovisioning runs asynchronously under `operation_id`
    Accepted { operation_id: OperationId },
}

// ============================================================================
// Binding DTOs
// ============================================================================

/// Request to bind to an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindRequest {
    pub instance_id: InstanceId,
    pub binding_id: BindingId,

    /// Scope the request arrived in
    #[serde(default)]
    pub namespace: Namespace,

    /// Binding parameters; must be empty
    #[serde(default)]
    pub parameters: ChartValues,
}

/// Credentials of a binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindResponse {
    pub credentials: Credentials,
}

/// Request to unbind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnbindRequest {
    pub instance_id: InstanceId,
    pub binding_id: BindingId,
}

// ============================================================================
// Last operation DTOs
// ============================================================================

/// Request for the status of an operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastOperationRequest {
    pub instance_id: InstanceId,

    /// Scope the request arrived in
    #[serde(default)]
    pub namespace: Namespace,

    /// Operation to report; the latest one when omitted
    #[serde(default)]
    pub operation_id: Option<OperationId>,
}

/// Status of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastOperationResponse {
    pub state: OperationState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
