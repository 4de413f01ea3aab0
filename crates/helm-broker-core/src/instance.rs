//! Provisioned instances and their lifecycle operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::chart::ChartValues;
use crate::types::{AddonId, InstanceId, Namespace, OperationId, PlanId, ReleaseName};

/// Credentials delivered to the platform on bind
pub type Credentials = BTreeMap<String, String>;

/// Digest of the provisioning request used to detect conflicting retries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamsHash(String);

impl ParamsHash {
    /// Hash the addon, plan and parameters of a provisioning request.
    ///
    /// Object keys are serialized in sorted order, so two requests hash
    /// equally iff they carry the same addon, plan and parameters.
    pub fn compute(addon_id: &AddonId, plan_id: &PlanId, parameters: &ChartValues) -> Self {
        let canonical = serde_json::json!({
            "service_id": addon_id,
            "plan_id": plan_id,
            "parameters": parameters,
        });
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Borrow the hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParamsHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One provisioned addon plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub service_id: AddonId,
    pub plan_id: PlanId,
    /// Namespace the release is installed into
    pub namespace: Namespace,
    /// Namespace scope the addon was resolved in
    pub broker_namespace: Namespace,
    pub release_name: ReleaseName,
    pub params_hash: ParamsHash,
    /// Raw provisioning parameters as sent by the platform
    pub parameters: ChartValues,
    /// Plan values overlaid with the provisioning parameters
    pub values: ChartValues,
    pub created_at: DateTime<Utc>,
}

impl Instance {
    /// Whether a request for `service_id`/`plan_id` with `params_hash` matches this instance
    pub fn matches(&self, service_id: &AddonId, plan_id: &PlanId, params_hash: &ParamsHash) -> bool {
        &self.service_id == service_id && &self.plan_id == plan_id && &self.params_hash == params_hash
    }

    /// Whether the instance was provisioned through the broker scope `namespace`
    pub fn is_served_by(&self, namespace: &Namespace) -> bool {
        &self.broker_namespace == namespace
    }
}

/// Kind of lifecycle action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Create,
    Remove,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// State of an operation, using the OSB last-operation vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationState {
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

impl OperationState {
    /// Whether the state can no longer change
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in progress"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for OperationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in progress" => Ok(Self::InProgress),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid operation state: {}", s)),
        }
    }
}

/// An asynchronous lifecycle action on an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceOperation {
    pub instance_id: InstanceId,
    pub operation_id: OperationId,
    pub operation_type: OperationType,
    pub state: OperationState,
    #[serde(default)]
    pub state_description: Option<String>,
    #[serde(default)]
    pub params_hash: Option<ParamsHash>,
    pub created_at: DateTime<Utc>,
}

impl InstanceOperation {
    /// Start a new operation in the `in progress` state
    pub fn start(
        instance_id: InstanceId,
        operation_id: OperationId,
        operation_type: OperationType,
    ) -> Self {
        Self {
            instance_id,
            operation_id,
            operation_type,
            state: OperationState::InProgress,
            state_description: None,
            params_hash: None,
            created_at: Utc::now(),
        }
    }

    /// Attach the hash of the request that started the operation
    pub fn with_params_hash(mut self, hash: ParamsHash) -> Self {
        self.params_hash = Some(hash);
        self
    }

    pub fn is_in_progress(&self) -> bool {
        self.state == OperationState::InProgress
    }
}

/// Credentials produced by a successful bind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceBindData {
    pub instance_id: InstanceId,
    pub credentials: Credentials,
}
