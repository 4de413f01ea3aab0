//! Core domain models for the Helm Broker
//!
//! This crate contains the data structures shared by every layer of the
//! broker: identifiers, addons and their plans, charts, provisioned
//! instances, their lifecycle operations and the credentials produced by
//! binding.

pub mod addon;
pub mod chart;
pub mod error;
pub mod instance;
pub mod types;

// Re-exports for convenience
pub use addon::{Addon, AddonMetadata, BindTemplate, ChartRef, Plan};
pub use chart::{Chart, ChartValues};
pub use error::{BrokerError, Result};
pub use instance::{
    Credentials, Instance, InstanceBindData, InstanceOperation, OperationState, OperationType,
    ParamsHash,
};
pub use types::{
    AddonId, AddonName, BindingId, ChartName, InstanceId, Namespace, OperationId, PlanId,
    PlanName, ReleaseName,
};
