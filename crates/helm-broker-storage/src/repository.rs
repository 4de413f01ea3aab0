//! Capability traits for broker storage
//!
//! Each trait covers one narrow capability so that a service can declare
//! exactly what it needs (an addon lookup, an operation insert, ...). A
//! storage driver implements all of them for its record type.
//!
//! Implementations must be thread-safe (Send + Sync) and every write must be
//! atomic per record key; the broker relies on that for its duplicate
//! request guarantees.

use async_trait::async_trait;
use helm_broker_core::{
    Addon, AddonId, Chart, ChartName, Instance, InstanceBindData, InstanceId, InstanceOperation,
    Namespace, OperationId, OperationState,
};
use semver::Version;

use crate::error::StorageResult;

// ============================================================================
// Addons
// ============================================================================

/// Lookup of a single addon
#[async_trait]
pub trait AddonIdGetter: Send + Sync {
    /// Get the addon `id` visible in `namespace`
    ///
    /// # Returns
    /// * `Err(StorageError::NotFound)` - If no such addon exists
    async fn get_by_id(&self, namespace: &Namespace, id: &AddonId) -> StorageResult<Addon>;
}

/// Listing of addons
#[async_trait]
pub trait AddonFinder: Send + Sync {
    /// All addons visible in `namespace`
    async fn find_all(&self, namespace: &Namespace) -> StorageResult<Vec<Addon>>;
}

/// Addon writes, used by whoever populates the catalog
#[async_trait]
pub trait AddonWriter: Send + Sync {
    /// Insert or replace an addon in `namespace`
    async fn upsert(&self, namespace: &Namespace, addon: Addon) -> StorageResult<bool>;

    /// Remove an addon; removing a missing addon is not an error
    async fn remove(&self, namespace: &Namespace, id: &AddonId) -> StorageResult<()>;
}

// ============================================================================
// Charts
// ============================================================================

/// Lookup of a chart version
#[async_trait]
pub trait ChartGetter: Send + Sync {
    /// # Returns
    /// * `Err(StorageError::NotFound)` - If the chart version does not exist
    async fn get(
        &self,
        namespace: &Namespace,
        name: &ChartName,
        version: &Version,
    ) -> StorageResult<Chart>;
}

/// Chart writes
#[async_trait]
pub trait ChartWriter: Send + Sync {
    /// Insert or replace a chart version in `namespace`
    async fn upsert(&self, namespace: &Namespace, chart: Chart) -> StorageResult<bool>;

    /// Remove a chart version; removing a missing chart is not an error
    async fn remove(
        &self,
        namespace: &Namespace,
        name: &ChartName,
        version: &Version,
    ) -> StorageResult<()>;
}

// ============================================================================
// Instances
// ============================================================================

/// Instance writes
#[async_trait]
pub trait InstanceInserter: Send + Sync {
    /// Insert a new instance
    ///
    /// # Returns
    /// * `Err(StorageError::AlreadyExists)` - If an instance with that id exists
    async fn insert(&self, instance: Instance) -> StorageResult<()>;

    /// Insert or replace an instance
    ///
    /// # Returns
    /// * `Ok(true)` - If an existing instance was replaced
    async fn upsert(&self, instance: Instance) -> StorageResult<bool>;
}

/// Instance reads
#[async_trait]
pub trait InstanceGetter: Send + Sync {
    /// # Returns
    /// * `Err(StorageError::NotFound)` - If the instance does not exist
    async fn get(&self, id: &InstanceId) -> StorageResult<Instance>;

    async fn get_all(&self) -> StorageResult<Vec<Instance>>;
}

/// Instance removal
#[async_trait]
pub trait InstanceRemover: Send + Sync {
    /// # Returns
    /// * `Err(StorageError::NotFound)` - If the instance does not exist
    async fn remove(&self, id: &InstanceId) -> StorageResult<()>;
}

// ============================================================================
// Operations
// ============================================================================

/// Operation insertion
#[async_trait]
pub trait OperationInserter: Send + Sync {
    /// Insert a new operation.
    ///
    /// This is a test-and-set on the instance: inserting an `in progress`
    /// operation while another operation of the same instance is still in
    /// progress fails.
    ///
    /// # Returns
    /// * `Err(StorageError::AlreadyExists)` - If the operation id is taken
    /// * `Err(StorageError::Conflict)` - If another operation is in progress
    async fn insert(&self, operation: InstanceOperation) -> StorageResult<()>;
}

/// Single operation lookup
#[async_trait]
pub trait OperationGetter: Send + Sync {
    async fn get(
        &self,
        instance_id: &InstanceId,
        operation_id: &OperationId,
    ) -> StorageResult<InstanceOperation>;
}

/// Operation history of an instance
#[async_trait]
pub trait OperationCollectionGetter: Send + Sync {
    /// All operations of an instance, oldest first
    ///
    /// # Returns
    /// * `Err(StorageError::NotFound)` - If the instance has no operations
    async fn get_all(&self, instance_id: &InstanceId) -> StorageResult<Vec<InstanceOperation>>;
}

/// Operation state transitions
#[async_trait]
pub trait OperationUpdater: Send + Sync {
    /// Move an in-progress operation to `state`.
    ///
    /// # Returns
    /// * `Err(StorageError::Conflict)` - If the operation already finished
    async fn update_state(
        &self,
        instance_id: &InstanceId,
        operation_id: &OperationId,
        state: OperationState,
    ) -> StorageResult<()>;

    /// Like [`OperationUpdater::update_state`] and also set the description
    async fn update_state_desc(
        &self,
        instance_id: &InstanceId,
        operation_id: &OperationId,
        state: OperationState,
        description: Option<String>,
    ) -> StorageResult<()>;
}

/// Operation removal
#[async_trait]
pub trait OperationRemover: Send + Sync {
    async fn remove(&self, instance_id: &InstanceId, operation_id: &OperationId)
        -> StorageResult<()>;
}

// ============================================================================
// Bind data
// ============================================================================

#[async_trait]
pub trait BindDataGetter: Send + Sync {
    async fn get(&self, instance_id: &InstanceId) -> StorageResult<InstanceBindData>;
}

#[async_trait]
pub trait BindDataInserter: Send + Sync {
    /// # Returns
    /// * `Err(StorageError::AlreadyExists)` - If bind data exists for the instance
    async fn insert(&self, data: InstanceBindData) -> StorageResult<()>;
}

#[async_trait]
pub trait BindDataRemover: Send + Sync {
    async fn remove(&self, instance_id: &InstanceId) -> StorageResult<()>;
}
