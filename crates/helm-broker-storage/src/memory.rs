//! In-memory storage driver
//!
//! Records live in `tokio::sync::RwLock` protected maps. Every mutation
//! takes the write lock for the whole check-and-write, which gives the
//! per-key atomicity the services depend on.

use async_trait::async_trait;
use helm_broker_core::{
    Addon, AddonId, Chart, ChartName, Instance, InstanceBindData, InstanceId, InstanceOperation,
    Namespace, OperationId, OperationState,
};
use semver::Version;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::repository::{
    AddonFinder, AddonIdGetter, AddonWriter, BindDataGetter, BindDataInserter, BindDataRemover,
    ChartGetter, ChartWriter, InstanceGetter, InstanceInserter, InstanceRemover,
    OperationCollectionGetter, OperationGetter, OperationInserter, OperationRemover,
    OperationUpdater,
};

/// Factory holding one store per record type
#[derive(Clone, Default)]
pub struct MemoryStorage {
    addons: Arc<MemoryAddonStore>,
    charts: Arc<MemoryChartStore>,
    instances: Arc<MemoryInstanceStore>,
    operations: Arc<MemoryOperationStore>,
    bind_data: Arc<MemoryBindDataStore>,
}

impl MemoryStorage {
    /// Create empty stores
    pub fn new() -> Self {
        Self::default()
    }

    pub fn addons(&self) -> Arc<MemoryAddonStore> {
        self.addons.clone()
    }

    pub fn charts(&self) -> Arc<MemoryChartStore> {
        self.charts.clone()
    }

    pub fn instances(&self) -> Arc<MemoryInstanceStore> {
        self.instances.clone()
    }

    pub fn operations(&self) -> Arc<MemoryOperationStore> {
        self.operations.clone()
    }

    pub fn bind_data(&self) -> Arc<MemoryBindDataStore> {
        self.bind_data.clone()
    }
}

// ============================================================================
// Addons
// ============================================================================

#[derive(Default)]
pub struct MemoryAddonStore {
    addons: RwLock<HashMap<(Namespace, AddonId), Addon>>,
}

#[async_trait]
impl AddonIdGetter for MemoryAddonStore {
    async fn get_by_id(&self, namespace: &Namespace, id: &AddonId) -> StorageResult<Addon> {
        self.addons
            .read()
            .await
            .get(&(namespace.clone(), id.clone()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("addon {} in {}", id, namespace)))
    }
}

#[async_trait]
impl AddonFinder for MemoryAddonStore {
    async fn find_all(&self, namespace: &Namespace) -> StorageResult<Vec<Addon>> {
        Ok(self
            .addons
            .read()
            .await
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, addon)| addon.clone())
            .collect())
    }
}

#[async_trait]
impl AddonWriter for MemoryAddonStore {
    async fn upsert(&self, namespace: &Namespace, addon: Addon) -> StorageResult<bool> {
        addon.validate()?;
        let key = (namespace.clone(), addon.id.clone());
        let replaced = self.addons.write().await.insert(key, addon).is_some();
        Ok(replaced)
    }

    async fn remove(&self, namespace: &Namespace, id: &AddonId) -> StorageResult<()> {
        if self
            .addons
            .write()
            .await
            .remove(&(namespace.clone(), id.clone()))
            .is_none()
        {
            debug!(addon_id = %id, "Addon already removed");
        }
        Ok(())
    }
}

// ============================================================================
// Charts
// ============================================================================

type ChartKey = (Namespace, ChartName, Version);

#[derive(Default)]
pub struct MemoryChartStore {
    charts: RwLock<HashMap<ChartKey, Chart>>,
}

#[async_trait]
impl ChartGetter for MemoryChartStore {
    async fn get(
        &self,
        namespace: &Namespace,
        name: &ChartName,
        version: &Version,
    ) -> StorageResult<Chart> {
        self.charts
            .read()
            .await
            .get(&(namespace.clone(), name.clone(), version.clone()))
            .cloned()
            .ok_or_else(|| {
                StorageError::NotFound(format!("chart {}:{} in {}", name, version, namespace))
            })
    }
}

#[async_trait]
impl ChartWriter for MemoryChartStore {
    async fn upsert(&self, namespace: &Namespace, chart: Chart) -> StorageResult<bool> {
        let key = (namespace.clone(), chart.name.clone(), chart.version.clone());
        Ok(self.charts.write().await.insert(key, chart).is_some())
    }

    async fn remove(
        &self,
        namespace: &Namespace,
        name: &ChartName,
        version: &Version,
    ) -> StorageResult<()> {
        if self
            .charts
            .write()
            .await
            .remove(&(namespace.clone(), name.clone(), version.clone()))
            .is_none()
        {
            debug!(chart = %name, version = %version, "Chart already removed");
        }
        Ok(())
    }
}

// ============================================================================
// Instances
// ============================================================================

#[derive(Default)]
pub struct MemoryInstanceStore {
    instances: RwLock<HashMap<InstanceId, Instance>>,
}

#[async_trait]
impl InstanceInserter for MemoryInstanceStore {
    async fn insert(&self, instance: Instance) -> StorageResult<()> {
        let mut instances = self.instances.write().await;
        if instances.contains_key(&instance.id) {
            return Err(StorageError::AlreadyExists(format!("instance {}", instance.id)));
        }
        instances.insert(instance.id.clone(), instance);
        Ok(())
    }

    async fn upsert(&self, instance: Instance) -> StorageResult<bool> {
        let mut instances = self.instances.write().await;
        Ok(instances.insert(instance.id.clone(), instance).is_some())
    }
}

#[async_trait]
impl InstanceGetter for MemoryInstanceStore {
    async fn get(&self, id: &InstanceId) -> StorageResult<Instance> {
        self.instances
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("instance {}", id)))
    }

    async fn get_all(&self) -> StorageResult<Vec<Instance>> {
        Ok(self.instances.read().await.values().cloned().collect())
    }
}

#[async_trait]
impl InstanceRemover for MemoryInstanceStore {
    async fn remove(&self, id: &InstanceId) -> StorageResult<()> {
        self.instances
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("instance {}", id)))
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Operation history per instance, oldest first
#[derive(Default)]
pub struct MemoryOperationStore {
    operations: RwLock<HashMap<InstanceId, Vec<InstanceOperation>>>,
}

impl MemoryOperationStore {
    fn not_found(instance_id: &InstanceId, operation_id: &OperationId) -> StorageError {
        StorageError::NotFound(format!(
            "operation {} of instance {}",
            operation_id, instance_id
        ))
    }
}

#[async_trait]
impl OperationInserter for MemoryOperationStore {
    async fn insert(&self, operation: InstanceOperation) -> StorageResult<()> {
        let mut operations = self.operations.write().await;
        let history = operations.entry(operation.instance_id.clone()).or_default();

        if history
            .iter()
            .any(|op| op.operation_id == operation.operation_id)
        {
            return Err(StorageError::AlreadyExists(format!(
                "operation {} of instance {}",
                operation.operation_id, operation.instance_id
            )));
        }

        if operation.is_in_progress() {
            if let Some(running) = history.iter().find(|op| op.is_in_progress()) {
                return Err(StorageError::Conflict(format!(
                    "operation {} of instance {} is in progress",
                    running.operation_id, operation.instance_id
                )));
            }
        }

        history.push(operation);
        Ok(())
    }
}

#[async_trait]
impl OperationGetter for MemoryOperationStore {
    async fn get(
        &self,
        instance_id: &InstanceId,
        operation_id: &OperationId,
    ) -> StorageResult<InstanceOperation> {
        self.operations
            .read()
            .await
            .get(instance_id)
            .and_then(|history| history.iter().find(|op| &op.operation_id == operation_id))
            .cloned()
            .ok_or_else(|| Self::not_found(instance_id, operation_id))
    }
}

#[async_trait]
impl OperationCollectionGetter for MemoryOperationStore {
    async fn get_all(&self, instance_id: &InstanceId) -> StorageResult<Vec<InstanceOperation>> {
        match self.operations.read().await.get(instance_id) {
            Some(history) if !history.is_empty() => Ok(history.clone()),
            _ => Err(StorageError::NotFound(format!(
                "operations of instance {}",
                instance_id
            ))),
        }
    }
}

#[async_trait]
impl OperationUpdater for MemoryOperationStore {
    async fn update_state(
        &self,
        instance_id: &InstanceId,
        operation_id: &OperationId,
        state: OperationState,
    ) -> StorageResult<()> {
        let mut operations = self.operations.write().await;
        let operation = operations
            .get_mut(instance_id)
            .and_then(|history| {
                history
                    .iter_mut()
                    .find(|op| &op.operation_id == operation_id)
            })
            .ok_or_else(|| Self::not_found(instance_id, operation_id))?;

        if operation.state.is_terminal() {
            return Err(StorageError::Conflict(format!(
                "operation {} already {}",
                operation_id, operation.state
            )));
        }
        operation.state = state;
        Ok(())
    }

    async fn update_state_desc(
        &self,
        instance_id: &InstanceId,
        operation_id: &OperationId,
        state: OperationState,
        description: Option<String>,
    ) -> StorageResult<()> {
        let mut operations = self.operations.write().await;
        let operation = operations
            .get_mut(instance_id)
            .and_then(|history| {
                history
                    .iter_mut()
                    .find(|op| &op.operation_id == operation_id)
            })
            .ok_or_else(|| Self::not_found(instance_id, operation_id))?;

        if operation.state.is_terminal() {
            return Err(StorageError::Conflict(format!(
                "operation {} already {}",
                operation_id, operation.state
            )));
        }
        operation.state = state;
        operation.state_description = description;
        Ok(())
    }
}

#[async_trait]
impl OperationRemover for MemoryOperationStore {
    async fn remove(
        &self,
        instance_id: &InstanceId,
        operation_id: &OperationId,
    ) -> StorageResult<()> {
        let mut operations = self.operations.write().await;
        let history = operations
            .get_mut(instance_id)
            .ok_or_else(|| Self::not_found(instance_id, operation_id))?;
        let before = history.len();
        history.retain(|op| &op.operation_id != operation_id);
        if history.len() == before {
            return Err(Self::not_found(instance_id, operation_id));
        }
        if history.is_empty() {
            operations.remove(instance_id);
        }
        Ok(())
    }
}

// ============================================================================
// Bind data
// ============================================================================

#[derive(Default)]
pub struct MemoryBindDataStore {
    bind_data: RwLock<HashMap<InstanceId, InstanceBindData>>,
}

#[async_trait]
impl BindDataGetter for MemoryBindDataStore {
    async fn get(&self, instance_id: &InstanceId) -> StorageResult<InstanceBindData> {
        self.bind_data
            .read()
            .await
            .get(instance_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("bind data of instance {}", instance_id)))
    }
}

#[async_trait]
impl BindDataInserter for MemoryBindDataStore {
    async fn insert(&self, data: InstanceBindData) -> StorageResult<()> {
        let mut bind_data = self.bind_data.write().await;
        if bind_data.contains_key(&data.instance_id) {
            return Err(StorageError::AlreadyExists(format!(
                "bind data of instance {}",
                data.instance_id
            )));
        }
        bind_data.insert(data.instance_id.clone(), data);
        Ok(())
    }
}

#[async_trait]
impl BindDataRemover for MemoryBindDataStore {
    async fn remove(&self, instance_id: &InstanceId) -> StorageResult<()> {
        self.bind_data
            .write()
            .await
            .remove(instance_id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("bind data of instance {}", instance_id)))
    }
}
