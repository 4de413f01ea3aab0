//! Instance state derived from the operation history
//!
//! The broker never stores an instance "status" field. Whether an instance
//! is provisioned, deprovisioned or busy is computed from its operations,
//! oldest first: a succeeded create marks it provisioned, a later succeeded
//! remove marks it deprovisioned again.

use async_trait::async_trait;
use helm_broker_core::{InstanceId, InstanceOperation, OperationId, OperationState, OperationType};
use helm_broker_storage::{OperationCollectionGetter, OptionalExt};
use std::sync::Arc;

use crate::error::ServiceResult;

/// Lifecycle state of one instance at a point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceState {
    pub provisioned: bool,
    pub deprovisioned: bool,
    pub in_progress: Option<InstanceOperation>,
}

impl InstanceState {
    /// Fold an operation history, oldest first
    pub fn from_history(history: &[InstanceOperation]) -> Self {
        let mut state = InstanceState::default();
        for op in history {
            match (op.operation_type, op.state) {
                (OperationType::Create, OperationState::Succeeded) => {
                    state.provisioned = true;
                    state.deprovisioned = false;
                }
                (OperationType::Remove, OperationState::Succeeded) => {
                    state.provisioned = false;
                    state.deprovisioned = true;
                }
                (_, OperationState::InProgress) => state.in_progress = Some(op.clone()),
                _ => {}
            }
        }
        state
    }

    fn in_progress_of(&self, kind: OperationType) -> Option<OperationId> {
        self.in_progress
            .as_ref()
            .filter(|op| op.operation_type == kind)
            .map(|op| op.operation_id.clone())
    }

    /// Id of the running create operation, if any
    pub fn provisioning_in_progress(&self) -> Option<OperationId> {
        self.in_progress_of(OperationType::Create)
    }

    /// Id of the running remove operation, if any
    pub fn deprovisioning_in_progress(&self) -> Option<OperationId> {
        self.in_progress_of(OperationType::Remove)
    }
}

/// Trait for instance state queries
#[async_trait]
pub trait InstanceStateService: Send + Sync {
    /// Full state in a single history read
    async fn snapshot(&self, instance_id: &InstanceId) -> ServiceResult<InstanceState>;

    /// State as it was right before `operation_id` was inserted
    async fn snapshot_before(
        &self,
        instance_id: &InstanceId,
        operation_id: &OperationId,
    ) -> ServiceResult<InstanceState>;

    async fn is_provisioned(&self, instance_id: &InstanceId) -> ServiceResult<bool> {
        Ok(self.snapshot(instance_id).await?.provisioned)
    }

    async fn is_provisioning_in_progress(
        &self,
        instance_id: &InstanceId,
    ) -> ServiceResult<Option<OperationId>> {
        Ok(self.snapshot(instance_id).await?.provisioning_in_progress())
    }

    async fn is_deprovisioned(&self, instance_id: &InstanceId) -> ServiceResult<bool> {
        Ok(self.snapshot(instance_id).await?.deprovisioned)
    }

    async fn is_deprovisioning_in_progress(
        &self,
        instance_id: &InstanceId,
    ) -> ServiceResult<Option<OperationId>> {
        Ok(self.snapshot(instance_id).await?.deprovisioning_in_progress())
    }

    /// Whichever operation is currently running
    async fn operation_in_progress(
        &self,
        instance_id: &InstanceId,
    ) -> ServiceResult<Option<InstanceOperation>> {
        Ok(self.snapshot(instance_id).await?.in_progress)
    }
}

/// Default implementation of InstanceStateService
pub struct DefaultInstanceStateService {
    operations: Arc<dyn OperationCollectionGetter>,
}

impl DefaultInstanceStateService {
    pub fn new(operations: Arc<dyn OperationCollectionGetter>) -> Self {
        Self { operations }
    }

    async fn history(&self, instance_id: &InstanceId) -> ServiceResult<Vec<InstanceOperation>> {
        // an instance without history is neither provisioned nor busy
        Ok(self
            .operations
            .get_all(instance_id)
            .await
            .optional()?
            .unwrap_or_default())
    }
}

#[async_trait]
impl InstanceStateService for DefaultInstanceStateService {
    async fn snapshot(&self, instance_id: &InstanceId) -> ServiceResult<InstanceState> {
        Ok(InstanceState::from_history(&self.history(instance_id).await?))
    }

    async fn snapshot_before(
        &self,
        instance_id: &InstanceId,
        operation_id: &OperationId,
    ) -> ServiceResult<InstanceState> {
        let prior: Vec<_> = self
            .history(instance_id)
            .await?
            .into_iter()
            .take_while(|op| &op.operation_id != operation_id)
            .collect();
        Ok(InstanceState::from_history(&prior))
    }
}
