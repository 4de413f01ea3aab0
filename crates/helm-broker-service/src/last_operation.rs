//! Last operation service
//!
//! Reports the state of an asynchronous operation to the polling platform.

use async_trait::async_trait;
use helm_broker_storage::{InstanceGetter, OperationCollectionGetter, OperationGetter, OptionalExt};
use std::sync::Arc;
use tracing::instrument;

use crate::dto::{LastOperationRequest, LastOperationResponse};
use crate::error::{ServiceError, ServiceResult};
use crate::stores::BrokerStorage;

/// Trait for last operation queries
#[async_trait]
pub trait LastOperationService: Send + Sync {
    /// State of the requested operation, or of the latest one when no id is given
    async fn last_operation(
        &self,
        request: LastOperationRequest,
    ) -> ServiceResult<LastOperationResponse>;
}

/// Default implementation of LastOperationService
pub struct DefaultLastOperationService {
    instances: Arc<dyn InstanceGetter>,
    operations: Arc<dyn OperationGetter>,
    history: Arc<dyn OperationCollectionGetter>,
}

impl DefaultLastOperationService {
    pub fn new(storage: &BrokerStorage) -> Self {
        Self {
            instances: storage.instance_getter.clone(),
            operations: storage.operation_getter.clone(),
            history: storage.operation_collection.clone(),
        }
    }
}

#[async_trait]
impl LastOperationService for DefaultLastOperationService {
    #[instrument(skip(self, request), fields(instance_id = %request.instance_id))]
    async fn last_operation(
        &self,
        request: LastOperationRequest,
    ) -> ServiceResult<LastOperationResponse> {
        // a removed instance keeps its history, so only a stored instance of
        // another broker hides it
        if let Some(instance) = self.instances.get(&request.instance_id).await.optional()? {
            if !instance.is_served_by(&request.namespace) {
                return Err(ServiceError::NotFound(format!(
                    "instance {} in {}",
                    request.instance_id, request.namespace
                )));
            }
        }

        let operation = match &request.operation_id {
            Some(operation_id) => {
                self.operations
                    .get(&request.instance_id, operation_id)
                    .await?
            }
            None => self
                .history
                .get_all(&request.instance_id)
                .await?
                .pop()
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "operations of instance {}",
                        request.instance_id
                    ))
                })?,
        };

        Ok(LastOperationResponse {
            state: operation.state,
            description: operation.state_description,
        })
    }
}
