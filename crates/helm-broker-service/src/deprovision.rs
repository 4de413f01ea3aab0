//! Deprovision service

use async_trait::async_trait;
use helm_broker_core::{Instance, InstanceOperation, OperationId, OperationState, OperationType};
use helm_broker_storage::{
    BindDataRemover, ErrorKind, InstanceGetter, InstanceRemover, OperationInserter,
    OperationUpdater, OptionalExt,
};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::dto::{DeprovisionRequest, DeprovisionResponse};
use crate::error::{ServiceError, ServiceResult};
use crate::id_provider::OperationIdProvider;
use crate::installer::HelmClient;
use crate::instance_state::InstanceStateService;
use crate::operation::{self, DEPROVISION_SUCCEEDED, MAX_CLAIM_ATTEMPTS};
use crate::stores::BrokerStorage;

/// Trait for deprovisioning operations
#[async_trait]
pub trait DeprovisionService: Send + Sync {
    /// Deprovision an instance.
    ///
    /// # Returns
    /// * `DeprovisionResponse::Gone` - The instance does not exist in the request's broker scope
    /// * `DeprovisionResponse::Accepted` - Deletion runs asynchronously
    async fn deprovision(&self, request: DeprovisionRequest) -> ServiceResult<DeprovisionResponse>;
}

/// Default implementation of DeprovisionService
pub struct DefaultDeprovisionService {
    instances: Arc<dyn InstanceGetter>,
    instance_remover: Arc<dyn InstanceRemover>,
    operations: Arc<dyn OperationInserter>,
    updater: Arc<dyn OperationUpdater>,
    bind_data: Arc<dyn BindDataRemover>,
    state: Arc<dyn InstanceStateService>,
    installer: Arc<dyn HelmClient>,
    ids: Arc<dyn OperationIdProvider>,
    tasks: TaskTracker,
}

impl DefaultDeprovisionService {
    /// Create a new deprovision service
    pub fn new(
        storage: &BrokerStorage,
        state: Arc<dyn InstanceStateService>,
        installer: Arc<dyn HelmClient>,
        ids: Arc<dyn OperationIdProvider>,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            instances: storage.instance_getter.clone(),
            instance_remover: storage.instance_remover.clone(),
            operations: storage.operation_inserter.clone(),
            updater: storage.operation_updater.clone(),
            bind_data: storage.bind_data_remover.clone(),
            state,
            installer,
            ids,
            tasks,
        }
    }

    fn spawn_delete(&self, instance: Instance, operation_id: OperationId) {
        let span = info_span!(
            "delete",
            instance_id = %instance.id,
            operation_id = %operation_id
        );
        let job = DeleteJob {
            instance_remover: self.instance_remover.clone(),
            updater: self.updater.clone(),
            bind_data: self.bind_data.clone(),
            installer: self.installer.clone(),
            operation_id,
            instance,
        };
        self.tasks.spawn(job.run().instrument(span));
    }
}

#[async_trait]
impl DeprovisionService for DefaultDeprovisionService {
    #[instrument(skip(self, request), fields(instance_id = %request.instance_id))]
    async fn deprovision(&self, request: DeprovisionRequest) -> ServiceResult<DeprovisionResponse> {
        let iid = &request.instance_id;

        for attempt in 1..=MAX_CLAIM_ATTEMPTS {
            // provisioning claims its operation before it stores the instance,
            // so the history is read first
            let running = self.state.operation_in_progress(iid).await?;
            let instance = self.instances.get(iid).await.optional()?;

            if let Some(other) = instance.as_ref().filter(|i| !i.is_served_by(&request.namespace)) {
                debug!(broker_namespace = %other.broker_namespace, "Instance belongs to another broker");
                return Ok(DeprovisionResponse::Gone);
            }

            if let Some(running) = running {
                return match running.operation_type {
                    OperationType::Remove => {
                        debug!(operation_id = %running.operation_id, "Deprovisioning already in progress");
                        Ok(DeprovisionResponse::Accepted {
                            operation_id: running.operation_id,
                        })
                    }
                    OperationType::Create => Err(ServiceError::OperationInProgress(format!(
                        "instance {} is being provisioned",
                        iid
                    ))),
                };
            }

            let Some(instance) = instance else {
                debug!("Instance does not exist");
                return Ok(DeprovisionResponse::Gone);
            };

            let operation_id = self.ids.next_id();
            let claim =
                InstanceOperation::start(iid.clone(), operation_id.clone(), OperationType::Remove);
            match self.operations.insert(claim).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::Conflict => {
                    debug!(attempt, "Another operation claimed the instance, re-reading state");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            // a concurrent request may have removed the instance between the
            // lookup and the claim
            let prior = self.state.snapshot_before(iid, &operation_id).await?;
            if prior.deprovisioned {
                operation::complete(
                    self.updater.as_ref(),
                    iid,
                    &operation_id,
                    OperationState::Succeeded,
                    DEPROVISION_SUCCEEDED.to_string(),
                )
                .await;
                return Ok(DeprovisionResponse::Gone);
            }

            self.spawn_delete(instance, operation_id.clone());
            info!(operation_id = %operation_id, "Deprovisioning accepted");
            return Ok(DeprovisionResponse::Accepted { operation_id });
        }

        Err(ServiceError::OperationInProgress(format!(
            "instance {} is busy",
            iid
        )))
    }
}

/// Background deletion of one instance
struct DeleteJob {
    instance_remover: Arc<dyn InstanceRemover>,
    updater: Arc<dyn OperationUpdater>,
    bind_data: Arc<dyn BindDataRemover>,
    installer: Arc<dyn HelmClient>,
    operation_id: OperationId,
    instance: Instance,
}

impl DeleteJob {
    async fn run(self) {
        let (state, description) = match self.delete().await {
            Ok(()) => (OperationState::Succeeded, DEPROVISION_SUCCEEDED.to_string()),
            Err(cause) => (OperationState::Failed, operation::deprovision_failed(cause)),
        };

        operation::complete(
            self.updater.as_ref(),
            &self.instance.id,
            &self.operation_id,
            state,
            description,
        )
        .await;
    }

    async fn delete(&self) -> Result<(), String> {
        self.installer
            .delete(&self.instance.release_name)
            .await
            .map_err(|e| e.to_string())?;
        info!(release = %self.instance.release_name, "Release deleted");

        match self.bind_data.remove(&self.instance.id).await {
            Ok(()) => debug!("Removed bind data"),
            Err(err) if err.is_not_found() => {}
            Err(err) => warn!(error = %err, "Could not remove bind data"),
        }

        match self.instance_remover.remove(&self.instance.id).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(format!("removing instance: {}", err)),
        }
    }
}
