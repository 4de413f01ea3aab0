//! Provision service
//!
//! Provisioning claims the instance by inserting a `create` operation, stores
//! the instance and installs the plan's chart in the background. The platform
//! polls the operation through the last-operation service.

use async_trait::async_trait;
use chrono::Utc;
use helm_broker_core::{
    Addon, BindTemplate, Chart, Instance, InstanceBindData, InstanceOperation,
    OperationId, OperationState, OperationType, ParamsHash, Plan, ReleaseName,
};
use helm_broker_storage::{
    AddonIdGetter, BindDataInserter, ChartGetter, ErrorKind, InstanceGetter, InstanceInserter,
    OperationInserter, OperationUpdater,
};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::bind::CredentialFactory;
use crate::dto::{ProvisionRequest, ProvisionResponse};
use crate::error::{ServiceError, ServiceResult};
use crate::id_provider::OperationIdProvider;
use crate::installer::HelmClient;
use crate::instance_state::{InstanceState, InstanceStateService};
use crate::operation::{self, MAX_CLAIM_ATTEMPTS, PROVISION_SUCCEEDED};
use crate::stores::BrokerStorage;

/// Trait for provisioning operations
#[async_trait]
pub trait ProvisionService: Send + Sync {
    /// Provision an instance of an addon plan.
    ///
    /// # Returns
    /// * `ProvisionResponse::AlreadyExists` - An identical instance exists
    /// * `ProvisionResponse::Accepted` - Installation runs asynchronously
    async fn provision(&self, request: ProvisionRequest) -> ServiceResult<ProvisionResponse>;
}

/// Default implementation of ProvisionService
pub struct DefaultProvisionService {
    addons: Arc<dyn AddonIdGetter>,
    charts: Arc<dyn ChartGetter>,
    instances: Arc<dyn InstanceGetter>,
    instance_inserter: Arc<dyn InstanceInserter>,
    operations: Arc<dyn OperationInserter>,
    updater: Arc<dyn OperationUpdater>,
    bind_data: Arc<dyn BindDataInserter>,
    state: Arc<dyn InstanceStateService>,
    installer: Arc<dyn HelmClient>,
    credentials: Arc<CredentialFactory>,
    ids: Arc<dyn OperationIdProvider>,
    tasks: TaskTracker,
}

impl DefaultProvisionService {
    /// Create a new provision service
    ///
    /// Installations are spawned on `tasks`.
    pub fn new(
        storage: &BrokerStorage,
        state: Arc<dyn InstanceStateService>,
        installer: Arc<dyn HelmClient>,
        credentials: Arc<CredentialFactory>,
        ids: Arc<dyn OperationIdProvider>,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            addons: storage.addon_getter.clone(),
            charts: storage.chart_getter.clone(),
            instances: storage.instance_getter.clone(),
            instance_inserter: storage.instance_inserter.clone(),
            operations: storage.operation_inserter.clone(),
            updater: storage.operation_updater.clone(),
            bind_data: storage.bind_data_inserter.clone(),
            state,
            installer,
            credentials,
            ids,
            tasks,
        }
    }

    /// Resolve the addon, the requested plan and its chart
    async fn resolve(&self, request: &ProvisionRequest) -> ServiceResult<(Addon, Plan, Chart)> {
        let addon = self
            .addons
            .get_by_id(&request.broker_namespace, &request.addon_id)
            .await?;
        let plan = addon.plan(&request.plan_id).cloned().ok_or_else(|| {
            ServiceError::NotFound(format!(
                "plan {} of addon {}",
                request.plan_id, request.addon_id
            ))
        })?;
        let chart = self
            .charts
            .get(
                &request.broker_namespace,
                &plan.chart_ref.name,
                &plan.chart_ref.version,
            )
            .await?;
        Ok((addon, plan, chart))
    }

    /// Answer from the current state, or `None` when a new operation is needed
    async fn outcome(
        &self,
        request: &ProvisionRequest,
        params_hash: &ParamsHash,
        state: InstanceState,
    ) -> ServiceResult<Option<ProvisionResponse>> {
        if let Some(running) = state.in_progress {
            return match running.operation_type {
                OperationType::Create => match running.params_hash {
                    Some(ref hash) if hash != params_hash => Err(ServiceError::Conflict(format!(
                        "instance {} is being provisioned with different parameters",
                        request.instance_id
                    ))),
                    _ => {
                        debug!(operation_id = %running.operation_id, "Provisioning already in progress");
                        Ok(Some(ProvisionResponse::Accepted {
                            operation_id: running.operation_id,
                        }))
                    }
                },
                OperationType::Remove => Err(ServiceError::OperationInProgress(format!(
                    "instance {} is being deprovisioned",
                    request.instance_id
                ))),
            };
        }

        if state.provisioned {
            let existing = self.instances.get(&request.instance_id).await?;
            if existing.matches(&request.addon_id, &request.plan_id, params_hash) {
                debug!("Instance already provisioned");
                return Ok(Some(ProvisionResponse::AlreadyExists));
            }
            return Err(ServiceError::Conflict(format!(
                "instance {} already exists with different parameters",
                request.instance_id
            )));
        }

        Ok(None)
    }

    /// Settle an operation that was inserted after the instance got provisioned
    /// by a concurrent request.
    async fn abandon_claim(
        &self,
        request: &ProvisionRequest,
        operation_id: &OperationId,
        params_hash: &ParamsHash,
        prior: InstanceState,
    ) -> ServiceResult<ProvisionResponse> {
        let outcome = self.outcome(request, params_hash, prior).await;
        let (state, description) = match &outcome {
            Ok(_) => (OperationState::Succeeded, PROVISION_SUCCEEDED.to_string()),
            Err(err) => (OperationState::Failed, operation::provision_failed(err)),
        };
        operation::complete(
            self.updater.as_ref(),
            &request.instance_id,
            operation_id,
            state,
            description,
        )
        .await;

        match outcome? {
            Some(response) => Ok(response),
            None => Err(ServiceError::Internal(format!(
                "inconsistent state of instance {}",
                request.instance_id
            ))),
        }
    }

    /// Store the instance and spawn the installation
    async fn start(
        &self,
        request: &ProvisionRequest,
        addon: &Addon,
        plan: Plan,
        chart: Chart,
        params_hash: ParamsHash,
        operation_id: OperationId,
    ) -> ServiceResult<ProvisionResponse> {
        let instance = Instance {
            id: request.instance_id.clone(),
            service_id: request.addon_id.clone(),
            plan_id: request.plan_id.clone(),
            namespace: request.namespace.clone(),
            broker_namespace: request.broker_namespace.clone(),
            release_name: ReleaseName::for_instance(&addon.name, &plan.name, &request.instance_id),
            params_hash,
            parameters: request.parameters.clone(),
            values: plan.chart_values.merged_with(&request.parameters),
            created_at: Utc::now(),
        };

        match self.instance_inserter.upsert(instance.clone()).await {
            Ok(true) => info!("Replaced instance left by an earlier provisioning attempt"),
            Ok(false) => {}
            Err(err) => {
                operation::complete(
                    self.updater.as_ref(),
                    &instance.id,
                    &operation_id,
                    OperationState::Failed,
                    operation::provision_failed(&err),
                )
                .await;
                return Err(err.into());
            }
        }

        let bind_template = plan
            .bind_template
            .clone()
            .filter(|t| addon.is_plan_bindable(&plan) && !t.is_empty());

        let job = InstallJob {
            updater: self.updater.clone(),
            bind_data: self.bind_data.clone(),
            installer: self.installer.clone(),
            credentials: self.credentials.clone(),
            operation_id: operation_id.clone(),
            instance,
            chart,
            bind_template,
        };
        let span = info_span!(
            "install",
            instance_id = %request.instance_id,
            operation_id = %operation_id
        );
        self.tasks.spawn(job.run().instrument(span));

        info!(operation_id = %operation_id, "Provisioning accepted");
        Ok(ProvisionResponse::Accepted { operation_id })
    }
}

#[async_trait]
impl ProvisionService for DefaultProvisionService {
    #[instrument(
        skip(self, request),
        fields(instance_id = %request.instance_id, addon_id = %request.addon_id, plan_id = %request.plan_id)
    )]
    async fn provision(&self, request: ProvisionRequest) -> ServiceResult<ProvisionResponse> {
        if request.namespace.is_cluster_wide() {
            return Err(ServiceError::InvalidInput(
                "a target namespace is required".to_string(),
            ));
        }

        let (addon, plan, chart) = self.resolve(&request).await?;
        let params_hash = ParamsHash::compute(&request.addon_id, &request.plan_id, &request.parameters);

        for attempt in 1..=MAX_CLAIM_ATTEMPTS {
            let state = self.state.snapshot(&request.instance_id).await?;
            if let Some(response) = self.outcome(&request, &params_hash, state).await? {
                return Ok(response);
            }

            let operation_id = self.ids.next_id();
            let claim = InstanceOperation::start(
                request.instance_id.clone(),
                operation_id.clone(),
                OperationType::Create,
            )
            .with_params_hash(params_hash.clone());

            match self.operations.insert(claim).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::Conflict => {
                    debug!(attempt, "Another operation claimed the instance, re-reading state");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            // a concurrent request may have finished provisioning between the
            // state read and the claim
            let prior = self
                .state
                .snapshot_before(&request.instance_id, &operation_id)
                .await?;
            if prior.provisioned {
                return self
                    .abandon_claim(&request, &operation_id, &params_hash, prior)
                    .await;
            }

            return self
                .start(&request, &addon, plan, chart, params_hash, operation_id)
                .await;
        }

        Err(ServiceError::OperationInProgress(format!(
            "instance {} is busy",
            request.instance_id
        )))
    }
}

/// Background installation of one instance
struct InstallJob {
    updater: Arc<dyn OperationUpdater>,
    bind_data: Arc<dyn BindDataInserter>,
    installer: Arc<dyn HelmClient>,
    credentials: Arc<CredentialFactory>,
    operation_id: OperationId,
    instance: Instance,
    chart: Chart,
    bind_template: Option<BindTemplate>,
}

impl InstallJob {
    async fn run(self) {
        let result = self
            .installer
            .install(
                &self.chart,
                &self.instance.values,
                &self.instance.release_name,
                &self.instance.namespace,
            )
            .await;

        let (state, description) = match result {
            Ok(installed) => {
                info!(release = %installed.release_name, "Release installed");
                if let Some(template) = &self.bind_template {
                    self.store_bind_data(template).await;
                }
                (OperationState::Succeeded, PROVISION_SUCCEEDED.to_string())
            }
            Err(err) => (OperationState::Failed, operation::provision_failed(err)),
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

    /// Materialize credentials right after installation; binding retries on failure
    async fn store_bind_data(&self, template: &BindTemplate) {
        let credentials = match self
            .credentials
            .credentials(template, &self.instance, &self.chart)
            .await
        {
            Ok(credentials) => credentials,
            Err(err) => {
                warn!(error = %err, "Could not produce bind data after install");
                return;
            }
        };

        let data = InstanceBindData {
            instance_id: self.instance.id.clone(),
            credentials,
        };
        match self.bind_data.insert(data).await {
            Ok(()) => debug!("Stored bind data"),
            Err(err) if err.is_already_exists() => debug!("Bind data already stored"),
            Err(err) => warn!(error = %err, "Could not store bind data after install"),
        }
    }
}
