//! Bind service
//!
//! Binding renders the plan's bind template for a provisioned instance and
//! resolves it into credentials. The credentials are persisted per instance
//! the first time they are produced.

use async_trait::async_trait;
use helm_broker_core::{
    BindTemplate, Chart, Credentials, Instance, InstanceBindData, InstanceId, Namespace,
};
use helm_broker_storage::{
    AddonIdGetter, BindDataGetter, BindDataInserter, ChartGetter, InstanceGetter,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::bind_template::{BindTemplateError, BindTemplateRenderer};
use crate::credentials::BindTemplateResolver;
use crate::dto::{BindRequest, BindResponse};
use crate::error::{ServiceError, ServiceResult};
use crate::instance_state::InstanceStateService;
use crate::stores::BrokerStorage;

/// Renders and resolves bind templates in one step
pub struct CredentialFactory {
    renderer: Arc<dyn BindTemplateRenderer>,
    resolver: Arc<dyn BindTemplateResolver>,
}

impl CredentialFactory {
    pub fn new(
        renderer: Arc<dyn BindTemplateRenderer>,
        resolver: Arc<dyn BindTemplateResolver>,
    ) -> Self {
        Self { renderer, resolver }
    }

    /// Credentials of `instance`; secrets are looked up in the release namespace
    pub async fn credentials(
        &self,
        template: &BindTemplate,
        instance: &Instance,
        chart: &Chart,
    ) -> Result<Credentials, BindTemplateError> {
        let rendered = self.renderer.render_on_bind(template, instance, chart)?;
        self.resolver.resolve(&rendered, &instance.namespace).await
    }
}

/// Trait for bind operations
#[async_trait]
pub trait BindService: Send + Sync {
    /// Produce credentials for a provisioned instance
    async fn bind(&self, request: BindRequest) -> ServiceResult<BindResponse>;

    /// Credentials persisted for an instance served by the broker scope `namespace`
    async fn get_binding(
        &self,
        instance_id: &InstanceId,
        namespace: &Namespace,
    ) -> ServiceResult<BindResponse>;
}

/// Default implementation of BindService
pub struct DefaultBindService {
    instances: Arc<dyn InstanceGetter>,
    addons: Arc<dyn AddonIdGetter>,
    charts: Arc<dyn ChartGetter>,
    bind_data: Arc<dyn BindDataGetter>,
    bind_data_inserter: Arc<dyn BindDataInserter>,
    state: Arc<dyn InstanceStateService>,
    credentials: Arc<CredentialFactory>,
}

impl DefaultBindService {
    /// Create a new bind service
    pub fn new(
        storage: &BrokerStorage,
        state: Arc<dyn InstanceStateService>,
        credentials: Arc<CredentialFactory>,
    ) -> Self {
        Self {
            instances: storage.instance_getter.clone(),
            addons: storage.addon_getter.clone(),
            charts: storage.chart_getter.clone(),
            bind_data: storage.bind_data_getter.clone(),
            bind_data_inserter: storage.bind_data_inserter.clone(),
            state,
            credentials,
        }
    }

    /// The instance, if the broker scope `namespace` serves it
    async fn scoped_instance(
        &self,
        instance_id: &InstanceId,
        namespace: &Namespace,
    ) -> ServiceResult<Instance> {
        let instance = self.instances.get(instance_id).await?;
        if !instance.is_served_by(namespace) {
            return Err(ServiceError::NotFound(format!(
                "instance {} in {}",
                instance_id, namespace
            )));
        }
        Ok(instance)
    }

    /// Addon plan template and chart an instance was provisioned from
    async fn template_and_chart(&self, instance: &Instance) -> ServiceResult<(BindTemplate, Chart)> {
        let addon = self
            .addons
            .get_by_id(&instance.broker_namespace, &instance.service_id)
            .await?;
        let plan = addon.plan(&instance.plan_id).ok_or_else(|| {
            ServiceError::NotFound(format!(
                "plan {} of addon {}",
                instance.plan_id, instance.service_id
            ))
        })?;

        if !addon.is_plan_bindable(plan) {
            return Err(ServiceError::NotBindable(format!(
                "plan {} of addon {} is not bindable",
                plan.id, addon.id
            )));
        }
        let template = plan
            .bind_template
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ServiceError::NotBindable(format!("plan {} has no bind template", plan.id))
            })?;

        let chart = self
            .charts
            .get(
                &instance.broker_namespace,
                &plan.chart_ref.name,
                &plan.chart_ref.version,
            )
            .await?;

        Ok((template, chart))
    }
}

#[async_trait]
impl BindService for DefaultBindService {
    #[instrument(skip(self, request), fields(instance_id = %request.instance_id, binding_id = %request.binding_id))]
    async fn bind(&self, request: BindRequest) -> ServiceResult<BindResponse> {
        if !request.parameters.is_empty() {
            return Err(ServiceError::InvalidInput(
                "binding parameters are not supported".to_string(),
            ));
        }

        let instance = self
            .scoped_instance(&request.instance_id, &request.namespace)
            .await?;

        let state = self.state.snapshot(&request.instance_id).await?;
        if let Some(op) = state.in_progress {
            return Err(ServiceError::OperationInProgress(format!(
                "{} operation {} of instance {} is in progress",
                op.operation_type, op.operation_id, request.instance_id
            )));
        }
        if !state.provisioned {
            return Err(ServiceError::NotFound(format!(
                "instance {} is not provisioned",
                request.instance_id
            )));
        }

        let (template, chart) = self.template_and_chart(&instance).await?;
        let credentials = self
            .credentials
            .credentials(&template, &instance, &chart)
            .await
            .map_err(|e| ServiceError::BindFailed(e.to_string()))?;

        let data = InstanceBindData {
            instance_id: instance.id.clone(),
            credentials: credentials.clone(),
        };
        match self.bind_data_inserter.insert(data).await {
            Ok(()) => info!("Stored bind data"),
            Err(err) if err.is_already_exists() => debug!("Bind data already stored"),
            Err(err) => return Err(err.into()),
        }

        Ok(BindResponse { credentials })
    }

    #[instrument(skip(self), fields(instance_id = %instance_id))]
    async fn get_binding(
        &self,
        instance_id: &InstanceId,
        namespace: &Namespace,
    ) -> ServiceResult<BindResponse> {
        self.scoped_instance(instance_id, namespace).await?;
        let data = self.bind_data.get(instance_id).await?;
        Ok(BindResponse {
            credentials: data.credentials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use helm_broker_core::{
        BindingId, ChartValues, Namespace, OperationState, OperationType, PlanId,
    };
    use serde_json::json;

    fn request(instance: &str) -> BindRequest {
        BindRequest {
            instance_id: InstanceId::from(instance),
            binding_id: BindingId::from("b1"),
            namespace: Namespace::cluster_wide(),
            parameters: ChartValues::default(),
        }
    }

    fn service(fixture: &testing::Fixture) -> DefaultBindService {
        DefaultBindService::new(
            &fixture.storage,
            fixture.state(),
            testing::credential_factory(),
        )
    }

    #[tokio::test]
    async fn test_bind_provisioned_instance() {
        let fixture = testing::Fixture::seeded().await;
        fixture
            .record_instance("i1", OperationType::Create, OperationState::Succeeded)
            .await;
        let svc = service(&fixture);

        let response = svc.bind(request("i1")).await.unwrap();
        assert_eq!(response.credentials["HOST"], "hb-redis-micro-i1.stage.svc.cluster.local");
        assert_eq!(response.credentials["PORT"], "6379");

        let stored = svc.get_binding(&InstanceId::from("i1"), &Namespace::cluster_wide()).await.unwrap();
        assert_eq!(stored, response);

        // a second binding reuses the stored data
        let again = svc.bind(request("i1")).await.unwrap();
        assert_eq!(again, response);
    }

    #[tokio::test]
    async fn test_bind_rejects_parameters() {
        let fixture = testing::Fixture::seeded().await;
        let svc = service(&fixture);
        let mut req = request("i1");
        req.parameters = ChartValues::from_value(json!({"ttl": 60})).unwrap();
        assert!(matches!(
            svc.bind(req).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_unknown_instance() {
        let fixture = testing::Fixture::seeded().await;
        let svc = service(&fixture);
        assert!(matches!(
            svc.bind(request("missing")).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            svc.get_binding(&InstanceId::from("missing"), &Namespace::cluster_wide())
                .await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_while_provisioning() {
        let fixture = testing::Fixture::seeded().await;
        fixture
            .record_instance("i1", OperationType::Create, OperationState::InProgress)
            .await;
        let svc = service(&fixture);
        assert!(matches!(
            svc.bind(request("i1")).await,
            Err(ServiceError::OperationInProgress(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_failed_instance() {
        let fixture = testing::Fixture::seeded().await;
        fixture
            .record_instance("i1", OperationType::Create, OperationState::Failed)
            .await;
        let svc = service(&fixture);
        assert!(matches!(
            svc.bind(request("i1")).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_not_bindable_plan() {
        let fixture = testing::Fixture::seeded().await;
        let mut instance = testing::instance("i1");
        instance.plan_id = PlanId::from("p2");
        fixture
            .record(instance, OperationType::Create, OperationState::Succeeded)
            .await;
        let svc = service(&fixture);
        assert!(matches!(
            svc.bind(request("i1")).await,
            Err(ServiceError::NotBindable(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_other_scope_is_not_found() {
        let fixture = testing::Fixture::seeded().await;
        fixture
            .record_instance("i1", OperationType::Create, OperationState::Succeeded)
            .await;
        let svc = service(&fixture);
        svc.bind(request("i1")).await.unwrap();

        let stage = Namespace::from("stage");
        let mut req = request("i1");
        req.namespace = stage.clone();
        assert!(matches!(svc.bind(req).await, Err(ServiceError::NotFound(_))));
        assert!(matches!(
            svc.get_binding(&InstanceId::from("i1"), &stage).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
