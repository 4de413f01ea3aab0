//! Shared fixtures for unit tests

use helm_broker_core::{
    Addon, AddonId, AddonMetadata, AddonName, BindTemplate, Chart, ChartName, ChartRef,
    ChartValues, Instance, InstanceId, InstanceOperation, Namespace, OperationId,
    OperationState, OperationType, ParamsHash, Plan, PlanId, PlanName, ReleaseName,
};
use helm_broker_storage::{
    AddonWriter, ChartWriter, InstanceInserter, MemoryStorage, OperationCollectionGetter,
    OperationInserter, OperationUpdater, OptionalExt,
};
use serde_json::json;
use std::sync::Arc;
use tokio_util::task::TaskTracker;

use crate::bind::CredentialFactory;
use crate::bind_template::TemplateRenderer;
use crate::credentials::{CredentialResolver, StaticKeyRefs};
use crate::dto::ProvisionRequest;
use crate::instance_state::{DefaultInstanceStateService, InstanceStateService};
use crate::stores::BrokerStorage;

pub(crate) const BIND_TEMPLATE: &str = "credential:\n  - name: HOST\n    value: {{ .Release.Name }}.{{ .Release.Namespace }}.svc.cluster.local\n  - name: PORT\n    value: \"{{ .Values.port }}\"\n";

pub(crate) fn chart() -> Chart {
    Chart::new("redis", semver::Version::new(1, 0, 0))
        .with_values(ChartValues::from_value(json!({"port": 6379})).unwrap_or_default())
}

fn plan(id: &str, name: &str, bindable: Option<bool>) -> Plan {
    Plan {
        id: PlanId::from(id),
        name: PlanName::from(name),
        display_name: None,
        description: format!("{} plan", name),
        bindable,
        chart_ref: ChartRef {
            name: ChartName::from("redis"),
            version: semver::Version::new(1, 0, 0),
        },
        chart_values: ChartValues::default(),
        bind_template: Some(BindTemplate::new(BIND_TEMPLATE)),
        provision_schema: None,
    }
}

/// Redis addon with a bindable `micro` plan and a non-bindable `enterprise` plan
pub(crate) fn addon() -> Addon {
    Addon {
        id: AddonId::from("a1"),
        name: AddonName::from("redis"),
        version: semver::Version::new(0, 1, 0),
        description: "Redis".to_string(),
        bindable: true,
        tags: vec![],
        requires: vec![],
        metadata: AddonMetadata::default(),
        plans: vec![
            plan("p1", "micro", None),
            plan("p2", "enterprise", Some(false)),
        ],
    }
}

pub(crate) fn instance(id: &str) -> Instance {
    Instance {
        id: InstanceId::from(id),
        service_id: AddonId::from("a1"),
        plan_id: PlanId::from("p1"),
        namespace: Namespace::from("stage"),
        broker_namespace: Namespace::cluster_wide(),
        release_name: ReleaseName::for_instance(
            &AddonName::from("redis"),
            &PlanName::from("micro"),
            &InstanceId::from(id),
        ),
        params_hash: ParamsHash::compute(
            &AddonId::from("a1"),
            &PlanId::from("p1"),
            &ChartValues::default(),
        ),
        parameters: ChartValues::default(),
        values: ChartValues::default(),
        created_at: chrono::Utc::now(),
    }
}

pub(crate) fn provision_request(id: &str) -> ProvisionRequest {
    ProvisionRequest {
        instance_id: InstanceId::from(id),
        addon_id: AddonId::from("a1"),
        plan_id: PlanId::from("p1"),
        broker_namespace: Namespace::cluster_wide(),
        namespace: Namespace::from("stage"),
        parameters: ChartValues::default(),
    }
}

pub(crate) fn credential_factory() -> Arc<CredentialFactory> {
    Arc::new(CredentialFactory::new(
        Arc::new(TemplateRenderer::new().unwrap()),
        Arc::new(CredentialResolver::new(Arc::new(StaticKeyRefs::new()))),
    ))
}

/// In-memory storage seeded with [`addon`] and [`chart`]
pub(crate) struct Fixture {
    pub memory: MemoryStorage,
    pub storage: BrokerStorage,
    pub tasks: TaskTracker,
}

impl Fixture {
    pub async fn seeded() -> Self {
        let memory = MemoryStorage::new();
        let ns = Namespace::cluster_wide();
        memory.addons().upsert(&ns, addon()).await.unwrap();
        memory.charts().upsert(&ns, chart()).await.unwrap();
        Self {
            storage: BrokerStorage::from(&memory),
            memory,
            tasks: TaskTracker::new(),
        }
    }

    pub fn state(&self) -> Arc<dyn InstanceStateService> {
        Arc::new(DefaultInstanceStateService::new(
            self.storage.operation_collection.clone(),
        ))
    }

    /// Store [`instance`] with one operation in `state`
    pub async fn record_instance(&self, id: &str, kind: OperationType, state: OperationState) {
        self.record(instance(id), kind, state).await;
    }

    pub async fn record(&self, instance: Instance, kind: OperationType, state: OperationState) {
        let history = self.history(instance.id.as_str()).await;
        let operation_id = OperationId::new(format!("seed{}", history.len() + 1));
        let operation =
            InstanceOperation::start(instance.id.clone(), operation_id.clone(), kind)
                .with_params_hash(instance.params_hash.clone());

        let operations = self.memory.operations();
        operations.insert(operation).await.unwrap();
        if state != OperationState::InProgress {
            operations
                .update_state(&instance.id, &operation_id, state)
                .await
                .unwrap();
        }
        self.memory.instances().upsert(instance).await.unwrap();
    }

    pub async fn history(&self, id: &str) -> Vec<InstanceOperation> {
        self.memory
            .operations()
            .get_all(&InstanceId::from(id))
            .await
            .optional()
            .unwrap()
            .unwrap_or_default()
    }

    /// Wait for every spawned operation to finish
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}
