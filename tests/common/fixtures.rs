//! Test fixtures
//!
//! A cluster-wide `redis` addon and a `mysql` addon scoped to the `stage`
//! namespace.

use helm_broker_core::{
    Addon, AddonId, AddonMetadata, AddonName, BindTemplate, Chart, ChartName, ChartRef,
    ChartValues, Namespace, Plan, PlanId, PlanName,
};
use helm_broker_service::StaticKeyRefs;
use helm_broker_storage::{AddonWriter, ChartWriter, MemoryStorage};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const REDIS_ID: &str = "redis-addon";
pub const MICRO_PLAN_ID: &str = "redis-micro";
pub const ENTERPRISE_PLAN_ID: &str = "redis-enterprise";

pub const MYSQL_ID: &str = "mysql-addon";
pub const SMALL_PLAN_ID: &str = "mysql-small";

/// Namespace instances are provisioned into
pub const TARGET_NAMESPACE: &str = "stage";

pub const REDIS_PASSWORD: &str = "s3cret";

const REDIS_BIND_TEMPLATE: &str = r#"credential:
  - name: HOST
    value: {{ .Release.Name }}.{{ .Release.Namespace }}.svc.cluster.local
  - name: PORT
    value: "{{ .Values.port }}"
  - name: PASSWORD
    valueFrom:
      secretKeyRef:
        name: redis-creds
        key: password
"#;

fn values(value: Value) -> ChartValues {
    ChartValues::from_value(value).expect("values must be an object")
}

fn version(raw: &str) -> semver::Version {
    raw.parse().expect("valid version")
}

fn plan(id: &str, name: &str, chart: &str, chart_version: &str) -> Plan {
    Plan {
        id: PlanId::from(id),
        name: PlanName::from(name),
        display_name: None,
        description: format!("{} plan", name),
        bindable: None,
        chart_ref: ChartRef {
            name: ChartName::from(chart),
            version: version(chart_version),
        },
        chart_values: ChartValues::default(),
        bind_template: None,
        provision_schema: None,
    }
}

pub fn redis_addon() -> Addon {
    let mut micro = plan(MICRO_PLAN_ID, "micro", "redis", "1.0.0");
    micro.bind_template = Some(BindTemplate::new(REDIS_BIND_TEMPLATE));
    micro.chart_values = values(json!({"persistence": {"enabled": false}}));
    micro.provision_schema = Some(json!({
        "$schema": "http://json-schema.org/draft-04/schema#",
        "type": "object",
        "properties": {"port": {"type": "integer"}}
    }));

    let mut enterprise = plan(ENTERPRISE_PLAN_ID, "enterprise", "redis", "1.0.0");
    enterprise.bindable = Some(false);

    Addon {
        id: AddonId::from(REDIS_ID),
        name: AddonName::from("redis"),
        version: version("0.1.0"),
        description: "Redis by Helm Broker".to_string(),
        bindable: true,
        tags: vec!["database".to_string()],
        requires: vec![],
        metadata: AddonMetadata {
            display_name: Some("Redis".to_string()),
            ..AddonMetadata::default()
        },
        plans: vec![micro, enterprise],
    }
}

pub fn mysql_addon() -> Addon {
    Addon {
        id: AddonId::from(MYSQL_ID),
        name: AddonName::from("mysql"),
        version: version("0.2.0"),
        description: "MySQL by Helm Broker".to_string(),
        bindable: false,
        tags: vec![],
        requires: vec![],
        metadata: AddonMetadata::default(),
        plans: vec![plan(SMALL_PLAN_ID, "small", "mysql", "5.7.0")],
    }
}

/// Store the addons and their charts
pub async fn seed(storage: &MemoryStorage) {
    let cluster = Namespace::cluster_wide();
    let stage = Namespace::from(TARGET_NAMESPACE);

    storage
        .charts()
        .upsert(
            &cluster,
            Chart::new("redis", version("1.0.0"))
                .with_values(values(json!({"port": 6379, "persistence": {"enabled": true}}))),
        )
        .await
        .expect("Failed to seed redis chart");
    storage
        .charts()
        .upsert(&stage, Chart::new("mysql", version("5.7.0")))
        .await
        .expect("Failed to seed mysql chart");

    storage
        .addons()
        .upsert(&cluster, redis_addon())
        .await
        .expect("Failed to seed redis addon");
    storage
        .addons()
        .upsert(&stage, mysql_addon())
        .await
        .expect("Failed to seed mysql addon");
}

/// Secrets referenced by the redis bind template
pub fn key_refs() -> StaticKeyRefs {
    StaticKeyRefs::new().with_secret(
        TARGET_NAMESPACE,
        "redis-creds",
        BTreeMap::from([("password".to_string(), REDIS_PASSWORD.to_string())]),
    )
}

/// Body of a cluster-wide redis provision request
pub fn redis_provision(plan_id: &str, parameters: Value) -> Value {
    json!({
        "service_id": REDIS_ID,
        "plan_id": plan_id,
        "organization_guid": "org",
        "space_guid": "space",
        "context": {"platform": "kubernetes", "namespace": TARGET_NAMESPACE},
        "parameters": parameters
    })
}

pub fn bind_body() -> Value {
    json!({"service_id": REDIS_ID, "plan_id": MICRO_PLAN_ID})
}
