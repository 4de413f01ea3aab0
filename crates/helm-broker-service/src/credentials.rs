//! Credential resolution
//!
//! A rendered bind template declares credentials as a YAML list:
//!
//! ```yaml
//! credential:
//!   - name: HOST
//!     valueFrom:
//!       serviceRef:
//!         name: redis
//!   - name: PASSWORD
//!     valueFrom:
//!       secretKeyRef:
//!         name: redis
//!         key: redis-password
//!   - name: PORT
//!     value: 6379
//! ```
//!
//! Secrets and config maps are read through a [`KeyRefGetter`].

use async_trait::async_trait;
use helm_broker_core::{Credentials, Namespace};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::bind_template::{BindTemplateError, RenderedBindTemplate};

/// Turns a rendered bind template into credentials
#[async_trait]
pub trait BindTemplateResolver: Send + Sync {
    async fn resolve(
        &self,
        rendered: &RenderedBindTemplate,
        namespace: &Namespace,
    ) -> Result<Credentials, BindTemplateError>;
}

/// Read access to secret and config map entries
#[async_trait]
pub trait KeyRefGetter: Send + Sync {
    async fn secret_key(
        &self,
        namespace: &Namespace,
        name: &str,
        key: &str,
    ) -> Result<String, BindTemplateError>;

    async fn config_map_key(
        &self,
        namespace: &Namespace,
        name: &str,
        key: &str,
    ) -> Result<String, BindTemplateError>;
}

type KeyRefSource = HashMap<(Namespace, String), BTreeMap<String, String>>;

/// Fixed set of secrets and config maps
#[derive(Debug, Clone, Default)]
pub struct StaticKeyRefs {
    secrets: KeyRefSource,
    config_maps: KeyRefSource,
}

impl StaticKeyRefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_secret(
        &mut self,
        namespace: Namespace,
        name: impl Into<String>,
        data: BTreeMap<String, String>,
    ) {
        self.secrets.insert((namespace, name.into()), data);
    }

    pub fn insert_config_map(
        &mut self,
        namespace: Namespace,
        name: impl Into<String>,
        data: BTreeMap<String, String>,
    ) {
        self.config_maps.insert((namespace, name.into()), data);
    }

    pub fn with_secret(
        mut self,
        namespace: impl Into<Namespace>,
        name: impl Into<String>,
        data: BTreeMap<String, String>,
    ) -> Self {
        self.insert_secret(namespace.into(), name, data);
        self
    }

    pub fn with_config_map(
        mut self,
        namespace: impl Into<Namespace>,
        name: impl Into<String>,
        data: BTreeMap<String, String>,
    ) -> Self {
        self.insert_config_map(namespace.into(), name, data);
        self
    }

    fn lookup(
        source: &KeyRefSource,
        kind: &str,
        namespace: &Namespace,
        name: &str,
        key: &str,
    ) -> Result<String, BindTemplateError> {
        let data = source
            .get(&(namespace.clone(), name.to_string()))
            .ok_or_else(|| {
                BindTemplateError::Resolve(format!("{} {}/{} not found", kind, namespace, name))
            })?;
        data.get(key).cloned().ok_or_else(|| {
            BindTemplateError::Resolve(format!(
                "{} {}/{} has no key {}",
                kind, namespace, name, key
            ))
        })
    }
}

#[async_trait]
impl KeyRefGetter for StaticKeyRefs {
    async fn secret_key(
        &self,
        namespace: &Namespace,
        name: &str,
        key: &str,
    ) -> Result<String, BindTemplateError> {
        Self::lookup(&self.secrets, "secret", namespace, name, key)
    }

    async fn config_map_key(
        &self,
        namespace: &Namespace,
        name: &str,
        key: &str,
    ) -> Result<String, BindTemplateError> {
        Self::lookup(&self.config_maps, "config map", namespace, name, key)
    }
}

#[derive(Debug, Deserialize)]
struct BindDocument {
    #[serde(default)]
    credential: Vec<CredentialVar>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialVar {
    name: String,
    value: Option<serde_yaml::Value>,
    value_from: Option<CredentialSource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialSource {
    secret_key_ref: Option<KeyRef>,
    config_map_key_ref: Option<KeyRef>,
    service_ref: Option<ServiceRef>,
}

#[derive(Debug, Deserialize)]
struct KeyRef {
    name: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct ServiceRef {
    name: String,
}

/// Resolver reading the `credential` list of a rendered template
pub struct CredentialResolver {
    key_refs: Arc<dyn KeyRefGetter>,
}

impl CredentialResolver {
    pub fn new(key_refs: Arc<dyn KeyRefGetter>) -> Self {
        Self { key_refs }
    }

    async fn resolve_source(
        &self,
        name: &str,
        source: CredentialSource,
        namespace: &Namespace,
    ) -> Result<String, BindTemplateError> {
        match (
            source.secret_key_ref,
            source.config_map_key_ref,
            source.service_ref,
        ) {
            (Some(secret), None, None) => {
                self.key_refs
                    .secret_key(namespace, &secret.name, &secret.key)
                    .await
            }
            (None, Some(config_map), None) => {
                self.key_refs
                    .config_map_key(namespace, &config_map.name, &config_map.key)
                    .await
            }
            (None, None, Some(service)) => Ok(service_host(&service.name, namespace)),
            _ => Err(BindTemplateError::Resolve(format!(
                "credential {} must declare exactly one valueFrom source",
                name
            ))),
        }
    }
}

/// In-cluster DNS name of a service
fn service_host(service: &str, namespace: &Namespace) -> String {
    format!("{}.{}.svc.cluster.local", service, namespace.as_str())
}

fn literal(name: &str, value: serde_yaml::Value) -> Result<String, BindTemplateError> {
    match value {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        _ => Err(BindTemplateError::Resolve(format!(
            "credential {} must have a scalar value",
            name
        ))),
    }
}

#[async_trait]
impl BindTemplateResolver for CredentialResolver {
    async fn resolve(
        &self,
        rendered: &RenderedBindTemplate,
        namespace: &Namespace,
    ) -> Result<Credentials, BindTemplateError> {
        let mut credentials = Credentials::new();
        if rendered.as_str().trim().is_empty() {
            return Ok(credentials);
        }

        let document: BindDocument = serde_yaml::from_str(rendered.as_str())
            .map_err(|e| BindTemplateError::Parse(e.to_string()))?;

        for var in document.credential {
            if var.name.trim().is_empty() {
                return Err(BindTemplateError::Resolve(
                    "credential without a name".to_string(),
                ));
            }
            let value = match (var.value, var.value_from) {
                (Some(value), None) => literal(&var.name, value)?,
                (None, Some(source)) => self.resolve_source(&var.name, source, namespace).await?,
                (Some(_), Some(_)) => {
                    return Err(BindTemplateError::Resolve(format!(
                        "credential {} declares both value and valueFrom",
                        var.name
                    )))
                }
                (None, None) => {
                    return Err(BindTemplateError::Resolve(format!(
                        "credential {} declares neither value nor valueFrom",
                        var.name
                    )))
                }
            };
            if credentials.insert(var.name.clone(), value).is_some() {
                return Err(BindTemplateError::Resolve(format!(
                    "credential {} declared twice",
                    var.name
                )));
            }
        }

        Ok(credentials)
    }
}
