//! Service layer for the Helm Broker
//!
//! This crate implements the broker operations on top of the storage
//! capabilities and the installer.
//!
//! # Architecture
//!
//! - **CatalogService**: OSB catalog built from stored addons
//! - **ProvisionService**: Instance creation and background chart install
//! - **DeprovisionService**: Instance removal and background release delete
//! - **BindService**: Credentials rendered from the plan's bind template
//! - **UnbindService**: Accepts unbind requests
//! - **LastOperationService**: Status of asynchronous operations
//! - **InstanceStateService**: Instance state derived from operation history
//!
//! Background installs and deletes run on a shared `TaskTracker` so that
//! the server can drain them on shutdown.
//!
//! # Example
//!
//! ```rust,no_run
//! use helm_broker_service::{Broker, HelmClientConfig, HttpHelmClient, StaticKeyRefs};
//! use helm_broker_storage::MemoryStorage;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = MemoryStorage::new();
//! let installer = HttpHelmClient::new(HelmClientConfig::default())?;
//!
//! let broker = Broker::builder()
//!     .storage((&storage).into())
//!     .installer(Arc::new(installer))
//!     .key_refs(Arc::new(StaticKeyRefs::new()))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

pub mod bind;
pub mod bind_template;
pub mod catalog;
pub mod credentials;
pub mod deprovision;
pub mod dto;
pub mod error;
pub mod id_provider;
pub mod installer;
pub mod instance_state;
pub mod last_operation;
mod operation;
pub mod provision;
pub mod stores;
pub mod unbind;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use dto::*;
pub use error::{ServiceError, ServiceResult};

// Re-export service traits and implementations
pub use bind::{BindService, CredentialFactory, DefaultBindService};
pub use bind_template::{
    BindTemplateError, BindTemplateRenderer, RenderedBindTemplate, TemplateRenderer,
};
pub use catalog::{CatalogService, DefaultCatalogService};
pub use credentials::{BindTemplateResolver, CredentialResolver, KeyRefGetter, StaticKeyRefs};
pub use deprovision::{DefaultDeprovisionService, DeprovisionService};
pub use id_provider::{OperationIdProvider, SequentialIdProvider, UuidOperationIdProvider};
pub use installer::{
    HelmClient, HelmClientConfig, HttpHelmClient, InstallResponse, InstallerError,
};
pub use instance_state::{DefaultInstanceStateService, InstanceState, InstanceStateService};
pub use last_operation::{DefaultLastOperationService, LastOperationService};
pub use provision::{DefaultProvisionService, ProvisionService};
pub use stores::BrokerStorage;
pub use unbind::{DefaultUnbindService, UnbindService};

use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Composition root holding all broker services
///
/// Cloning is cheap and every clone shares the same background tasks.
#[derive(Clone)]
pub struct Broker {
    /// Catalog service
    pub catalog: Arc<dyn CatalogService>,
    /// Provision service
    pub provision: Arc<dyn ProvisionService>,
    /// Deprovision service
    pub deprovision: Arc<dyn DeprovisionService>,
    /// Bind service
    pub bind: Arc<dyn BindService>,
    /// Unbind service
    pub unbind: Arc<dyn UnbindService>,
    /// Last operation service
    pub last_operation: Arc<dyn LastOperationService>,
    /// Instance state queries
    pub instance_state: Arc<dyn InstanceStateService>,
    tasks: TaskTracker,
}

impl Broker {
    /// Start building a broker
    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::new()
    }

    /// Get the catalog service
    pub fn catalog(&self) -> &Arc<dyn CatalogService> {
        &self.catalog
    }

    /// Get the provision service
    pub fn provision(&self) -> &Arc<dyn ProvisionService> {
        &self.provision
    }

    /// Get the deprovision service
    pub fn deprovision(&self) -> &Arc<dyn DeprovisionService> {
        &self.deprovision
    }

    /// Get the bind service
    pub fn bind(&self) -> &Arc<dyn BindService> {
        &self.bind
    }

    /// Get the unbind service
    pub fn unbind(&self) -> &Arc<dyn UnbindService> {
        &self.unbind
    }

    /// Get the last operation service
    pub fn last_operation(&self) -> &Arc<dyn LastOperationService> {
        &self.last_operation
    }

    /// Get the instance state service
    pub fn instance_state(&self) -> &Arc<dyn InstanceStateService> {
        &self.instance_state
    }

    /// Number of installs and deletes still running
    pub fn running_operations(&self) -> usize {
        self.tasks.len()
    }

    /// Wait until every background operation spawned so far has finished.
    ///
    /// New operations can still be started afterwards.
    pub async fn wait_for_operations(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Wait for running operations, giving up after `timeout`.
    ///
    /// Returns `true` when every operation finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let running = self.tasks.len();
        if running > 0 {
            info!(running, "Waiting for background operations");
        }
        self.tasks.close();
        match tokio::time::timeout(timeout, self.tasks.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    running = self.tasks.len(),
                    "Background operations still running at shutdown"
                );
                false
            }
        }
    }
}

/// Builder for Broker with custom collaborators
#[derive(Default)]
pub struct BrokerBuilder {
    storage: Option<BrokerStorage>,
    installer: Option<Arc<dyn HelmClient>>,
    key_refs: Option<Arc<dyn KeyRefGetter>>,
    id_provider: Option<Arc<dyn OperationIdProvider>>,
    renderer: Option<Arc<dyn BindTemplateRenderer>>,
    resolver: Option<Arc<dyn BindTemplateResolver>>,
}

impl BrokerBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the storage capabilities
    pub fn storage(mut self, storage: BrokerStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the installer
    pub fn installer(mut self, installer: Arc<dyn HelmClient>) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Set the source of secret and config map values used on bind
    pub fn key_refs(mut self, key_refs: Arc<dyn KeyRefGetter>) -> Self {
        self.key_refs = Some(key_refs);
        self
    }

    /// Set the operation id provider; UUIDs by default
    pub fn id_provider(mut self, provider: Arc<dyn OperationIdProvider>) -> Self {
        self.id_provider = Some(provider);
        self
    }

    /// Set a custom bind template renderer
    pub fn renderer(mut self, renderer: Arc<dyn BindTemplateRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Set a custom credential resolver; replaces `key_refs`
    pub fn resolver(mut self, resolver: Arc<dyn BindTemplateResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Build the broker
    ///
    /// # Errors
    ///
    /// Returns an error if storage or installer are not set.
    pub fn build(self) -> Result<Broker, String> {
        let storage = self.storage.ok_or("Storage is required")?;
        let installer = self.installer.ok_or("Installer is required")?;

        let renderer: Arc<dyn BindTemplateRenderer> = match self.renderer {
            Some(renderer) => renderer,
            None => Arc::new(TemplateRenderer::new().map_err(|e| e.to_string())?),
        };
        let resolver: Arc<dyn BindTemplateResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => {
                let key_refs = self
                    .key_refs
                    .unwrap_or_else(|| Arc::new(StaticKeyRefs::new()));
                Arc::new(CredentialResolver::new(key_refs))
            }
        };
        let credentials = Arc::new(CredentialFactory::new(renderer, resolver));
        let ids = self
            .id_provider
            .unwrap_or_else(|| Arc::new(UuidOperationIdProvider));
        let tasks = TaskTracker::new();

        let instance_state: Arc<dyn InstanceStateService> = Arc::new(
            DefaultInstanceStateService::new(storage.operation_collection.clone()),
        );

        let catalog = Arc::new(DefaultCatalogService::new(storage.addon_finder.clone()));

        let provision = Arc::new(DefaultProvisionService::new(
            &storage,
            instance_state.clone(),
            installer.clone(),
            credentials.clone(),
            ids.clone(),
            tasks.clone(),
        ));

        let deprovision = Arc::new(DefaultDeprovisionService::new(
            &storage,
            instance_state.clone(),
            installer,
            ids,
            tasks.clone(),
        ));

        let bind = Arc::new(DefaultBindService::new(
            &storage,
            instance_state.clone(),
            credentials,
        ));

        let last_operation = Arc::new(DefaultLastOperationService::new(&storage));

        Ok(Broker {
            catalog,
            provision,
            deprovision,
            bind,
            unbind: Arc::new(DefaultUnbindService::new()),
            last_operation,
            instance_state,
            tasks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::MockHelmClient;
    use crate::testing::{self, Fixture};
    use helm_broker_core::{InstanceId, Namespace, OperationId, OperationState, ReleaseName};

    #[test]
    fn test_builder_requires_storage_and_installer() {
        assert!(Broker::builder().build().is_err());
        let storage = helm_broker_storage::MemoryStorage::new();
        assert!(Broker::builder()
            .storage((&storage).into())
            .build()
            .is_err());
    }

    #[tokio::test]
    async fn test_broker_end_to_end() {
        let fixture = Fixture::seeded().await;
        let mut installer = MockHelmClient::new();
        installer.expect_install().times(1).returning(|_, _, release, ns| {
            Ok(InstallResponse {
                release_name: release.clone(),
                namespace: ns.clone(),
                status: None,
            })
        });
        installer
            .expect_delete()
            .withf(|release| release == &ReleaseName::from("hb-redis-micro-i1"))
            .times(1)
            .returning(|_| Ok(()));

        let broker = Broker::builder()
            .storage(fixture.storage.clone())
            .installer(Arc::new(installer))
            .id_provider(Arc::new(SequentialIdProvider::new()))
            .build()
            .unwrap();

        let iid = InstanceId::from("i1");
        let response = broker
            .provision()
            .provision(testing::provision_request("i1"))
            .await
            .unwrap();
        assert_eq!(
            response,
            ProvisionResponse::Accepted {
                operation_id: OperationId::from("op1")
            }
        );
        broker.wait_for_operations().await;

        let status = broker
            .last_operation()
            .last_operation(LastOperationRequest {
                instance_id: iid.clone(),
                namespace: Namespace::cluster_wide(),
                operation_id: Some(OperationId::from("op1")),
            })
            .await
            .unwrap();
        assert_eq!(status.state, OperationState::Succeeded);

        let bound = broker
            .bind()
            .bind(BindRequest {
                instance_id: iid.clone(),
                binding_id: "b1".into(),
                namespace: Namespace::cluster_wide(),
                parameters: Default::default(),
            })
            .await
            .unwrap();
        assert_eq!(bound.credentials["PORT"], "6379");

        let response = broker
            .deprovision()
            .deprovision(DeprovisionRequest {
                instance_id: iid.clone(),
                namespace: Namespace::cluster_wide(),
            })
            .await
            .unwrap();
        assert_eq!(
            response,
            DeprovisionResponse::Accepted {
                operation_id: OperationId::from("op2")
            }
        );
        assert!(broker.shutdown(Duration::from_secs(5)).await);

        assert!(broker
            .bind()
            .get_binding(&iid, &Namespace::cluster_wide())
            .await
            .is_err());
        assert!(!broker.instance_state().is_provisioned(&iid).await.unwrap());
        assert!(broker.instance_state().is_deprovisioned(&iid).await.unwrap());
    }
}
