//! Catalog service
//!
//! Converts stored addons into OSB service offerings.

use async_trait::async_trait;
use helm_broker_core::{Addon, Namespace, Plan};
use helm_broker_storage::AddonFinder;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::dto::{
    Catalog, InputParameters, PlanMetadata, PlanSchemas, ServiceInstanceSchema, ServiceMetadata,
    ServiceOffering, ServicePlan,
};
use crate::error::ServiceResult;

/// Trait for catalog operations
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Catalog of the addons visible in `namespace`
    async fn get_catalog(&self, namespace: &Namespace) -> ServiceResult<Catalog>;
}

/// Default implementation of CatalogService
pub struct DefaultCatalogService {
    addons: Arc<dyn AddonFinder>,
}

impl DefaultCatalogService {
    /// Create a new catalog service
    pub fn new(addons: Arc<dyn AddonFinder>) -> Self {
        Self { addons }
    }

    fn to_offering(addon: &Addon) -> ServiceOffering {
        let metadata = &addon.metadata;
        ServiceOffering {
            id: addon.id.clone(),
            name: addon.name.to_string(),
            description: addon.description.clone(),
            bindable: addon.bindable,
            plan_updateable: false,
            tags: addon.tags.clone(),
            requires: addon.requires.clone(),
            metadata: ServiceMetadata {
                display_name: metadata.display_name.clone(),
                provider_display_name: metadata.provider_display_name.clone(),
                long_description: metadata.long_description.clone(),
                documentation_url: metadata.documentation_url.clone(),
                support_url: metadata.support_url.clone(),
                image_url: metadata.image_url.clone(),
                labels: metadata.labels.clone(),
            },
            plans: addon
                .plans
                .iter()
                .map(|plan| Self::to_plan(addon, plan))
                .collect(),
        }
    }

    fn to_plan(addon: &Addon, plan: &Plan) -> ServicePlan {
        ServicePlan {
            id: plan.id.clone(),
            name: plan.name.to_string(),
            description: plan.description.clone(),
            bindable: addon.is_plan_bindable(plan),
            free: true,
            metadata: PlanMetadata {
                display_name: plan.display_name.clone(),
            },
            schemas: plan.provision_schema.clone().map(|parameters| PlanSchemas {
                service_instance: ServiceInstanceSchema {
                    create: InputParameters { parameters },
                },
            }),
        }
    }
}

#[async_trait]
impl CatalogService for DefaultCatalogService {
    #[instrument(skip(self), fields(namespace = %namespace))]
    async fn get_catalog(&self, namespace: &Namespace) -> ServiceResult<Catalog> {
        let mut addons = self.addons.find_all(namespace).await?;
        addons.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let services: Vec<_> = addons.iter().map(Self::to_offering).collect();
        debug!(count = services.len(), "Built catalog");

        Ok(Catalog { services })
    }
}
