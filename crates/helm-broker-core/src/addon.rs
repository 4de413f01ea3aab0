//! Addon catalog model
//!
//! Addons are produced by the repository reconciliation loop and are
//! read-only to the broker. Each addon offers one or more plans, and every
//! plan points at the chart that gets installed for it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::chart::ChartValues;
use crate::error::{BrokerError, Result};
use crate::types::{AddonId, AddonName, ChartName, PlanId, PlanName};

/// Reference from a plan to a chart version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRef {
    /// Chart name
    pub name: ChartName,
    /// Chart version
    pub version: semver::Version,
}

/// Template rendered at bind time into the credential document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindTemplate(String);

impl BindTemplate {
    /// Wrap raw template text
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Borrow the template text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the template has no content
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// A purchasable variant of an addon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier
    pub id: PlanId,

    /// Plan name
    pub name: PlanName,

    /// Display name shown by the platform
    #[serde(default)]
    pub display_name: Option<String>,

    /// Plan description
    #[serde(default)]
    pub description: String,

    /// Overrides the addon bindable flag when set
    #[serde(default)]
    pub bindable: Option<bool>,

    /// Chart installed for this plan
    pub chart_ref: ChartRef,

    /// Plan specific chart values
    #[serde(default)]
    pub chart_values: ChartValues,

    /// Template rendered on bind
    #[serde(default)]
    pub bind_template: Option<BindTemplate>,

    /// JSON schema of the provisioning parameters
    #[serde(default)]
    pub provision_schema: Option<Value>,
}

/// Presentation metadata of an addon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddonMetadata {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub provider_display_name: Option<String>,
    #[serde(default)]
    pub long_description: Option<String>,
    #[serde(default)]
    pub documentation_url: Option<String>,
    #[serde(default)]
    pub support_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// A catalog entry describing an installable package and its plans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Addon {
    /// Addon identifier
    pub id: AddonId,

    /// Addon name
    pub name: AddonName,

    /// Addon version
    pub version: semver::Version,

    /// Short description
    #[serde(default)]
    pub description: String,

    /// Whether instances of this addon can be bound
    #[serde(default)]
    pub bindable: bool,

    /// Tags advertised in the catalog
    #[serde(default)]
    pub tags: Vec<String>,

    /// Platform permissions required by the addon
    #[serde(default)]
    pub requires: Vec<String>,

    /// Presentation metadata
    #[serde(default)]
    pub metadata: AddonMetadata,

    /// Offered plans
    pub plans: Vec<Plan>,
}

impl Addon {
    /// Find a plan by id
    pub fn plan(&self, id: &PlanId) -> Option<&Plan> {
        self.plans.iter().find(|p| &p.id == id)
    }

    /// Whether the given plan can be bound; plans fall back to the addon flag
    pub fn is_plan_bindable(&self, plan: &Plan) -> bool {
        plan.bindable.unwrap_or(self.bindable)
    }

    /// Validate structural consistency
    pub fn validate(&self) -> Result<()> {
        if self.id.as_str().is_empty() {
            return Err(BrokerError::InvalidAddon("addon id is empty".to_string()));
        }
        if self.plans.is_empty() {
            return Err(BrokerError::InvalidAddon(format!(
                "addon {} has no plans",
                self.id
            )));
        }
        let mut seen = HashSet::new();
        for plan in &self.plans {
            if !seen.insert(&plan.id) {
                return Err(BrokerError::InvalidAddon(format!(
                    "addon {} declares plan {} twice",
                    self.id, plan.id
                )));
            }
        }
        Ok(())
    }
}
