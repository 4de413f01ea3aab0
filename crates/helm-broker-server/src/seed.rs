//! Catalog seeding
//!
//! Addons, charts, secrets and config maps are loaded from a JSON file into
//! the in-memory stores at startup. Entries without a `namespace` are
//! cluster-wide.
//!
//! ```json
//! {
//!   "addons": [{ "namespace": "stage", "id": "a1", "name": "redis", ... }],
//!   "charts": [{ "name": "redis", "version": "1.0.0", "values": {} }],
//!   "secrets": [{ "namespace": "stage", "name": "creds", "data": { "password": "s3cret" } }],
//!   "config_maps": []
//! }
//! ```

use anyhow::{Context, Result};
use helm_broker_core::{Addon, Chart, Namespace};
use helm_broker_service::StaticKeyRefs;
use helm_broker_storage::{AddonWriter, ChartWriter, MemoryStorage};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Contents of a seed file
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub addons: Vec<SeededAddon>,

    #[serde(default)]
    pub charts: Vec<SeededChart>,

    #[serde(default)]
    pub secrets: Vec<KeyRefEntry>,

    #[serde(default)]
    pub config_maps: Vec<KeyRefEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SeededAddon {
    #[serde(default)]
    pub namespace: Namespace,

    #[serde(flatten)]
    pub addon: Addon,
}

#[derive(Debug, Deserialize)]
pub struct SeededChart {
    #[serde(default)]
    pub namespace: Namespace,

    #[serde(flatten)]
    pub chart: Chart,
}

/// A secret or config map
#[derive(Debug, Deserialize)]
pub struct KeyRefEntry {
    #[serde(default)]
    pub namespace: Namespace,

    pub name: String,

    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// Counts of what was loaded
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub addons: usize,
    pub charts: usize,
    pub secrets: usize,
    pub config_maps: usize,
}

impl Seed {
    /// Read and parse a seed file
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid seed file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Write addons and charts into storage and collect the key references
    pub async fn apply(self, storage: &MemoryStorage) -> Result<(StaticKeyRefs, SeedSummary)> {
        let addons = storage.addons();
        let charts = storage.charts();
        let mut summary = SeedSummary::default();

        for entry in self.charts {
            debug!(chart = %entry.chart.name, version = %entry.chart.version, "Seeding chart");
            let label = format!("{}@{}", entry.chart.name, entry.chart.version);
            charts
                .upsert(&entry.namespace, entry.chart)
                .await
                .with_context(|| format!("Failed to store chart {}", label))?;
            summary.charts += 1;
        }

        for entry in self.addons {
            debug!(addon_id = %entry.addon.id, namespace = %entry.namespace, "Seeding addon");
            let id = entry.addon.id.clone();
            addons
                .upsert(&entry.namespace, entry.addon)
                .await
                .with_context(|| format!("Failed to store addon {}", id))?;
            summary.addons += 1;
        }

        let mut key_refs = StaticKeyRefs::new();
        for secret in self.secrets {
            key_refs.insert_secret(secret.namespace, secret.name, secret.data);
            summary.secrets += 1;
        }
        for config_map in self.config_maps {
            key_refs.insert_config_map(config_map.namespace, config_map.name, config_map.data);
            summary.config_maps += 1;
        }

        info!(
            addons = summary.addons,
            charts = summary.charts,
            secrets = summary.secrets,
            config_maps = summary.config_maps,
            "Catalog seeded"
        );
        Ok((key_refs, summary))
    }
}
