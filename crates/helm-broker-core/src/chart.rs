//! Chart definitions and chart values

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{BrokerError, Result};
use crate::types::ChartName;

/// Values passed to the installer when rendering a chart.
///
/// Always a JSON object. Nested objects are merged key by key, any other
/// value is replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartValues(Map<String, Value>);

impl ChartValues {
    /// Create empty values
    pub fn new() -> Self {
        Self::default()
    }

    /// Build values from an arbitrary JSON value; `null` yields empty values.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(BrokerError::InvalidValues(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    /// Borrow the underlying map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a JSON value
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Whether no values are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return a copy of `self` with `overrides` merged on top.
    pub fn merged_with(&self, overrides: &ChartValues) -> ChartValues {
        let mut base = self.0.clone();
        merge_maps(&mut base, &overrides.0);
        ChartValues(base)
    }

    /// Look up a nested value by a dotted path such as `auth.password`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

fn merge_maps(base: &mut Map<String, Value>, overrides: &Map<String, Value>) {
    for (key, value) in overrides {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_maps(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// A versioned package definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    /// Chart name
    pub name: ChartName,

    /// Chart version
    pub version: semver::Version,

    /// Chart description
    #[serde(default)]
    pub description: Option<String>,

    /// Default chart values
    #[serde(default)]
    pub values: ChartValues,

    /// Raw chart templates keyed by file name
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
}

impl Chart {
    /// Create a chart without templates
    pub fn new(name: impl Into<ChartName>, version: semver::Version) -> Self {
        Self {
            name: name.into(),
            version,
            description: None,
            values: ChartValues::default(),
            templates: BTreeMap::new(),
        }
    }

    /// Set default values
    pub fn with_values(mut self, values: ChartValues) -> Self {
        self.values = values;
        self
    }
}
