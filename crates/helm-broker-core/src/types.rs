//! Core type definitions

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{BrokerError, Result};

/// Maximum length of a release name accepted by the installer
pub const MAX_RELEASE_NAME_LEN: usize = 53;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Parse a non-empty identifier
            pub fn parse(value: &str) -> Result<Self> {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(BrokerError::InvalidId(format!(
                        "{} must not be empty",
                        stringify!($name)
                    )));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Borrow the underlying string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of an addon (OSB service id)
    AddonId
);
string_id!(
    /// Human readable addon name
    AddonName
);
string_id!(
    /// Identifier of a plan (OSB plan id)
    PlanId
);
string_id!(
    /// Human readable plan name
    PlanName
);
string_id!(
    /// Name of a chart in chart storage
    ChartName
);
string_id!(
    /// Platform-supplied instance identifier
    InstanceId
);
string_id!(
    /// Identifier of an asynchronous instance operation
    OperationId
);
string_id!(
    /// Platform-supplied binding identifier
    BindingId
);
string_id!(
    /// Name of the release created by the installer
    ReleaseName
);

impl ReleaseName {
    /// Build the release name for an instance of an addon plan.
    ///
    /// The result only contains lowercase alphanumerics and `-` and never
    /// exceeds [`MAX_RELEASE_NAME_LEN`]. Names that would be longer keep a
    /// shortened prefix followed by a digest of the instance id, so distinct
    /// instances never share a release.
    pub fn for_instance(addon: &AddonName, plan: &PlanName, instance: &InstanceId) -> Self {
        let name = dns_label(&format!("hb-{}-{}-{}", addon, plan, instance));
        if name.len() <= MAX_RELEASE_NAME_LEN {
            return Self(name);
        }

        let digest = format!("{:x}", Sha256::digest(instance.as_str().as_bytes()));
        let suffix = &digest[..RELEASE_DIGEST_LEN];
        let mut prefix: String = name
            .chars()
            .take(MAX_RELEASE_NAME_LEN - RELEASE_DIGEST_LEN - 1)
            .collect();
        while prefix.ends_with('-') {
            prefix.pop();
        }
        Self(format!("{}-{}", prefix, suffix))
    }
}

/// Hex characters of the instance digest kept in shortened release names
const RELEASE_DIGEST_LEN: usize = 12;

fn dns_label(raw: &str) -> String {
    let mut label: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    while label.ends_with('-') {
        label.pop();
    }
    label
}

/// Kubernetes-style namespace.
///
/// The empty namespace scopes cluster-wide addons and charts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// Create a namespace
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The cluster-wide scope
    pub fn cluster_wide() -> Self {
        Self(String::new())
    }

    /// Whether this is the cluster-wide scope
    pub fn is_cluster_wide(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_cluster_wide() {
            f.write_str("<cluster-wide>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for Namespace {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Namespace {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_parse_rejects_empty() {
        assert!(InstanceId::parse("  ").is_err());
        assert_eq!(InstanceId::parse(" i-1 ").unwrap().as_str(), "i-1");
    }

    #[test]
    fn test_release_name_is_dns_friendly() {
        let name = ReleaseName::for_instance(
            &AddonName::from("Redis"),
            &PlanName::from("micro_plan"),
            &InstanceId::from("ABC"),
        );
        assert_eq!(name.as_str(), "hb-redis-micro-plan-abc");
    }

    #[test]
    fn test_release_name_truncated() {
        let name = ReleaseName::for_instance(
            &AddonName::from("a".repeat(40)),
            &PlanName::from("plan"),
            &InstanceId::from("0123456789"),
        );
        assert!(name.as_str().len() <= MAX_RELEASE_NAME_LEN);
        assert!(!name.as_str().ends_with('-'));
    }

    #[test]
    fn test_release_name_unique_for_long_ids() {
        let addon = AddonName::from("postgresql-ha");
        let plan = PlanName::from("enterprise");
        let first = ReleaseName::for_instance(
            &addon,
            &plan,
            &InstanceId::from("0b2f3c4d-aaaa-bbbb-cccc-000000000001"),
        );
        let second = ReleaseName::for_instance(
            &addon,
            &plan,
            &InstanceId::from("0b2f3c4d-aaaa-bbbb-cccc-000000000002"),
        );

        assert_ne!(first, second);
        for name in [&first, &second] {
            assert!(name.as_str().len() <= MAX_RELEASE_NAME_LEN);
            assert!(name.as_str().starts_with("hb-postgresql-ha-enterprise-"));
            assert!(name
                .as_str()
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
        assert_eq!(
            first,
            ReleaseName::for_instance(
                &addon,
                &plan,
                &InstanceId::from("0b2f3c4d-aaaa-bbbb-cccc-000000000001"),
            )
        );
    }

    #[test]
    fn test_cluster_wide_namespace() {
        assert!(Namespace::cluster_wide().is_cluster_wide());
        assert!(!Namespace::from("stage").is_cluster_wide());
        assert_eq!(Namespace::default(), Namespace::cluster_wide());
    }
}
