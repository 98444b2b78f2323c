//! Aggregator configuration: address-space identity and classifier tuning.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Address-space identity tagged onto every connection record.
///
/// Sourced from the embedding service's environment and treated as
/// opaque here, except as input to stable connection UUIDs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpaceContext {
    /// Address-space identifier.
    pub name: String,
    /// Namespace the address space lives in.
    pub namespace: String,
    /// Address-space type.
    pub kind: String,
}

/// Product and container names of the standard control-plane components.
const DEFAULT_INTERNAL_IDENTIFIERS: &[&str] = &[
    "address-space-controller",
    "standard-controller",
    "agent",
    "ragent",
    "qdconfigd",
    "subserv",
    "lwt-service",
    "standard-controller-healthcheck",
];

/// Identifiers of internal control-plane components.
///
/// A connection whose advertised `product` property or container name is
/// in this set carries control-plane traffic and is excluded from the
/// snapshot. The default set covers the standard components; deployments
/// running additional internal services can extend it.
#[derive(Debug, Clone)]
pub struct InternalIdentifiers {
    names: HashSet<String>,
}

impl Default for InternalIdentifiers {
    fn default() -> Self {
        DEFAULT_INTERNAL_IDENTIFIERS
            .iter()
            .map(|name| name.to_string())
            .collect()
    }
}

impl InternalIdentifiers {
    /// An empty set; no connection is classified internal by identifier.
    pub fn empty() -> Self {
        Self {
            names: HashSet::new(),
        }
    }

    /// Add an identifier to the set.
    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    /// Whether `name` identifies an internal component.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

impl FromIterator<String> for InternalIdentifiers {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a str> for InternalIdentifiers {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(str::to_owned).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_set_covers_standard_components() {
        let internal = InternalIdentifiers::default();
        assert!(internal.contains("agent"));
        assert!(internal.contains("ragent"));
        assert!(internal.contains("standard-controller-healthcheck"));
        assert!(!internal.contains("myapp"));
    }

    #[test]
    fn test_extension() {
        let mut internal = InternalIdentifiers::default();
        internal.insert("site-prober");
        assert!(internal.contains("site-prober"));
        assert!(internal.contains("agent"));
    }

    #[test]
    fn test_empty_set() {
        let internal = InternalIdentifiers::empty();
        assert!(!internal.contains("agent"));
    }
}
