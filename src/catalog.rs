//! Catalog View: a read-only lookup of feature-group metadata (spec.md §4.1).

use std::collections::HashMap;

use crate::error::{PitError, Result};
use crate::types::ValueType;

/// The subset of a `FeatureGroupSpec` the planner actually needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMeta {
    pub entity_column: String,
    pub event_timestamp_column: Option<String>,
    pub create_timestamp_column: Option<String>,
    /// The entity's declared value type, when known. Threaded through to the
    /// rendered `IN (...)` list so a dialect that needs explicit bind typing
    /// (SPEC_FULL.md §3) can cast each placeholder; dialects that don't need
    /// it (Postgres) ignore it.
    pub entity_value_type: Option<ValueType>,
}

/// Read-only, side-effect-free group metadata lookup. `Send + Sync` so a
/// caller can share one instance across concurrently running requests
/// behind an `Arc` (spec.md §5).
pub trait CatalogView: Send + Sync {
    fn get_group(&self, name: &str) -> Result<GroupMeta>;
}

/// An in-memory `CatalogView` backed by a map, suitable for tests and for
/// small repos. Production deployments typically construct this from a
/// parsed catalog file elsewhere and hand it to the planner as a
/// `dyn CatalogView`.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    groups: HashMap<String, GroupMeta>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, name: impl Into<String>, meta: GroupMeta) -> Self {
        self.groups.insert(name.into(), meta);
        self
    }
}

impl CatalogView for Catalog {
    fn get_group(&self, name: &str) -> Result<GroupMeta> {
        self.groups
            .get(name)
            .cloned()
            .ok_or_else(|| PitError::UnknownGroup(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_group_fails() {
        let catalog = Catalog::new();
        let err = catalog.get_group("missing").unwrap_err();
        assert!(matches!(err, PitError::UnknownGroup(name) if name == "missing"));
    }

    #[test]
    fn known_group_resolves() {
        let catalog = Catalog::new().with_group(
            "orders",
            GroupMeta {
                entity_column: "user_id".into(),
                event_timestamp_column: Some("event_ts".into()),
                create_timestamp_column: None,
                entity_value_type: None,
            },
        );
        let meta = catalog.get_group("orders").unwrap();
        assert_eq!(meta.entity_column, "user_id");
    }
}
