//! Catalog data model: entities, features, and feature groups.
//!
//! These types describe the read-only catalog the planner and composer
//! consume (spec'd in terms of a `CatalogView`, see [`crate::catalog`]).
//! Parsing a catalog file into these types is out of scope for this crate;
//! a loader elsewhere is expected to construct them.

/// A declared column/feature value type, carried through to the dialect
/// adapter so it (not any host-language type) decides the backend SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Str,
    Int,
    Float,
    Timestamp,
}

/// A logical key space, e.g. `user` or `device`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySpec {
    pub name: String,
    pub value_type: Option<ValueType>,
}

/// A single feature exposed by a [`FeatureGroupSpec`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpec {
    pub name: String,
    pub value_type: ValueType,
    pub description: Option<String>,
}

/// A named table-like collection of features sharing an entity key and,
/// optionally, an event-time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureGroupSpec {
    pub name: String,
    pub entity: String,
    pub features: Vec<FeatureSpec>,
    pub event_timestamp_column: Option<String>,
    pub create_timestamp_column: Option<String>,
}

impl FeatureGroupSpec {
    /// `create_timestamp_column` is only meaningful alongside an event
    /// timestamp; enforce the catalog invariant from spec.md §3.
    pub fn is_valid(&self) -> bool {
        self.create_timestamp_column.is_none() || self.event_timestamp_column.is_some()
    }
}

/// The starting rank-column alias the planner reaches for (spec.md §4.3's
/// `choose_rank_alias`, `src/planner.rs`). Reserved: a [`FeatureRef`] whose
/// `column_name` equals this sentinel is rejected at request-parsing time
/// (spec.md §3), not silently renamed around.
pub const RANK_SENTINEL: &str = "rnk";

/// A dotted `group.column` reference from a feature request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRef {
    pub group_name: String,
    pub column_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_spec_requires_event_column_for_create_column() {
        let spec = FeatureGroupSpec {
            name: "orders".into(),
            entity: "user".into(),
            features: vec![],
            event_timestamp_column: None,
            create_timestamp_column: Some("inserted_at".into()),
        };
        assert!(!spec.is_valid());
    }

    #[test]
    fn group_spec_with_no_timestamps_is_valid() {
        let spec = FeatureGroupSpec {
            name: "orders".into(),
            entity: "user".into(),
            features: vec![],
            event_timestamp_column: None,
            create_timestamp_column: None,
        };
        assert!(spec.is_valid());
    }
}
