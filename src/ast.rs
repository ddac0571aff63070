//! Pure, immutable query AST. Per the redesign notes in spec.md §9, nothing
//! upstream of [`crate::render`] touches SQL text or a database connection:
//! the Planner builds [`PlannedView`]s, the Composer assembles them into a
//! [`ComposedQuery`], and only the rendering pass turns either into SQL.

use chrono::{DateTime, Utc};

use crate::types::ValueType;

/// A value bound into the rendered SQL as a parameter, never interpolated
/// as text, so entity keys and snapshot moments can never inject SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Str(String),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
}

/// The immutable input to the planner for a single feature group in a
/// request.
#[derive(Debug, Clone)]
pub struct FeatureViewSpec {
    pub group_name: String,
    /// Requested columns in user order, entity column deduplicated out
    /// (spec.md §4.3 edge case).
    pub columns: Vec<String>,
    pub entity_column: String,
    pub event_timestamp_column: Option<String>,
    pub create_timestamp_column: Option<String>,
}

/// Optional filter restricting a view's subquery to a concrete set of
/// entity keys.
#[derive(Debug, Clone)]
pub struct EntityFilter {
    pub keys: Vec<BindValue>,
    /// The entity's declared value type, when known (SPEC_FULL.md §3). Lets
    /// a dialect that needs explicit bind typing for an `IN (...)` list cast
    /// each placeholder; ignored by dialects that don't need it.
    pub value_type: Option<ValueType>,
}

/// The body of a single feature view's subquery, chosen by planning
/// strategy (spec.md §4.3).
#[derive(Debug, Clone)]
pub enum SubqueryBody {
    /// No event-timestamp column: a plain projection, optionally filtered
    /// to an entity-key list.
    Plain {
        table: String,
        columns: Vec<String>,
        entity_column: String,
        entity_filter: Option<EntityFilter>,
    },
    /// `RANK() OVER (PARTITION BY entity ORDER BY event_ts DESC [, create_ts
    /// DESC])`, filtered to `event_ts <= snapshot`.
    WindowRanked {
        table: String,
        columns: Vec<String>,
        entity_column: String,
        event_timestamp_column: String,
        create_timestamp_column: Option<String>,
        snapshot: DateTime<Utc>,
        entity_filter: Option<EntityFilter>,
        rank_alias: String,
    },
    /// `GROUP BY` + self-join fallback for dialects without window
    /// functions.
    Safe {
        table: String,
        columns: Vec<String>,
        entity_column: String,
        event_timestamp_column: String,
        create_timestamp_column: Option<String>,
        snapshot: DateTime<Utc>,
        entity_filter: Option<EntityFilter>,
        agg_event_alias: String,
        agg_create_alias: Option<String>,
    },
}

/// A planned, named subquery for one feature view plus the metadata the
/// Composer needs to join and filter it.
#[derive(Debug, Clone)]
pub struct PlannedView {
    pub alias: String,
    pub spec: FeatureViewSpec,
    /// Columns exposed by the subquery, in order: requested columns, then
    /// entity column, then timestamp/rank columns if present.
    pub exposed_columns: Vec<String>,
    pub rank_column: Option<String>,
    pub body: SubqueryBody,
}

/// How the Composer joins a view onto the running result (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Left,
    Full,
}

/// The fully composed, multi-view query, ready for rendering.
#[derive(Debug, Clone)]
pub struct ComposedQuery {
    /// Views in request order; the first is the anchor (base) view.
    pub views: Vec<PlannedView>,
    pub join_type: JoinType,
    /// Name the coalesced (or, for a single view, direct) entity column is
    /// projected under — the anchor view's entity-column name.
    pub base_entity_column: String,
}
