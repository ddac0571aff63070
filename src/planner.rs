//! FeatureView Planner (spec.md §4.3): plans a single feature group's
//! subquery selecting the latest row per entity as of a snapshot moment.

use chrono::{DateTime, Utc};

use crate::ast::{EntityFilter, FeatureViewSpec, PlannedView, SubqueryBody};
use crate::dialect::SqlDialect;
use crate::types::RANK_SENTINEL;

/// Picks a rank-column alias that doesn't collide with `taken`, starting
/// from the reserved rank sentinel and prepending `r` until it's unique
/// (spec.md §4.3).
fn choose_rank_alias(taken: &[String]) -> String {
    let mut alias = String::from(RANK_SENTINEL);
    while taken.iter().any(|c| c == &alias) {
        alias = format!("r{alias}");
    }
    alias
}

/// Plans one feature view's subquery. `entity_filter` restricts the
/// subquery to a concrete set of entity keys when present.
#[tracing::instrument(level = "debug", skip(dialect, spec), fields(group = %spec.group_name))]
pub fn plan_view(
    dialect: &dyn SqlDialect,
    spec: &FeatureViewSpec,
    alias: impl Into<String>,
    snapshot: DateTime<Utc>,
    entity_filter: Option<EntityFilter>,
) -> PlannedView {
    let alias = alias.into();
    let table = spec.group_name.clone();

    let Some(event_ts_col) = spec.event_timestamp_column.clone() else {
        tracing::debug!("no event-timestamp column, degrading to plain projection");
        let mut exposed_columns = spec.columns.clone();
        exposed_columns.push(spec.entity_column.clone());
        return PlannedView {
            alias,
            spec: spec.clone(),
            exposed_columns,
            rank_column: None,
            body: SubqueryBody::Plain {
                table,
                columns: spec.columns.clone(),
                entity_column: spec.entity_column.clone(),
                entity_filter,
            },
        };
    };

    let mut taken = spec.columns.clone();
    taken.push(spec.entity_column.clone());
    taken.push(event_ts_col.clone());
    if let Some(c) = &spec.create_timestamp_column {
        taken.push(c.clone());
    }

    if dialect.supports_window_rank() {
        let rank_alias = choose_rank_alias(&taken);
        tracing::debug!(strategy = "window_ranked", rank_alias = %rank_alias, "planned view");
        let mut exposed_columns = spec.columns.clone();
        exposed_columns.push(spec.entity_column.clone());
        exposed_columns.push(event_ts_col.clone());
        if let Some(c) = &spec.create_timestamp_column {
            exposed_columns.push(c.clone());
        }
        exposed_columns.push(rank_alias.clone());

        PlannedView {
            alias,
            spec: spec.clone(),
            exposed_columns,
            rank_column: Some(rank_alias.clone()),
            body: SubqueryBody::WindowRanked {
                table,
                columns: spec.columns.clone(),
                entity_column: spec.entity_column.clone(),
                event_timestamp_column: event_ts_col,
                create_timestamp_column: spec.create_timestamp_column.clone(),
                snapshot,
                entity_filter,
                rank_alias,
            },
        }
    } else {
        let agg_event_alias = choose_rank_alias(&taken);
        let agg_create_alias = spec
            .create_timestamp_column
            .as_ref()
            .map(|_| format!("{agg_event_alias}0"));
        tracing::debug!(strategy = "safe", "planned view");

        let mut exposed_columns = spec.columns.clone();
        exposed_columns.push(spec.entity_column.clone());
        exposed_columns.push(event_ts_col.clone());
        if let Some(c) = &spec.create_timestamp_column {
            exposed_columns.push(c.clone());
        }
        // no synthetic rank column exposed: the self-join already enforces top-1.

        PlannedView {
            alias,
            spec: spec.clone(),
            exposed_columns,
            rank_column: None,
            body: SubqueryBody::Safe {
                table,
                columns: spec.columns.clone(),
                entity_column: spec.entity_column.clone(),
                event_timestamp_column: event_ts_col,
                create_timestamp_column: spec.create_timestamp_column.clone(),
                snapshot,
                entity_filter,
                agg_event_alias,
                agg_create_alias,
            },
        }
    }
}
