//! FeatureGroup Composer (spec.md §4.4): combines per-view subqueries into
//! one composed query — coalesces entity columns, schedules joins, and
//! carries the rank filters forward for the rendering pass.

use crate::ast::{ComposedQuery, JoinType, PlannedView};
use crate::dialect::SqlDialect;
use crate::error::{PitError, Result};

/// Composes already-planned views into one [`ComposedQuery`]. `views` must
/// be non-empty and in request order; the first is the anchor (base) view.
pub fn compose(
    dialect: &dyn SqlDialect,
    views: Vec<PlannedView>,
    full_join: bool,
) -> Result<ComposedQuery> {
    let anchor = views
        .first()
        .ok_or_else(|| PitError::Other(anyhow::anyhow!("a feature group needs at least one view")))?;
    let base_entity_column = anchor.spec.entity_column.clone();

    let join_type = if full_join && dialect.supports_full_outer_join() {
        JoinType::Full
    } else {
        JoinType::Left
    };

    Ok(ComposedQuery {
        views,
        join_type,
        base_entity_column,
    })
}
