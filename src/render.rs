//! The single rendering pass from query AST to dialect-specific SQL text
//! (spec.md §9 redesign note: "only the Driver renders"). Entity keys and
//! snapshot moments are always bound as parameters, never interpolated, so
//! no caller-controlled value can reach the SQL text directly.

use crate::ast::{BindValue, ComposedQuery, EntityFilter, JoinType, PlannedView, SubqueryBody};
use crate::dialect::SqlDialect;

/// Accumulates bind values and hands out placeholders in statement order.
struct Binder<'d> {
    dialect: &'d dyn SqlDialect,
    values: Vec<BindValue>,
}

impl<'d> Binder<'d> {
    fn new(dialect: &'d dyn SqlDialect) -> Self {
        Self {
            dialect,
            values: Vec::new(),
        }
    }

    fn bind(&mut self, value: BindValue) -> String {
        self.values.push(value);
        self.dialect.placeholder(self.values.len())
    }
}

fn render_entity_filter(binder: &mut Binder, entity_filter: &Option<EntityFilter>) -> Option<String> {
    entity_filter.as_ref().map(|f| {
        let dialect = binder.dialect;
        let placeholders: Vec<String> = f
            .keys
            .iter()
            .cloned()
            .map(|k| dialect.bind_cast(binder.bind(k), f.value_type))
            .collect();
        placeholders.join(", ")
    })
}

/// Renders one planned view's subquery body to `(SELECT ...)` text (without
/// the trailing `AS alias`).
fn render_subquery_body(dialect: &dyn SqlDialect, binder: &mut Binder, body: &SubqueryBody) -> String {
    let q = |s: &str| dialect.quote_ident(s);
    match body {
        SubqueryBody::Plain {
            table,
            columns,
            entity_column,
            entity_filter,
        } => {
            let mut select_cols: Vec<String> = columns.iter().map(|c| q(c)).collect();
            select_cols.push(q(entity_column));
            let in_list = render_entity_filter(binder, entity_filter);
            let mut sql = format!("SELECT {} FROM {}", select_cols.join(", "), q(table));
            if let Some(list) = in_list {
                sql.push_str(&format!(" WHERE {} IN ({})", q(entity_column), list));
            }
            format!("({sql})")
        }
        SubqueryBody::WindowRanked {
            table,
            columns,
            entity_column,
            event_timestamp_column,
            create_timestamp_column,
            snapshot,
            entity_filter,
            rank_alias,
        } => {
            let mut select_cols: Vec<String> = columns.iter().map(|c| q(c)).collect();
            select_cols.push(q(entity_column));
            select_cols.push(q(event_timestamp_column));
            if let Some(c) = create_timestamp_column {
                select_cols.push(q(c));
            }
            let mut order_cols = vec![event_timestamp_column.as_str()];
            if let Some(c) = create_timestamp_column {
                order_cols.push(c.as_str());
            }
            let rank_expr = dialect.render_rank_over(&order_cols, entity_column);
            select_cols.push(format!("{rank_expr} AS {}", q(rank_alias)));

            let snapshot_placeholder = binder.bind(BindValue::Timestamp(*snapshot));
            let mut sql = format!(
                "SELECT {} FROM {} WHERE {} <= {}",
                select_cols.join(", "),
                q(table),
                q(event_timestamp_column),
                snapshot_placeholder
            );
            if let Some(list) = render_entity_filter(binder, entity_filter) {
                sql.push_str(&format!(" AND {} IN ({})", q(entity_column), list));
            }
            format!("({sql})")
        }
        SubqueryBody::Safe {
            table,
            columns,
            entity_column,
            event_timestamp_column,
            create_timestamp_column,
            snapshot,
            entity_filter,
            agg_event_alias,
            agg_create_alias,
        } => {
            let base_alias = "b";
            let agg_alias = "g";

            let mut agg_select = vec![
                format!("{} AS {}", q(entity_column), q(entity_column)),
                format!("MAX({}) AS {}", q(event_timestamp_column), q(agg_event_alias)),
            ];
            if let (Some(create_col), Some(create_alias)) = (create_timestamp_column, agg_create_alias) {
                agg_select.push(format!("MAX({}) AS {}", q(create_col), q(create_alias)));
            }
            let snapshot_placeholder = binder.bind(BindValue::Timestamp(*snapshot));
            let mut agg_sql = format!(
                "SELECT {} FROM {} WHERE {} <= {} GROUP BY {}",
                agg_select.join(", "),
                q(table),
                q(event_timestamp_column),
                snapshot_placeholder,
                q(entity_column)
            );
            if let Some(list) = render_entity_filter(binder, entity_filter) {
                agg_sql.push_str(&format!(" AND {} IN ({})", q(entity_column), list));
            }

            let mut ts_pairs = vec![(event_timestamp_column.as_str(), agg_event_alias.as_str())];
            if let (Some(create_col), Some(create_alias)) = (create_timestamp_column, agg_create_alias) {
                ts_pairs.push((create_col.as_str(), create_alias.as_str()));
            }
            let join_condition =
                dialect.render_top1_per_partition_fallback(base_alias, agg_alias, entity_column, &ts_pairs);

            let mut select_cols: Vec<String> = columns.iter().map(|c| format!("{base_alias}.{}", q(c))).collect();
            select_cols.push(format!("{base_alias}.{}", q(entity_column)));
            select_cols.push(format!("{base_alias}.{}", q(event_timestamp_column)));
            if let Some(c) = create_timestamp_column {
                select_cols.push(format!("{base_alias}.{}", q(c)));
            }

            let sql = format!(
                "SELECT {} FROM {} AS {base_alias} JOIN ({agg_sql}) AS {agg_alias} ON {join_condition}",
                select_cols.join(", "),
                q(table),
            );
            format!("({sql})")
        }
    }
}

fn entity_column_ref(dialect: &dyn SqlDialect, view: &PlannedView) -> String {
    format!("{}.{}", dialect.quote_ident(&view.alias), dialect.quote_ident(&view.spec.entity_column))
}

/// Renders a fully composed query to `(sql, bind_values)`.
pub fn render(dialect: &dyn SqlDialect, composed: &ComposedQuery) -> (String, Vec<BindValue>) {
    let mut binder = Binder::new(dialect);
    let q = |s: &str| dialect.quote_ident(s);

    let subqueries: Vec<String> = composed
        .views
        .iter()
        .map(|v| format!("{} AS {}", render_subquery_body(dialect, &mut binder, &v.body), q(&v.alias)))
        .collect();

    // projection
    let mut select_cols = Vec::new();
    let entity_refs: Vec<String> = composed.views.iter().map(|v| entity_column_ref(dialect, v)).collect();
    if entity_refs.len() > 1 {
        select_cols.push(format!("COALESCE({}) AS {}", entity_refs.join(", "), q(&composed.base_entity_column)));
    } else {
        select_cols.push(format!("{} AS {}", entity_refs[0], q(&composed.base_entity_column)));
    }
    for view in &composed.views {
        for col in &view.spec.columns {
            select_cols.push(format!("{}.{}", q(&view.alias), q(col)));
        }
    }

    // join schedule
    let join_keyword = match composed.join_type {
        JoinType::Full => "FULL OUTER JOIN",
        JoinType::Left => "LEFT OUTER JOIN",
    };
    let mut from_clause = subqueries[0].clone();
    let mut prior_entity_refs: Vec<String> = vec![entity_refs[0].clone()];
    for (i, view) in composed.views.iter().enumerate().skip(1) {
        let this_entity_ref = &entity_refs[i];
        let left_side = if prior_entity_refs.len() > 1 {
            format!("COALESCE({})", prior_entity_refs.join(", "))
        } else {
            prior_entity_refs[0].clone()
        };
        from_clause.push_str(&format!(
            " {join_keyword} {} ON {} = {}",
            subqueries[i], left_side, this_entity_ref
        ));
        prior_entity_refs.push(this_entity_ref.clone());
        let _ = view;
    }

    // rank filters
    let mut where_clauses = Vec::new();
    for view in &composed.views {
        if let Some(rank_col) = &view.rank_column {
            let rank_ref = format!("{}.{}", q(&view.alias), q(rank_col));
            where_clauses.push(format!("({rank_ref} = 1 OR {rank_ref} IS NULL)"));
        }
    }

    let mut sql = format!("SELECT {} FROM {from_clause}", select_cols.join(", "));
    if !where_clauses.is_empty() {
        sql.push_str(&format!(" WHERE {}", where_clauses.join(" AND ")));
    }

    (sql, binder.values)
}
