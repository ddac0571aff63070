//! SQL Dialect Adapter: hides cross-database differences behind a small
//! trait (spec.md §4.2) so no other module in this crate contains a
//! dialect-specific string literal.

use crate::types::ValueType;

/// Capability bits and rendering hooks a backend must supply.
pub trait SqlDialect: Send + Sync {
    /// `RANK() OVER (...)` support. When false, the planner falls back to
    /// the `GROUP BY` + self-join "safe" strategy.
    fn supports_window_rank(&self) -> bool;

    /// `FULL OUTER JOIN` support. When false, the composer uses
    /// `LEFT OUTER JOIN` even if the caller asked for a full join.
    fn supports_full_outer_join(&self) -> bool;

    /// Upper bound on the number of literals in a single `IN (...)` list;
    /// the execution driver splits larger entity-key sets into batches of
    /// at most this many.
    fn max_in_list(&self) -> usize {
        1000
    }

    /// Quotes an identifier (table, column, or alias name) for this dialect.
    fn quote_ident(&self, name: &str) -> String;

    /// Renders the bind-parameter placeholder for the `index`-th (1-based)
    /// parameter in the statement. Postgres numbers placeholders; MySQL and
    /// SQLite use a positional `?`.
    fn placeholder(&self, index: usize) -> String {
        let _ = index;
        "?".to_string()
    }

    /// Wraps a rendered placeholder with an explicit type cast when this
    /// dialect's `IN (...)` bind path needs one (SPEC_FULL.md §3: SQLite's
    /// `Any`-typed bind path does; Postgres and MySQL infer the column type
    /// from context and don't). The default is a no-op.
    fn bind_cast(&self, placeholder: String, value_type: Option<ValueType>) -> String {
        let _ = value_type;
        placeholder
    }

    /// Renders a `RANK() OVER (PARTITION BY ... ORDER BY ... DESC [, ...])`
    /// window expression. `order_cols` is ordered event-timestamp first,
    /// then create-timestamp if present.
    fn render_rank_over(&self, order_cols: &[&str], partition_col: &str) -> String {
        let order_by = order_cols
            .iter()
            .map(|c| format!("{} DESC", self.quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "RANK() OVER (PARTITION BY {} ORDER BY {})",
            self.quote_ident(partition_col),
            order_by
        )
    }

    /// Renders the self-join condition used by the "safe" top-1-per-partition
    /// fallback: equality on the entity column plus equality on each
    /// aggregated timestamp column against its `MAX(...)` alias.
    fn render_top1_per_partition_fallback(
        &self,
        base_alias: &str,
        agg_alias: &str,
        entity_col: &str,
        ts_pairs: &[(&str, &str)],
    ) -> String {
        let mut conditions = vec![format!(
            "{}.{} = {}.{}",
            base_alias,
            self.quote_ident(entity_col),
            agg_alias,
            self.quote_ident(entity_col)
        )];
        for (ts_col, agg_col) in ts_pairs {
            conditions.push(format!(
                "{}.{} = {}.{}",
                base_alias,
                self.quote_ident(ts_col),
                agg_alias,
                self.quote_ident(agg_col)
            ));
        }
        conditions.join(" AND ")
    }
}

/// PostgreSQL: full capabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn supports_window_rank(&self) -> bool {
        true
    }

    fn supports_full_outer_join(&self) -> bool {
        true
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }
}

/// MySQL (8.0+): window functions but never `FULL OUTER JOIN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl SqlDialect for MySql {
    fn supports_window_rank(&self) -> bool {
        true
    }

    fn supports_full_outer_join(&self) -> bool {
        false
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// SQLite, pinned conservatively: no window functions, no
/// `FULL OUTER JOIN`, so every request uses the safe strategy and a
/// left-outer join schedule regardless of the caller's `full_join` request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn supports_window_rank(&self) -> bool {
        false
    }

    fn supports_full_outer_join(&self) -> bool {
        false
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn bind_cast(&self, placeholder: String, value_type: Option<ValueType>) -> String {
        match value_type {
            Some(vt) => format!("CAST({placeholder} AS {})", sqlite_type_name(vt)),
            None => placeholder,
        }
    }
}

/// SQLite storage-class name for a declared [`ValueType`], used only by
/// [`Sqlite::bind_cast`]. Timestamps are cast to `TEXT` because this crate
/// binds them as RFC3339 strings (see `tests/common/mod.rs`), not SQLite's
/// native (absent) datetime type.
fn sqlite_type_name(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::Str => "TEXT",
        ValueType::Int => "INTEGER",
        ValueType::Float => "REAL",
        ValueType::Timestamp => "TEXT",
    }
}
