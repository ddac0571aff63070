//! Execution Driver (spec.md §4.5): binds the composed query to a
//! connection, streams rows in chunks, and optionally performs a
//! client-side entity-dataframe join, splitting large entity lists into
//! batches that respect the dialect's `IN`-list cap.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use sqlx::any::{AnyArguments, AnyPool, AnyRow};
use sqlx::{Arguments, Column, Row};
use tokio_util::sync::CancellationToken;

use crate::ast::{BindValue, ComposedQuery, EntityFilter, FeatureViewSpec, PlannedView};
use crate::catalog::CatalogView;
use crate::composer::compose;
use crate::dialect::SqlDialect;
use crate::error::{PitError, Result};
use crate::planner::plan_view;
use crate::render::render;
use crate::sink::{render_markdown_preview, write_csv_batch, RowBatch, Sink};
use crate::types::FeatureRef;

/// A caller-supplied table of entity keys (and, for Mode B, event
/// timestamps) to join feature values onto. The in-memory analogue of the
/// Python original's `entity_df` parameter.
#[derive(Debug, Clone, Default)]
pub struct EntityFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<BindValue>>,
}

impl EntityFrame {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn column_values(&self, name: &str) -> Vec<BindValue> {
        let idx = self
            .column_index(name)
            .expect("entity frame is missing the requested column");
        self.rows.iter().map(|r| r[idx].clone()).collect()
    }

    fn slice(&self, indices: &[usize]) -> EntityFrame {
        EntityFrame {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

/// Options for [`Driver::export`], with the defaults documented in
/// spec.md §4.5/§9 (a builder replaces the Python original's positional and
/// keyword-mixed call site).
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub snapshot: Option<DateTime<Utc>>,
    pub entity_list: Option<Vec<BindValue>>,
    pub chunk_size: usize,
    pub force_fetch_all: bool,
    pub force_append: bool,
    pub full_join: bool,
}

impl ExportOptions {
    pub fn new() -> Self {
        Self {
            chunk_size: 10_000,
            ..Default::default()
        }
    }
}

/// Options for [`Driver::join`]. `chunk_size` bounds how many rows
/// [`Driver::stream_query`] buffers per backend batch within each entity-key
/// chunk (mirrors [`ExportOptions::chunk_size`]); it does not change the
/// entity-key batching driven by the dialect's `max_in_list`.
#[derive(Debug, Clone)]
pub struct JoinOptions {
    pub entity_column: String,
    pub event_timestamp_column: Option<String>,
    pub snapshot: Option<DateTime<Utc>>,
    pub chunk_size: usize,
    pub force_fetch_all: bool,
}

impl JoinOptions {
    pub fn new(entity_column: impl Into<String>) -> Self {
        Self {
            entity_column: entity_column.into(),
            event_timestamp_column: None,
            snapshot: None,
            chunk_size: 10_000,
            force_fetch_all: false,
        }
    }
}

/// Binds the request's feature list to the catalog and plans one
/// [`ComposedQuery`] — the Rust analogue of the Python original's
/// `FeatureStore.get_feature_group` followed by `FeatureGroup.build_query`.
fn plan_request(
    catalog: &dyn CatalogView,
    dialect: &dyn SqlDialect,
    refs: &[FeatureRef],
    snapshot: DateTime<Utc>,
    entity_filter: Option<EntityFilter>,
    full_join: bool,
) -> Result<ComposedQuery> {
    let mut table_order: Vec<String> = Vec::new();
    let mut table_columns: HashMap<String, Vec<String>> = HashMap::new();
    for r in refs {
        if !table_columns.contains_key(&r.group_name) {
            table_order.push(r.group_name.clone());
        }
        table_columns
            .entry(r.group_name.clone())
            .or_default()
            .push(r.column_name.clone());
    }

    let mut planned = Vec::with_capacity(table_order.len());
    for (i, group_name) in table_order.iter().enumerate() {
        let meta = catalog.get_group(group_name)?;
        let requested = table_columns.remove(group_name).unwrap_or_default();
        // spec.md §4.3 edge case: a request column equal to the entity
        // column is deduplicated — the entity is always projected anyway.
        let columns: Vec<String> = requested.into_iter().filter(|c| c != &meta.entity_column).collect();
        let spec = FeatureViewSpec {
            group_name: group_name.clone(),
            columns,
            entity_column: meta.entity_column,
            event_timestamp_column: meta.event_timestamp_column,
            create_timestamp_column: meta.create_timestamp_column,
        };
        let alias = format!("v{i}");
        // Carry the entity's own declared value type into this group's
        // filter, not the filter's (non-existent) own one — the caller-
        // supplied entity_filter has no type until a group tells it.
        let view_entity_filter = entity_filter.clone().map(|mut f| {
            f.value_type = meta.entity_value_type;
            f
        });
        planned.push(plan_view(dialect, &spec, alias, snapshot, view_entity_filter));
    }

    compose(dialect, planned, full_join)
}

fn bind_all<'q>(sql: &'q str, binds: &'q [BindValue]) -> sqlx::query::Query<'q, sqlx::Any, AnyArguments<'q>> {
    let mut args = AnyArguments::default();
    for v in binds {
        match v {
            BindValue::Str(s) => args.add(s).expect("bind string"),
            BindValue::Int(i) => args.add(i).expect("bind int"),
            BindValue::Float(f) => args.add(f).expect("bind float"),
            BindValue::Timestamp(ts) => args.add(ts).expect("bind timestamp"),
        }
    }
    sqlx::query_with(sql, args)
}

fn row_to_strings(row: &AnyRow) -> Vec<String> {
    (0..row.columns().len())
        .map(|i| {
            row.try_get::<String, _>(i)
                .or_else(|_| row.try_get::<i64, _>(i).map(|v| v.to_string()))
                .or_else(|_| row.try_get::<f64, _>(i).map(|v| v.to_string()))
                .or_else(|_| {
                    row.try_get::<DateTime<Utc>, _>(i)
                        .map(|v| v.to_rfc3339())
                })
                .unwrap_or_default()
        })
        .collect()
}

fn row_columns(row: &AnyRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

/// Binds a composed query to a connection and streams results.
pub struct Driver<'c> {
    pool: &'c AnyPool,
    catalog: Arc<dyn CatalogView>,
    dialect: Arc<dyn SqlDialect>,
}

impl<'c> Driver<'c> {
    pub fn new(pool: &'c AnyPool, catalog: Arc<dyn CatalogView>, dialect: Arc<dyn SqlDialect>) -> Self {
        Self {
            pool,
            catalog,
            dialect,
        }
    }

    /// Runs `sql`/`binds`, reads results in batches of `chunk_size`, invoking
    /// `on_batch` for each. `on_batch` returns `Ok(false)` to stop reading
    /// early (the cursor is still released) or `Err(_)` to abort — a sink
    /// write failure surfaces this way rather than being swallowed (spec.md
    /// §7: resource errors surface after the open resource is released).
    /// Releases the cursor on every exit path, including cancellation and
    /// error.
    async fn stream_query(
        &self,
        sql: &str,
        binds: &[BindValue],
        chunk_size: usize,
        cancel: Option<&CancellationToken>,
        mut on_batch: impl FnMut(RowBatch) -> Result<bool>,
    ) -> Result<usize> {
        let query = bind_all(sql, binds);
        let mut stream = query.fetch(self.pool);
        let mut columns: Option<Vec<String>> = None;
        let mut buffered: Vec<Vec<String>> = Vec::with_capacity(chunk_size);
        let mut batches_emitted = 0usize;

        let result: Result<()> = loop {
            if let Some(token) = cancel {
                if token.is_cancelled() {
                    break Err(PitError::Cancelled);
                }
            }
            match stream.next().await {
                Some(Ok(row)) => {
                    if columns.is_none() {
                        columns = Some(row_columns(&row));
                    }
                    buffered.push(row_to_strings(&row));
                    if buffered.len() >= chunk_size {
                        batches_emitted += 1;
                        match on_batch(RowBatch {
                            columns: columns.clone().unwrap_or_default(),
                            rows: std::mem::take(&mut buffered),
                        }) {
                            Ok(true) => {}
                            Ok(false) => break Ok(()),
                            Err(e) => break Err(e),
                        }
                    }
                }
                Some(Err(e)) => {
                    break Err(PitError::BackendFailure {
                        sql: sql.to_string(),
                        source: e.into(),
                    });
                }
                None => break Ok(()),
            }
        };
        drop(stream);
        result?;
        if !buffered.is_empty() {
            batches_emitted += 1;
            on_batch(RowBatch {
                columns: columns.unwrap_or_default(),
                rows: buffered,
            })?;
        }
        Ok(batches_emitted)
    }

    /// `export(features, snapshot?, output_sink?, chunk_size, ...)`
    /// (spec.md §4.5). Without a sink and without `force_fetch_all`, only
    /// the first batch is ever read from the cursor — the same short-circuit
    /// the Python original took when no `output_file` was given.
    pub async fn export(
        &self,
        features: &[FeatureRef],
        mut sink: Option<&mut dyn Sink>,
        options: ExportOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<String> {
        let snapshot = options.snapshot.unwrap_or_else(Utc::now);
        let entity_filter = options
            .entity_list
            .clone()
            .map(|keys| EntityFilter { keys, value_type: None });
        let composed = plan_request(
            self.catalog.as_ref(),
            self.dialect.as_ref(),
            features,
            snapshot,
            entity_filter,
            options.full_join,
        )?;
        let (sql, binds) = render(self.dialect.as_ref(), &composed);
        tracing::info!(sql = %sql, "export query");

        let mut preview = RowBatch {
            columns: Vec::new(),
            rows: Vec::new(),
        };
        let mut preview_taken = false;
        let mut header_needed = !options.force_append;

        self.stream_query(&sql, &binds, options.chunk_size, cancel, |batch| {
            if !preview_taken {
                preview = batch.clone();
                preview_taken = true;
            } else if options.force_fetch_all {
                preview.rows.extend(batch.rows.clone());
            }
            if let Some(s) = sink.as_deref_mut() {
                write_csv_batch(s, &batch, header_needed)?;
                header_needed = false;
                Ok(true)
            } else {
                Ok(options.force_fetch_all)
            }
        })
        .await?;

        if preview_taken {
            Ok(render_markdown_preview(&preview))
        } else {
            Ok(String::new())
        }
    }

    /// `join(entity_dataset, ...)` (spec.md §4.5). Mode A (snapshot-pinned)
    /// when `options.snapshot` is set or there is no event-timestamp
    /// column; Mode B (per-row point-in-time) otherwise. `output_sink`, when
    /// given, receives every chunk's rows as CSV (one header, written once
    /// across the whole call) and is an alternative to `force_fetch_all` for
    /// avoiding `UnboundedSpillRequired` — mirroring the original's
    /// `output_file` escape valve. Regardless of the sink, the returned
    /// `EntityFrame` always carries the full merged dataset (spec.md §4.5's
    /// return-value contract).
    pub async fn join(
        &self,
        entity_frame: &EntityFrame,
        features: &[FeatureRef],
        mut output_sink: Option<&mut dyn Sink>,
        options: JoinOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<EntityFrame> {
        let force_fetch_all = options.force_fetch_all || entity_frame.rows.len() <= 1000;
        let max_in_list = self.dialect.max_in_list();
        let batch_cap = max_in_list.saturating_sub(1).max(1);
        let chunk_size = options.chunk_size.max(1);
        let mut header_needed = true;

        if options.snapshot.is_some() || options.event_timestamp_column.is_none() {
            let snapshot = options.snapshot.unwrap_or_else(Utc::now);
            let all_indices: Vec<usize> = (0..entity_frame.rows.len()).collect();
            self.join_chunks(
                entity_frame,
                &all_indices,
                &options.entity_column,
                snapshot,
                features,
                batch_cap,
                chunk_size,
                force_fetch_all,
                output_sink.as_deref_mut(),
                &mut header_needed,
                cancel,
            )
            .await
        } else {
            let ts_col = options.event_timestamp_column.clone().unwrap();
            let groups = group_indices_by(entity_frame, &options.entity_column, &ts_col);
            let mut merged = EntityFrame::default();
            for (snapshot, indices) in groups {
                let joined = self
                    .join_chunks(
                        entity_frame,
                        &indices,
                        &options.entity_column,
                        snapshot,
                        features,
                        batch_cap,
                        chunk_size,
                        force_fetch_all,
                        output_sink.as_deref_mut(),
                        &mut header_needed,
                        cancel,
                    )
                    .await?;
                if merged.columns.is_empty() {
                    merged.columns = joined.columns.clone();
                }
                merged.rows.extend(joined.rows);
            }
            Ok(merged)
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn join_chunks(
        &self,
        entity_frame: &EntityFrame,
        indices: &[usize],
        entity_column: &str,
        snapshot: DateTime<Utc>,
        features: &[FeatureRef],
        batch_cap: usize,
        chunk_size: usize,
        force_fetch_all: bool,
        mut sink: Option<&mut dyn Sink>,
        header_needed: &mut bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<EntityFrame> {
        let mut merged = EntityFrame {
            columns: entity_frame.columns.clone(),
            rows: Vec::new(),
        };
        // Output schema (right-side feature columns and their disambiguated
        // names) is fixed by the feature request and the entity frame's own
        // columns — never by whether a given chunk's query happened to match
        // any rows, which may be empty for some chunks but not others.
        let mut feature_columns: Option<Vec<String>> = None;
        let mut keep_mask: Option<Vec<bool>> = None;

        // spec.md §4.5/§8 "Batch safety": it's the number of entity-key
        // chunks (and therefore backend queries) this call requires, not
        // any one chunk's internal row-streaming batch count, that decides
        // whether the result would spill unboundedly without a sink or
        // `force_fetch_all`.
        if indices.chunks(batch_cap).count() > 1 && !force_fetch_all && sink.is_none() {
            return Err(PitError::UnboundedSpillRequired);
        }

        for chunk in indices.chunks(batch_cap) {
            let sub_frame = entity_frame.slice(chunk);
            let keys = sub_frame.column_values(entity_column);
            // value_type is filled in per-group by plan_request from the
            // catalog, not known here.
            let entity_filter = EntityFilter { keys, value_type: None };

            let composed = plan_request(
                self.catalog.as_ref(),
                self.dialect.as_ref(),
                features,
                snapshot,
                Some(entity_filter),
                false,
            )?;
            let requested_columns: Vec<String> = composed
                .views
                .iter()
                .flat_map(|v| v.spec.columns.clone())
                .collect();
            let (sql, binds) = render(self.dialect.as_ref(), &composed);
            tracing::info!(sql = %sql, "join query");

            let feature_columns = feature_columns.get_or_insert_with(|| requested_columns.clone());
            // Mirrors the original's `suffixes=(None, right_suffix)` merge
            // followed by `keep_cols = [x for x in columns if not
            // x.endswith(right_suffix)]`: a feature column colliding with an
            // entity-frame column is suffixed only to detect the collision,
            // then dropped outright — the entity frame's own column is the
            // one that survives.
            let keep_mask = keep_mask.get_or_insert_with(|| {
                feature_columns
                    .iter()
                    .map(|c| !entity_frame.columns.contains(c))
                    .collect::<Vec<bool>>()
            });
            if merged.columns.len() == entity_frame.columns.len() {
                merged.columns.extend(
                    feature_columns
                        .iter()
                        .zip(keep_mask.iter())
                        .filter(|(_, keep)| **keep)
                        .map(|(c, _)| c.clone()),
                );
            }

            let mut batch_rows: Vec<Vec<String>> = Vec::new();
            let mut right_columns: Vec<String> = Vec::new();
            self.stream_query(&sql, &binds, chunk_size, cancel, |batch| {
                right_columns = batch.columns.clone();
                batch_rows.extend(batch.rows);
                Ok(true)
            })
            .await?;

            // The composed query always projects the (coalesced) entity
            // column first, then each view's requested columns in order.
            let right_entity_idx = 0usize;
            let right_feature_idx: Vec<Option<usize>> = requested_columns
                .iter()
                .map(|c| right_columns.iter().position(|rc| rc == c))
                .collect();

            let left_key_idx = sub_frame
                .column_index(entity_column)
                .expect("entity column missing from entity frame");

            let mut chunk_rows: Vec<Vec<BindValue>> = Vec::with_capacity(sub_frame.rows.len());
            for left_row in &sub_frame.rows {
                let left_key = string_of(&left_row[left_key_idx]);
                let match_row = batch_rows.iter().find(|r| {
                    r.get(right_entity_idx).cloned().unwrap_or_default() == left_key
                });
                let mut out_row: Vec<BindValue> = left_row.clone();
                for (idx, keep) in right_feature_idx.iter().zip(keep_mask.iter()) {
                    if !*keep {
                        continue;
                    }
                    let value = idx
                        .and_then(|i| match_row.and_then(|r| r.get(i).cloned()))
                        .unwrap_or_default();
                    out_row.push(BindValue::Str(value));
                }
                chunk_rows.push(out_row);
            }

            if let Some(s) = sink.as_deref_mut() {
                let row_batch = RowBatch {
                    columns: merged.columns.clone(),
                    rows: chunk_rows.iter().map(|r| r.iter().map(string_of).collect()).collect(),
                };
                write_csv_batch(s, &row_batch, *header_needed)?;
                *header_needed = false;
            }
            merged.rows.extend(chunk_rows);
        }

        Ok(merged)
    }
}

fn string_of(v: &BindValue) -> String {
    match v {
        BindValue::Str(s) => s.clone(),
        BindValue::Int(i) => i.to_string(),
        BindValue::Float(f) => f.to_string(),
        BindValue::Timestamp(t) => t.to_rfc3339(),
    }
}

/// Groups entity-frame row indices by `(entity_column, event_timestamp_column)`
/// for Mode B, returning each group's snapshot moment and member indices.
fn group_indices_by(
    frame: &EntityFrame,
    entity_column: &str,
    ts_column: &str,
) -> Vec<(DateTime<Utc>, Vec<usize>)> {
    let entity_idx = frame.column_index(entity_column).expect("missing entity column");
    let ts_idx = frame.column_index(ts_column).expect("missing timestamp column");
    let mut order: Vec<(String, DateTime<Utc>)> = Vec::new();
    let mut groups: HashMap<(String, DateTime<Utc>), Vec<usize>> = HashMap::new();

    for (i, row) in frame.rows.iter().enumerate() {
        let key_str = string_of(&row[entity_idx]);
        let ts = match &row[ts_idx] {
            BindValue::Timestamp(t) => *t,
            other => panic!("event timestamp column must hold timestamps, got {other:?}"),
        };
        let key = (key_str, ts);
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(i);
    }

    order
        .into_iter()
        .map(|(entity, ts)| (ts, groups.remove(&(entity, ts)).unwrap_or_default()))
        .collect()
}
