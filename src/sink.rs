//! Output sink contract (spec.md §6) and the suffix-disambiguation rule
//! used when merging backend output back onto an entity dataframe
//! (spec.md §4.5, §9).

use std::io::Write;

use comfy_table::{presets::ASCII_MARKDOWN, Table};

use crate::error::{PitError, Result};

/// An append-only byte sink. The execution driver writes CSV rows to it;
/// the first write includes a header row unless `force_append` is set.
pub trait Sink: Write + Send {}
impl<T: Write + Send> Sink for T {}

/// A row of string-rendered cell values with their column names, the shape
/// the execution driver hands to both the CSV writer and the markdown
/// preview renderer.
#[derive(Debug, Clone)]
pub struct RowBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Writes a batch as CSV, emitting a header row only when `header` is true.
pub fn write_csv_batch(sink: &mut dyn Sink, batch: &RowBatch, header: bool) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(sink);
    if header {
        writer
            .write_record(&batch.columns)
            .map_err(|e| PitError::Other(e.into()))?;
    }
    for row in &batch.rows {
        writer.write_record(row).map_err(|e| PitError::Other(e.into()))?;
    }
    writer.flush().map_err(|e| PitError::Other(e.into()))?;
    Ok(())
}

/// Renders a batch as a markdown (pipe-table) preview, the `export`
/// return-value contract from spec.md §6.
pub fn render_markdown_preview(batch: &RowBatch) -> String {
    let mut table = Table::new();
    table.load_preset(ASCII_MARKDOWN);
    table.set_header(batch.columns.clone());
    for row in &batch.rows {
        table.add_row(row.clone());
    }
    table.to_string()
}

/// Computes the shortest suffix not already appearing as the tail of any
/// name in `existing`, generalizing the Python original's literal
/// `_y`, `_y_y`, … repetition (spec.md §9 redesign note).
pub fn shortest_unused_suffix(existing: &[String]) -> String {
    let mut suffix = String::from("_y");
    while existing.iter().any(|name| name.ends_with(&suffix)) {
        suffix = format!("_{suffix}");
    }
    suffix
}
