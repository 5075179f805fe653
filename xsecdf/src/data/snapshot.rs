extern crate rusqlite;

use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use tracing::{info, warn};

use crate::data::frame::{Column, Columns, LazyFrame};
use crate::error::{Error, Result};
use crate::hub::entry::SampleEntry;

pub const DEFAULT_COLUMNS: [&str; 5] = ["run", "sub", "evt", "w_nominal", "analysis_channels"];

#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    pub outdir: PathBuf,
    pub outfile: String,
    pub table: String,
    /// Columns to write; empty means [`DEFAULT_COLUMNS`].
    pub columns: Vec<String>,
    pub include_variations: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        SnapshotOptions {
            outdir: PathBuf::from("snapshots"),
            outfile: "all_samples.db".to_string(),
            table: "analysis".to_string(),
            columns: Vec::new(),
            include_variations: false,
        }
    }
}

impl SnapshotOptions {
    pub fn path(&self) -> PathBuf {
        self.outdir.join(&self.outfile)
    }

    fn requested(&self) -> Vec<String> {
        if self.columns.is_empty() {
            DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect()
        } else {
            self.columns.clone()
        }
    }
}

/// Replace every character outside `[A-Za-z0-9-_.]` with `_`.
pub fn sanitise(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

pub fn table_name(base: &str, sample_label: &str, variation: Option<&str>) -> String {
    let mut name = format!("{}_{}", sanitise(base), sanitise(sample_label));
    if let Some(tag) = variation {
        name.push_str("__");
        name.push_str(&sanitise(tag));
    }
    name
}

fn sql_type(column: &Column) -> &'static str {
    match column {
        Column::Bool(_) | Column::Int(_) => "INTEGER",
        Column::Float(_) => "REAL",
        Column::FloatVec(_) => "TEXT",
    }
}

fn sql_value(column: &Column, row: usize) -> Result<SqlValue> {
    Ok(match column {
        Column::Bool(v) => SqlValue::Integer(i64::from(v[row])),
        Column::Int(v) => SqlValue::Integer(v[row]),
        Column::Float(v) if v[row].is_nan() => SqlValue::Null,
        Column::Float(v) => SqlValue::Real(v[row]),
        Column::FloatVec(v) => SqlValue::Text(serde_json::to_string(&v[row])?),
    })
}

/// Write `table` into the database at `path`, creating the file if absent.
/// An existing table of the same name is replaced; other tables are kept.
pub fn write_table(path: &Path, name: &str, table: &Columns) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut conn = Connection::open(path)?;
    let tx = conn.transaction()?;

    let schema = table.iter().map(|(col, c)| format!("\"{}\" {}", col, sql_type(c))).join(", ");
    tx.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\"; CREATE TABLE \"{}\" ({});", name, name, schema))?;

    {
        let placeholders = (1..=table.names().len()).map(|i| format!("?{}", i)).join(", ");
        let mut stmt = tx.prepare(&format!("INSERT INTO \"{}\" VALUES ({})", name, placeholders))?;
        for row in 0..table.num_rows() {
            let values: Vec<SqlValue> = table.iter().map(|(_, c)| sql_value(c, row)).collect::<Result<_>>()?;
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Materialise the requested columns a frame actually has and write them.
/// Returns the number of rows written.
pub fn snapshot_frame(frame: &LazyFrame, options: &SnapshotOptions, name: &str) -> Result<usize> {
    let requested = options.requested();
    let present: Vec<&str> = requested.iter().map(String::as_str).filter(|c| frame.has_column(c)).collect();
    if present.is_empty() {
        return Err(Error::MissingColumn(requested.join(", ")));
    }
    let table = frame.collect(&present)?;
    let path = options.path();
    write_table(&path, name, &table)?;
    info!(path = %path.display(), table = name, rows = table.num_rows(), columns = present.len(), "snapshot written");
    Ok(table.num_rows())
}

/// One table per entry (and per detector variation when requested).
///
/// Returns the written table names in order.
pub fn write_snapshots(entries: &[&SampleEntry], options: &SnapshotOptions) -> Result<Vec<String>> {
    let mut written = Vec::new();
    for entry in entries {
        let name = table_name(&options.table, entry.label(), None);
        if written.contains(&name) {
            warn!(table = %name, sample = %entry.context(), "snapshot table written twice, keeping the last sample");
        }
        snapshot_frame(entry.frame(), options, &name).map_err(|e| e.in_sample(entry.context()))?;
        written.push(name);

        if options.include_variations {
            for tag in entry.variation_tags() {
                let name = table_name(&options.table, entry.label(), Some(tag));
                if let Some(frame) = entry.variation(tag) {
                    snapshot_frame(frame, options, &name).map_err(|e| e.in_sample(entry.context()))?;
                    written.push(name);
                }
            }
        }
    }
    Ok(written)
}
