extern crate rusqlite;

use std::path::{Path, PathBuf};

use itertools::Itertools;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use crate::data::frame::{Column, Columns};
use crate::error::{Error, Result};

/// Table holding one row per event in every backing file.
pub const EVENT_TABLE: &str = "events";

/// Where the raw event columns of a frame come from.
pub trait EventSource: Send + Sync {
    /// Short human-readable description (file list, label, ...).
    fn describe(&self) -> String;
    /// Raw column names, without reading any rows.
    fn column_names(&self) -> Result<Vec<String>>;
    /// Every raw row.
    fn load(&self) -> Result<Columns>;
}

/// Event table spread over one or more SQLite files.
///
/// Files are read in the given order and concatenated. INTEGER columns
/// become integer columns, REAL columns float columns and TEXT columns
/// hold JSON arrays of numbers (one vector per event).
#[derive(Debug, Clone)]
pub struct SqliteSource {
    pub files: Vec<PathBuf>,
    pub table: String,
}

impl SqliteSource {
    pub fn new(files: Vec<PathBuf>) -> Self {
        SqliteSource { files, table: EVENT_TABLE.to_string() }
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    fn open(path: &Path) -> Result<Connection> {
        if !path.is_file() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("backing file {} not found", path.display()),
            )));
        }
        Ok(Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?)
    }

    /// Column names and declared types, in table order.
    fn table_schema(&self, conn: &Connection, path: &Path) -> Result<Vec<(String, String)>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", self.table))?;
        let schema: Vec<(String, String)> =
            stmt.query_map([], |row| Ok((row.get(1)?, row.get(2)?)))?.collect::<rusqlite::Result<_>>()?;
        if schema.is_empty() {
            return Err(Error::Source {
                path: path.display().to_string(),
                message: format!("no table '{}'", self.table),
            });
        }
        Ok(schema)
    }

    fn read_file(&self, path: &Path) -> Result<Columns> {
        let conn = Self::open(path)?;
        let schema = self.table_schema(&conn, path)?;
        let select = schema.iter().map(|(name, _)| format!("\"{}\"", name)).join(", ");
        let mut stmt = conn.prepare(&format!("SELECT {} FROM \"{}\"", select, self.table))?;

        let mut raw: Vec<Vec<SqlValue>> = vec![Vec::new(); schema.len()];
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (i, values) in raw.iter_mut().enumerate() {
                values.push(row.get::<_, SqlValue>(i)?);
            }
        }

        let mut table = Columns::new();
        for ((name, decl), values) in schema.iter().zip(raw) {
            let column = convert_column(values, ColumnKind::declared(decl)).map_err(|message| Error::Source {
                path: path.display().to_string(),
                message: format!("column '{}': {}", name, message),
            })?;
            table.insert(name, column)?;
        }
        debug!(path = %path.display(), rows = table.num_rows(), "read event table");
        Ok(table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Vector,
}

impl ColumnKind {
    /// Kind implied by a declared SQLite type, following SQLite's affinity
    /// rules. Untyped and NUMERIC columns have no fixed kind.
    fn declared(decl: &str) -> Option<ColumnKind> {
        let decl = decl.to_uppercase();
        if decl.contains("INT") {
            Some(ColumnKind::Int)
        } else if ["CHAR", "CLOB", "TEXT"].iter().any(|t| decl.contains(t)) {
            Some(ColumnKind::Vector)
        } else if ["REAL", "FLOA", "DOUB"].iter().any(|t| decl.contains(t)) {
            Some(ColumnKind::Float)
        } else {
            None
        }
    }

    /// Any TEXT makes a vector column, otherwise any REAL (or no INTEGER at
    /// all) a float column, otherwise an int column.
    fn inferred(values: &[SqlValue]) -> ColumnKind {
        if values.iter().any(|v| matches!(v, SqlValue::Text(_))) {
            ColumnKind::Vector
        } else if values.iter().any(|v| matches!(v, SqlValue::Real(_)))
            || !values.iter().any(|v| matches!(v, SqlValue::Integer(_)))
        {
            ColumnKind::Float
        } else {
            ColumnKind::Int
        }
    }
}

/// Column type follows the declared type; the values decide when no type
/// is declared or when they do not fit it (a REAL stored in an INTEGER
/// column). NULL reads as 0, NaN or an empty vector.
fn convert_column(values: Vec<SqlValue>, declared: Option<ColumnKind>) -> std::result::Result<Column, String> {
    let has = |pred: fn(&SqlValue) -> bool| values.iter().any(pred);

    if has(|v| matches!(v, SqlValue::Blob(_))) {
        return Err("BLOB values are not supported".to_string());
    }

    let kind = match declared {
        Some(ColumnKind::Int) if !has(|v| matches!(v, SqlValue::Real(_) | SqlValue::Text(_))) => ColumnKind::Int,
        Some(ColumnKind::Float) if !has(|v| matches!(v, SqlValue::Text(_))) => ColumnKind::Float,
        Some(ColumnKind::Vector) => ColumnKind::Vector,
        _ => ColumnKind::inferred(&values),
    };

    let column = match kind {
        ColumnKind::Vector => {
            let parsed: std::result::Result<Vec<Vec<f64>>, String> = values
                .into_iter()
                .map(|v| match v {
                    SqlValue::Text(s) => serde_json::from_str::<Vec<f64>>(&s).map_err(|e| e.to_string()),
                    SqlValue::Null => Ok(Vec::new()),
                    other => Err(format!("scalar {:?} in a vector column", other)),
                })
                .collect();
            Column::FloatVec(parsed?)
        }
        ColumnKind::Float => Column::Float(
            values
                .into_iter()
                .map(|v| match v {
                    SqlValue::Real(x) => x,
                    SqlValue::Integer(i) => i as f64,
                    _ => f64::NAN,
                })
                .collect(),
        ),
        ColumnKind::Int => Column::Int(
            values
                .into_iter()
                .map(|v| match v {
                    SqlValue::Integer(i) => i,
                    _ => 0,
                })
                .collect(),
        ),
    };
    Ok(column)
}

impl EventSource for SqliteSource {
    fn describe(&self) -> String {
        self.files.iter().map(|p| p.display().to_string()).join(", ")
    }

    fn column_names(&self) -> Result<Vec<String>> {
        let first = self.files.first().ok_or_else(|| Error::Source {
            path: String::new(),
            message: "no backing files".to_string(),
        })?;
        let conn = Self::open(first)?;
        Ok(self.table_schema(&conn, first)?.into_iter().map(|(name, _)| name).collect())
    }

    fn load(&self) -> Result<Columns> {
        let mut table = Columns::new();
        for path in &self.files {
            let part = self.read_file(path)?;
            if !table.names().is_empty() && table.names() != part.names() {
                return Err(Error::Source {
                    path: path.display().to_string(),
                    message: format!(
                        "columns [{}] differ from [{}]",
                        part.names().iter().join(", "),
                        table.names().iter().join(", ")
                    ),
                });
            }
            table.append(part, &path.display().to_string())?;
        }
        Ok(table)
    }
}

/// In-memory event table.
#[derive(Debug, Clone)]
pub struct MemorySource {
    pub label: String,
    pub columns: Columns,
}

impl MemorySource {
    pub fn new(label: &str, columns: Columns) -> Self {
        MemorySource { label: label.to_string(), columns }
    }
}

impl EventSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory:{}", self.label)
    }

    fn column_names(&self) -> Result<Vec<String>> {
        Ok(self.columns.names().to_vec())
    }

    fn load(&self) -> Result<Columns> {
        Ok(self.columns.clone())
    }
}
