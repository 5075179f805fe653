//! Lazy columnar event frames.
//!
//! A [`LazyFrame`] is a source plus an ordered list of column definitions and
//! row filters. Declaring an operation only checks column names; the source
//! is read and every operation evaluated when an action (`count`, `sum`,
//! `collect`, `map_rows`, ...) runs. Each definition and filter is evaluated
//! row-parallel, so the functions handed to it must be pure.

use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::data::source::EventSource;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    /// Variable-length vector per row (per reconstructed particle, ...).
    FloatVec(Vec<Vec<f64>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Bool(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::FloatVec(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Column::Bool(_) => "bool",
            Column::Int(_) => "int",
            Column::Float(_) => "float",
            Column::FloatVec(_) => "float[]",
        }
    }

    /// Scalar value as float; vectors read as NaN.
    pub fn float_at(&self, row: usize) -> f64 {
        match self {
            Column::Bool(v) => f64::from(u8::from(v[row])),
            Column::Int(v) => v[row] as f64,
            Column::Float(v) => v[row],
            Column::FloatVec(_) => f64::NAN,
        }
    }

    /// Scalar value as integer; floats are truncated, vectors read as 0.
    pub fn int_at(&self, row: usize) -> i64 {
        match self {
            Column::Bool(v) => i64::from(v[row]),
            Column::Int(v) => v[row],
            Column::Float(v) => v[row] as i64,
            Column::FloatVec(_) => 0,
        }
    }

    /// Scalar value as flag (non-zero is true); vectors are true when non-empty.
    pub fn bool_at(&self, row: usize) -> bool {
        match self {
            Column::Bool(v) => v[row],
            Column::Int(v) => v[row] != 0,
            Column::Float(v) => v[row] != 0.0,
            Column::FloatVec(v) => !v[row].is_empty(),
        }
    }

    /// Vector value; scalars read as an empty slice.
    pub fn floats_at(&self, row: usize) -> &[f64] {
        match self {
            Column::FloatVec(v) => &v[row],
            _ => &[],
        }
    }

    fn take(&self, mask: &[bool]) -> Column {
        fn keep<T: Clone>(values: &[T], mask: &[bool]) -> Vec<T> {
            values.iter().zip(mask).filter(|(_, m)| **m).map(|(v, _)| v.clone()).collect()
        }
        match self {
            Column::Bool(v) => Column::Bool(keep(v, mask)),
            Column::Int(v) => Column::Int(keep(v, mask)),
            Column::Float(v) => Column::Float(keep(v, mask)),
            Column::FloatVec(v) => Column::FloatVec(keep(v, mask)),
        }
    }

    /// Empty parts fit any column; an all-NaN float part (NULLs of an
    /// untyped column) reads as zeros in an int column.
    fn append(&mut self, other: Column) -> std::result::Result<(), String> {
        match (self, other) {
            (_, b) if b.is_empty() => {}
            (a, b) if a.is_empty() => *a = b,
            (Column::Bool(a), Column::Bool(b)) => a.extend(b),
            (Column::Int(a), Column::Int(b)) => a.extend(b),
            (Column::Float(a), Column::Float(b)) => a.extend(b),
            (Column::Float(a), Column::Int(b)) => a.extend(b.into_iter().map(|v| v as f64)),
            (Column::Int(a), Column::Float(b)) if b.iter().all(|v| v.is_nan()) => a.resize(a.len() + b.len(), 0),
            (Column::FloatVec(a), Column::FloatVec(b)) => a.extend(b),
            (a, b) => return Err(format!("cannot append {} values to a {} column", b.type_name(), a.type_name())),
        }
        Ok(())
    }
}

/// Types a defined column can hold.
pub trait ColumnValue: Send + Sized {
    fn into_column(values: Vec<Self>) -> Column;
}

impl ColumnValue for bool {
    fn into_column(values: Vec<Self>) -> Column {
        Column::Bool(values)
    }
}

impl ColumnValue for i64 {
    fn into_column(values: Vec<Self>) -> Column {
        Column::Int(values)
    }
}

impl ColumnValue for f64 {
    fn into_column(values: Vec<Self>) -> Column {
        Column::Float(values)
    }
}

impl ColumnValue for Vec<f64> {
    fn into_column(values: Vec<Self>) -> Column {
        Column::FloatVec(values)
    }
}

/// Named, equally long columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Columns {
    names: Vec<String>,
    columns: Vec<Column>,
    rows: usize,
}

impl Columns {
    pub fn new() -> Self {
        Columns::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, column: Column) -> Result<Self> {
        self.insert(name, column)?;
        Ok(self)
    }

    pub fn insert(&mut self, name: &str, column: Column) -> Result<()> {
        if self.names.iter().any(|n| n == name) {
            return Err(Error::DuplicateColumn(name.to_string()));
        }
        if self.names.is_empty() {
            self.rows = column.len();
        } else if column.len() != self.rows {
            return Err(Error::LengthMismatch { name: name.to_string(), expected: self.rows, found: column.len() });
        }
        self.names.push(name.to_string());
        self.columns.push(column);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.names.iter().position(|n| n == name).map(|i| &self.columns[i])
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    /// Keep the rows whose mask entry is true.
    pub fn retain_rows(self, mask: &[bool]) -> Columns {
        let rows = mask.iter().filter(|m| **m).count();
        let columns = self.columns.par_iter().map(|c| c.take(mask)).collect();
        Columns { names: self.names, columns, rows }
    }

    /// Subset of columns, in the requested order.
    pub fn select(&self, names: &[&str]) -> Result<Columns> {
        let mut out = Columns::new();
        for name in names {
            let column = self.get(name).ok_or_else(|| Error::MissingColumn(name.to_string()))?;
            out.insert(name, column.clone())?;
        }
        out.rows = self.rows;
        Ok(out)
    }

    /// Concatenate rows of a table with the same column names. `origin`
    /// names where `other` was read from, for error messages.
    pub fn append(&mut self, other: Columns, origin: &str) -> Result<()> {
        if self.names.is_empty() {
            *self = other;
            return Ok(());
        }
        if self.names != other.names {
            return Err(Error::Source {
                path: origin.to_string(),
                message: format!("column sets differ: {:?} vs {:?}", self.names, other.names),
            });
        }
        for ((name, column), extra) in self.names.iter().zip(self.columns.iter_mut()).zip(other.columns) {
            column.append(extra).map_err(|message| Error::Source {
                path: origin.to_string(),
                message: format!("column '{}': {}", name, message),
            })?;
        }
        self.rows += other.rows;
        Ok(())
    }
}

/// One row of the input columns handed to a definition or filter, in the
/// order the inputs were declared.
pub struct Row<'a> {
    columns: &'a [&'a Column],
    index: usize,
}

impl<'a> Row<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn float(&self, input: usize) -> f64 {
        self.columns[input].float_at(self.index)
    }

    pub fn int(&self, input: usize) -> i64 {
        self.columns[input].int_at(self.index)
    }

    pub fn boolean(&self, input: usize) -> bool {
        self.columns[input].bool_at(self.index)
    }

    pub fn floats(&self, input: usize) -> &'a [f64] {
        self.columns[input].floats_at(self.index)
    }
}

type ColumnFn = Arc<dyn Fn(&[&Column], usize) -> Column + Send + Sync>;
type PredicateFn = Arc<dyn Fn(&Row) -> bool + Send + Sync>;

enum Op {
    Define { name: String, inputs: Vec<String>, eval: ColumnFn },
    Filter { name: String, inputs: Vec<String>, predicate: PredicateFn },
}

/// Cheap-to-clone handle on a source and the operations stacked on it.
///
/// Extending a frame returns a new handle; the original is unchanged, so
/// several branches (e.g. different selections) can share one base frame.
#[derive(Clone)]
pub struct LazyFrame {
    source: Arc<dyn EventSource>,
    ops: Vec<Arc<Op>>,
    schema: Vec<String>,
    num_threads: Option<usize>,
}

impl fmt::Debug for LazyFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ops: Vec<String> = self
            .ops
            .iter()
            .map(|op| match op.as_ref() {
                Op::Define { name, .. } => format!("Define({})", name),
                Op::Filter { name, .. } => format!("Filter({})", name),
            })
            .collect();
        f.debug_struct("LazyFrame")
            .field("source", &self.source.describe())
            .field("ops", &ops)
            .finish()
    }
}

fn resolve<'a>(table: &'a Columns, inputs: &[String]) -> Result<Vec<&'a Column>> {
    inputs
        .iter()
        .map(|name| table.get(name).ok_or_else(|| Error::MissingColumn(name.clone())))
        .collect()
}

impl LazyFrame {
    pub fn new(source: Arc<dyn EventSource>) -> Result<Self> {
        let schema = source.column_names()?;
        Ok(LazyFrame { source, ops: Vec::new(), schema, num_threads: None })
    }

    /// Evaluate actions of this frame on a dedicated pool of `n` workers.
    pub fn with_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    pub fn column_names(&self) -> &[String] {
        &self.schema
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.schema.iter().any(|c| c == name)
    }

    pub fn source(&self) -> &Arc<dyn EventSource> {
        &self.source
    }

    fn check_inputs(&self, inputs: &[&str]) -> Result<Vec<String>> {
        inputs
            .iter()
            .map(|name| {
                if self.has_column(name) {
                    Ok(name.to_string())
                } else {
                    Err(Error::MissingColumn(name.to_string()))
                }
            })
            .collect()
    }

    /// Declare a new column computed per row from `inputs`.
    pub fn define<T, F>(&self, name: &str, inputs: &[&str], f: F) -> Result<LazyFrame>
    where
        T: ColumnValue,
        F: Fn(&Row) -> T + Send + Sync + 'static,
    {
        if self.has_column(name) {
            return Err(Error::DuplicateColumn(name.to_string()));
        }
        let inputs = self.check_inputs(inputs)?;
        let eval: ColumnFn = Arc::new(move |columns: &[&Column], rows: usize| {
            let values: Vec<T> = (0..rows).into_par_iter().map(|index| f(&Row { columns, index })).collect();
            T::into_column(values)
        });

        let mut next = self.clone();
        next.ops.push(Arc::new(Op::Define { name: name.to_string(), inputs, eval }));
        next.schema.push(name.to_string());
        Ok(next)
    }

    /// Keep only rows for which `predicate` holds.
    pub fn filter<F>(&self, name: &str, inputs: &[&str], predicate: F) -> Result<LazyFrame>
    where
        F: Fn(&Row) -> bool + Send + Sync + 'static,
    {
        let inputs = self.check_inputs(inputs)?;
        let mut next = self.clone();
        next.ops.push(Arc::new(Op::Filter { name: name.to_string(), inputs, predicate: Arc::new(predicate) }));
        Ok(next)
    }

    fn run<T: Send>(&self, job: impl FnOnce() -> Result<T> + Send) -> Result<T> {
        match self.num_threads {
            Some(n) => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| Error::ThreadPool(e.to_string()))?;
                pool.install(job)
            }
            None => job(),
        }
    }

    fn evaluate(&self) -> Result<Columns> {
        let mut table = self.source.load()?;
        for op in &self.ops {
            match op.as_ref() {
                Op::Define { name, inputs, eval } => {
                    let column = {
                        let columns = resolve(&table, inputs)?;
                        eval(&columns, table.num_rows())
                    };
                    table.insert(name, column)?;
                }
                Op::Filter { inputs, predicate, .. } => {
                    let mask: Vec<bool> = {
                        let columns = resolve(&table, inputs)?;
                        let columns = columns.as_slice();
                        (0..table.num_rows())
                            .into_par_iter()
                            .map(|index| predicate(&Row { columns, index }))
                            .collect()
                    };
                    table = table.retain_rows(&mask);
                }
            }
        }
        Ok(table)
    }

    /// Read the source and apply every operation.
    pub fn materialize(&self) -> Result<Columns> {
        self.run(|| self.evaluate())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.materialize()?.num_rows())
    }

    /// Sum of a column, accumulated in row order.
    pub fn sum(&self, column: &str) -> Result<f64> {
        let table = self.materialize()?;
        let values = table.get(column).ok_or_else(|| Error::MissingColumn(column.to_string()))?;
        Ok((0..table.num_rows()).map(|i| values.float_at(i)).sum())
    }

    pub fn collect(&self, columns: &[&str]) -> Result<Columns> {
        self.materialize()?.select(columns)
    }

    /// Evaluate `f` on every surviving row; results are in row order.
    pub fn map_rows<T, F>(&self, inputs: &[&str], f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&Row) -> T + Send + Sync,
    {
        let inputs = self.check_inputs(inputs)?;
        self.run(|| {
            let table = self.evaluate()?;
            let columns = resolve(&table, &inputs)?;
            let columns = columns.as_slice();
            Ok((0..table.num_rows()).into_par_iter().map(|index| f(&Row { columns, index })).collect())
        })
    }

    /// Visit every surviving row in parallel, in no particular order.
    pub fn for_each<F>(&self, inputs: &[&str], f: F) -> Result<()>
    where
        F: Fn(&Row) + Send + Sync,
    {
        let inputs = self.check_inputs(inputs)?;
        self.run(|| {
            let table = self.evaluate()?;
            let columns = resolve(&table, &inputs)?;
            let columns = columns.as_slice();
            (0..table.num_rows()).into_par_iter().for_each(|index| f(&Row { columns, index }));
            Ok(())
        })
    }
}
