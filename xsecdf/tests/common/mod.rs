#![allow(dead_code)]

use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use xsecdf::data::frame::{Column, Columns};

pub const STRANGE_SPECIES: [&str; 7] =
    ["n_K_plus", "n_K_minus", "n_K0", "n_lambda", "n_sigma_plus", "n_sigma0", "n_sigma_minus"];

pub fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|v| Value::Integer(*v)).collect()
}

pub fn reals(values: &[f64]) -> Vec<Value> {
    values.iter().map(|v| Value::Real(*v)).collect()
}

pub fn vectors(values: &[&[f64]]) -> Vec<Value> {
    values.iter().map(|v| Value::Text(serde_json::to_string(v).unwrap())).collect()
}

/// Write an `events` table with the given columns into a fresh SQLite file.
pub fn write_events(path: &Path, columns: &[(&str, Vec<Value>)]) {
    let conn = Connection::open(path).unwrap();
    let schema: Vec<String> = columns.iter().map(|(name, _)| format!("\"{}\"", name)).collect();
    conn.execute_batch(&format!("CREATE TABLE events ({});", schema.join(", "))).unwrap();

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!("INSERT INTO events VALUES ({})", placeholders.join(", "));
    let rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
    for row in 0..rows {
        conn.execute(&sql, params_from_iter(columns.iter().map(|(_, v)| &v[row]))).unwrap();
    }
}

/// Simulated numu CC events at the detector centre. Signal rows carry one
/// Lambda, the others nothing strange.
pub fn simulated_columns(run: i64, weights: &[f64], signal: &[bool]) -> Columns {
    let n = weights.len();
    let int = |v: i64| Column::Int(vec![v; n]);
    let float = |v: f64| Column::Float(vec![v; n]);

    let mut table = Columns::new();
    let fixed = [
        ("run", int(run)),
        ("subrun", Column::Int((0..n as i64).map(|i| i / 1000).collect())),
        ("event", Column::Int((0..n as i64).collect())),
        ("weightSpline", float(1.0)),
        ("weightTune", Column::Float(weights.to_vec())),
        ("nu_vtx_x", float(120.0)),
        ("nu_vtx_y", float(0.0)),
        ("nu_vtx_z", float(500.0)),
        ("nu_pdg", int(14)),
        ("int_ccnc", int(0)),
        ("int_mode", int(0)),
        ("n_p", int(1)),
        ("n_pi_minus", int(0)),
        ("n_pi_plus", int(0)),
        ("n_pi0", int(0)),
        ("n_gamma", int(0)),
    ];
    for (name, column) in fixed {
        table.insert(name, column).unwrap();
    }
    for species in STRANGE_SPECIES {
        let column = if species == "n_lambda" {
            Column::Int(signal.iter().map(|s| i64::from(*s)).collect())
        } else {
            int(0)
        };
        table.insert(species, column).unwrap();
    }
    table
}
