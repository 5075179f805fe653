//! Error types for the core analysis operations

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A run / sub-run / event field does not fit its bit range.
    #[error("{field} = {value} does not fit in {bits} bits")]
    KeyOutOfRange {
        field: &'static str,
        value: i64,
        bits: u32,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
