// src/lib.rs
pub mod data {
    pub mod frame;
    pub mod source;
    pub mod snapshot;
}

pub mod hub {
    pub mod config;
    pub mod entry;
    pub mod processor;
    pub mod catalog;
}

pub mod selection;
pub mod error;

pub use error::{Error, Result};
pub use hub::catalog::Hub;
