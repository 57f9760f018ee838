//! Mailmerge: row-driven mail merge over a tabular data source.

pub mod config;
pub mod error;
pub mod expr;
pub mod merge;
pub mod store;
pub mod transport;
