//! Data sources: where rows come from and where write-back goes.

pub mod grist;
pub mod libsql_backend;
pub mod traits;

pub use grist::GristClient;
pub use libsql_backend::LibSqlSource;
pub use traits::{DataSource, Record, Row, RowId};
