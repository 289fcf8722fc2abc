//! Persistence layer: libSQL-backed storage for appliances, tasks and readings.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;
pub mod unit_of_work;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
pub use unit_of_work::{WriteGate, finish};
