//! Persistence layer: libSQL-backed storage for jobs, contacts and drafts.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{CreateOutcome, Database, DraftRevision};
