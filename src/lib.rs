//! Table-keyed CRUD helpers over the SQLite and MySQL drivers.
//!
//! # Intention
//!
//! - Provide one [`Database`] interface with `insert`, `select`, `update`,
//!   `upsert` and `delete` helpers for both engines.
//! - Name tables with typed keys ([`Table`], [`tables!`]) instead of strings.
//! - Build fresh SQLite files from a directory of DDL scripts.
//!
//! # Architectural Boundaries
//!
//! - Pooling, transactions and SQL execution belong to the drivers
//!   (`rusqlite`, `sqlx`); this crate only builds statements and scopes
//!   connections.
//! - Custom queries go through [`SqliteDatabase::with_connection`] or
//!   [`MySqlDatabase::pool`].

pub mod database;
pub mod ddl;
pub mod error;
pub mod logging;
pub mod mysql;
pub mod query;
pub mod sqlite;
pub mod table;
pub mod value;

pub use database::{CrudOutcome, Database, ExecuteResult, UpsertOutcome};
pub use error::{DatabaseError, Result};
pub use logging::{init_logging, LogLevel};
pub use mysql::{MySqlConfig, MySqlDatabase};
pub use query::{
    CreateOperation, CrudOperation, DeleteOperation, Dialect, Query, QueryOperator,
    ReadOperation, SqlQuery, UpdateOperation, UpsertOperation,
};
pub use sqlite::{SqliteConfig, SqliteDatabase};
pub use table::Table;
pub use value::{Row, Value};
