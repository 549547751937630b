//! # rttp-db
//!
//! The async data-access layer of rttp: bounded connection pools, a
//! dialect-abstracted backend contract and a fluent query builder that
//! compiles into parameterized SQL.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rttp_db::{Databases, Table};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let databases = Arc::new(Databases::from_json(r#"{
//!         "default": { "backend": { "type": "sqlite", "options": { "path": "app.db" } } }
//!     }"#)?);
//!
//!     let users = Table::builder("users")
//!         .columns(["id", "name", "age"])
//!         .build(&databases)?;
//!
//!     users.insert([("name", "ada")]).set("age", 36).execute().await?;
//!
//!     if let Some(mut user) = users.select().and_where(("name", "ada")).one().await? {
//!         user.set("age", 37);
//!         user.save().await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Layout
//!
//! - [`backend`]: the dialect / connection contract and the SQLite adapter.
//! - [`pool`]: bounded, age-aware connection pool.
//! - [`predicate`]: composable WHERE / HAVING trees.
//! - [`table`], [`query`], [`row`]: schema, request builder and result rows.
//! - [`settings`]: the named pool registry and its settings format.

pub mod backend;
pub mod error;
pub mod pool;
pub mod predicate;
pub mod query;
pub mod row;
pub mod settings;
pub mod table;
pub mod value;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use backend::{Action, Backend, Connector, Dialect, Direction, JoinKind, TransactionState};
pub use error::{Error, Result};
pub use pool::{Pool, PoolConfig, PooledConnection};
pub use predicate::{Combinator, Condition, Operand, Where};
pub use query::{Assignment, Projection, Query, Statement};
pub use row::Row;
pub use settings::{BackendSettings, Databases, PoolSettings};
pub use table::{Mode, Table, TableBuilder};
pub use value::{Params, Value};
