//! Errors produced by the data-access layer.
//!
//! Builder-time misuse (bad mode, bad action, bad subquery, schema mistakes)
//! fails at the call that introduced it. Execution-time failures coming from
//! the underlying store are wrapped unchanged.

use thiserror::Error;

/// Errors produced by pools, backends and the query builder.
#[derive(Debug, Error)]
pub enum Error {
    /// A table mode other than `read` / `write` was requested.
    #[error("unsupported table mode: {mode}")]
    UnsupportedMode { mode: String },

    /// The declared primary key is not one of the table's columns.
    #[error("primary key column `{column}` is not a column of table `{table}`")]
    PrimaryKeyUndefined { table: String, column: String },

    /// A row was fetched without its primary key and cannot be written back.
    #[error(
        "primary key column `{column}` of table `{table}` was not retrieved for this row, \
         so it cannot be updated or deleted"
    )]
    PrimaryKeyMissing { table: String, column: String },

    /// A backend call was made in a state that does not allow it.
    #[error("invalid connection state: {0}")]
    State(String),

    /// A request action outside SELECT / INSERT / UPDATE / DELETE.
    #[error("unsupported action for request: {action}")]
    UnsupportedAction { action: String },

    /// A request that cannot be rendered into a valid statement.
    #[error("invalid statement: {0}")]
    InvalidStatement(String),

    /// A non-SELECT request was used where only a sub-select is allowed.
    #[error("only SELECT requests can be used as subqueries, got {action}")]
    SubqueryAction { action: String },

    /// Two parameter bags being merged share a name.
    #[error("parameter `{name}` is already bound")]
    ParameterCollision { name: String },

    /// A table is bound to a pool name the registry does not know.
    #[error("no database pool named `{name}`")]
    UnknownPool { name: String },

    /// Pool or settings values that cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn state(msg: impl Into<String>) -> Self {
        Error::State(msg.into())
    }

    /// Returns `true` when the error means the connection it came from can no
    /// longer be trusted and should be closed rather than reused.
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            Error::Task(_) => true,
            Error::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::DatabaseCorrupt
                    | rusqlite::ErrorCode::NotADatabase
                    | rusqlite::ErrorCode::SystemIoFailure
            ),
            _ => false,
        }
    }
}

/// Shorthand result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
