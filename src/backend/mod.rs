//! Backend contract: what every SQL engine adapter provides.
//!
//! The contract is split in three traits:
//!
//! - [`Dialect`]: pure SQL rendering of placeholders, predicate fragments,
//!   AND/OR composition and whole-statement templates.
//! - [`Backend`]: one live connection with its statement cursor and
//!   transaction state.
//! - [`Connector`]: a factory that opens new [`Backend`]s with the connection
//!   parameters it was configured with.
//!
//! ## Transaction protocol
//!
//! Backends begin transactions lazily: [`Backend::execute_query`] issues a
//! `BEGIN` when no transaction is open. Fetch and count calls need an executed
//! statement; if its transaction is still open they commit it first.
//!
//! ```text
//!            execute_query            fetch_* / affected_count / commit
//!   Idle ─────────────────▶ Open ─────────────────────────────────▶ Committed
//!    ▲                        │                                         │
//!    └──────── rollback ──────┘◀──────────── execute_query ─────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::value::{Params, Value};

pub mod sqlite;
pub mod statement;

pub use statement::{Action, Direction, JoinClause, JoinKind, SelectColumn, StatementParts};

/// One fetched row, in projection order.
pub type RawRow = Vec<Value>;

/// Transaction state of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionState {
    /// No transaction and no pending result.
    #[default]
    Idle,
    /// A transaction was started and not yet finalized.
    Open,
    /// The last transaction committed; its results can still be fetched.
    Committed,
}

/// Operand shape of one predicate leaf, with its parameters already named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leaf<'a> {
    /// `column = <param>`
    Equality { param: &'a str },
    /// `column IN (<params>)`, one parameter per list element.
    Membership { params: &'a [String] },
    /// `column IN (<sub-select>)`
    Subquery { sql: &'a str },
    /// `column IS NULL`
    IsNull,
}

/// Pure SQL rendering for one engine.
///
/// Implementations never interpolate values: every value reaches the
/// statement through [`placeholder`](Self::placeholder).
pub trait Dialect: fmt::Debug + Send + Sync {
    /// Short engine name used in logs, e.g. `"sqlite"`.
    fn name(&self) -> &'static str;

    /// Placeholder syntax for the named parameter `name`.
    fn placeholder(&self, name: &str) -> String;

    /// Renders one predicate leaf.
    fn render_leaf(&self, column: &str, leaf: Leaf<'_>) -> String;

    /// Joins two rendered predicates with AND, parenthesizing both sides.
    fn combine_and(&self, left: &str, right: &str) -> String {
        format!("({left}) AND ({right})")
    }

    /// Joins two rendered predicates with OR, parenthesizing both sides.
    fn combine_or(&self, left: &str, right: &str) -> String {
        format!("({left}) OR ({right})")
    }

    /// Glues already rendered parts into one statement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStatement`](crate::Error::InvalidStatement)
    /// when the parts cannot form valid SQL (e.g. an UPDATE with nothing to
    /// set).
    fn compile_statement(&self, parts: &StatementParts) -> Result<String>;

    /// Wraps a compiled SELECT so it returns the number of rows it yields.
    fn count_rows(&self, select_sql: &str) -> String {
        format!("SELECT COUNT(*) FROM ({select_sql}) AS counted")
    }
}

/// One live connection to a SQL engine.
///
/// A backend runs at most one statement at a time; every method takes
/// `&mut self`.
#[async_trait]
pub trait Backend: Send {
    /// The dialect statements for this connection must be rendered with.
    fn dialect(&self) -> Arc<dyn Dialect>;

    /// Where the connection is in the lazy-begin protocol.
    fn transaction_state(&self) -> TransactionState;

    /// `false` once the connection is closed or a round trip left it broken.
    fn is_usable(&self) -> bool;

    /// Rolls back an open transaction and closes the connection.
    async fn close(&mut self) -> Result<()>;

    /// Opens a transaction. Fails if one is already open.
    async fn begin_transaction(&mut self) -> Result<()>;

    /// Commits the open transaction. Buffered results stay readable.
    async fn commit(&mut self) -> Result<()>;

    /// Rolls back an open transaction and discards buffered results.
    async fn rollback(&mut self) -> Result<()>;

    /// Returns the connection to `Idle` with nothing left to fetch: rolls
    /// back an open transaction and drops unread rows of the last result.
    /// Pools call this before a connection is handed to another caller.
    async fn reset(&mut self) -> Result<()>;

    /// Runs `sql` with `params`, beginning a transaction if none is open.
    async fn execute_query(&mut self, sql: &str, params: &Params) -> Result<()>;

    /// Next row of the last result, `None` when exhausted.
    async fn fetch_one(&mut self) -> Result<Option<RawRow>>;

    /// Up to `n` rows of the last result.
    async fn fetch_many(&mut self, n: usize) -> Result<Vec<RawRow>>;

    /// Every remaining row of the last result.
    async fn fetch_all(&mut self) -> Result<Vec<RawRow>>;

    /// Rows changed by the last statement.
    async fn affected_count(&mut self) -> Result<u64>;
}

/// Opens connections for a [`Pool`](crate::pool::Pool).
#[async_trait]
pub trait Connector: Send + Sync {
    fn dialect(&self) -> Arc<dyn Dialect>;

    async fn open(&self) -> Result<Box<dyn Backend>>;
}
