//! SQLite dialect and connection backend built on [`rusqlite`].
//!
//! Every blocking `rusqlite` call runs on Tokio's blocking pool. The
//! connection is moved into the blocking task and handed back when it
//! finishes, so the async side never holds a lock across an await point.
//!
//! Result rows are buffered when the statement executes. Committing the
//! implicit transaction therefore never invalidates rows that have not been
//! fetched yet.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    Action, Backend, Connector, Dialect, Leaf, RawRow, SelectColumn, StatementParts,
    TransactionState,
};
use crate::error::{Error, Result};
use crate::value::{Params, Value};

/// Default time a connection waits on a locked database file (5 s).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ── Dialect ──────────────────────────────────────────────────────────────────

/// SQLite SQL rendering with `:name` placeholders.
///
/// # Examples
///
/// ```
/// use rttp_db::backend::{Dialect, Leaf, sqlite::Sqlite};
///
/// let sql = Sqlite.render_leaf("name", Leaf::Equality { param: "p1" });
/// assert_eq!(sql, "name = :p1");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, name: &str) -> String {
        format!(":{name}")
    }

    fn render_leaf(&self, column: &str, leaf: Leaf<'_>) -> String {
        match leaf {
            Leaf::Equality { param } => format!("{column} = {}", self.placeholder(param)),
            // SQLite accepts an empty list and matches nothing.
            Leaf::Membership { params } => {
                let list: Vec<String> = params.iter().map(|p| self.placeholder(p)).collect();
                format!("{column} IN ({})", list.join(", "))
            }
            Leaf::Subquery { sql } => format!("{column} IN ({sql})"),
            Leaf::IsNull => format!("{column} IS NULL"),
        }
    }

    fn compile_statement(&self, parts: &StatementParts) -> Result<String> {
        let table = &parts.table;
        let mut sql = match parts.action {
            Action::Select => {
                let columns = if parts.columns.is_empty() {
                    "*".to_owned()
                } else {
                    parts
                        .columns
                        .iter()
                        .map(render_column)
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let mut sql = format!("SELECT {columns} FROM {table}");
                for join in &parts.joins {
                    sql.push_str(&format!(" {} JOIN {} AS {}", join.kind, join.table, join.alias));
                    if !join.on.is_empty() {
                        let on: Vec<String> =
                            join.on.iter().map(|(l, r)| format!("{l} = {r}")).collect();
                        sql.push_str(&format!(" ON {}", on.join(" AND ")));
                    }
                }
                sql
            }
            Action::Insert => {
                if parts.assignments.is_empty() {
                    format!("INSERT INTO {table} DEFAULT VALUES")
                } else {
                    let (columns, values): (Vec<&str>, Vec<&str>) = parts
                        .assignments
                        .iter()
                        .map(|(c, v)| (c.as_str(), v.as_str()))
                        .unzip();
                    format!(
                        "INSERT INTO {table} ({}) VALUES ({})",
                        columns.join(", "),
                        values.join(", ")
                    )
                }
            }
            Action::Update => {
                if parts.assignments.is_empty() {
                    return Err(Error::InvalidStatement(format!(
                        "UPDATE on `{table}` has no columns to set"
                    )));
                }
                let sets: Vec<String> = parts
                    .assignments
                    .iter()
                    .map(|(c, v)| format!("{c} = {v}"))
                    .collect();
                format!("UPDATE {table} SET {}", sets.join(", "))
            }
            Action::Delete => format!("DELETE FROM {table}"),
        };

        if let Some(where_clause) = &parts.where_clause {
            sql.push_str(&format!(" WHERE {where_clause}"));
        }

        if parts.action != Action::Select {
            return Ok(sql);
        }

        if !parts.group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", parts.group_by.join(", ")));
        }
        if let Some(having) = &parts.having {
            sql.push_str(&format!(" HAVING {having}"));
        }
        if !parts.order_by.is_empty() {
            let orders: Vec<String> = parts
                .order_by
                .iter()
                .map(|(c, d)| format!("{c} {}", d.as_str()))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", orders.join(", ")));
        }
        match (parts.limit, parts.offset) {
            (Some(limit), 0) => sql.push_str(&format!(" LIMIT {limit}")),
            (Some(limit), offset) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
            (None, offset) if offset > 0 => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, _) => {}
        }

        Ok(sql)
    }
}

fn render_column(column: &SelectColumn) -> String {
    if column.expr == column.alias {
        column.expr.clone()
    } else {
        format!("{} AS {}", column.expr, column.alias)
    }
}

// ── Value conversion ─────────────────────────────────────────────────────────

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;

        Ok(match self {
            Value::Null => ToSqlOutput::Owned(Sql::Null),
            Value::Bool(b) => ToSqlOutput::Owned(Sql::Integer(i64::from(*b))),
            Value::Integer(v) => ToSqlOutput::Owned(Sql::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(Sql::Real(*v)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

// ── Connector ────────────────────────────────────────────────────────────────

/// Connection parameters for [`SqliteConnector`], as found under
/// `backend.options` in the database settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteOptions {
    /// Database file. `:memory:` gives every connection its own database.
    pub path: PathBuf,

    /// How long a statement waits on a locked database, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl SqliteOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Opens [`SqliteBackend`] connections to one database file.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    options: SqliteOptions,
}

impl SqliteConnector {
    pub fn new(options: SqliteOptions) -> Self {
        Self { options }
    }

    /// Connector for the database file at `path` with default options.
    pub fn open_path(path: impl AsRef<Path>) -> Self {
        Self::new(SqliteOptions::new(path.as_ref()))
    }

    pub fn options(&self) -> &SqliteOptions {
        &self.options
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::new(Sqlite)
    }

    async fn open(&self) -> Result<Box<dyn Backend>> {
        let path = self.options.path.clone();
        let busy_timeout = Duration::from_millis(self.options.busy_timeout_ms);

        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            let conn = Connection::open(&path)?;
            conn.busy_timeout(busy_timeout)?;
            Ok(conn)
        })
        .await??;

        debug!(path = %self.options.path.display(), "sqlite connection opened");
        Ok(Box::new(SqliteBackend::new(conn)))
    }
}

// ── Backend ──────────────────────────────────────────────────────────────────

/// One SQLite connection with a buffered result cursor.
#[derive(Debug)]
pub struct SqliteBackend {
    // `None` while a blocking call owns it, or after close.
    conn: Option<Connection>,
    state: TransactionState,
    // A statement ran since the last begin / rollback.
    executed: bool,
    rows: VecDeque<RawRow>,
    affected: u64,
    broken: bool,
}

impl SqliteBackend {
    /// Wraps an already open connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Some(conn),
            state: TransactionState::Idle,
            executed: false,
            rows: VecDeque::new(),
            affected: 0,
            broken: false,
        }
    }

    // Runs `f` against the connection on the blocking pool. A panic or a
    // cancelled await loses the connection and marks the backend unusable.
    async fn run<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| Error::state("connection is closed"))?;
        self.broken = true;

        let (result, conn) = tokio::task::spawn_blocking(move || {
            let result = f(&mut conn);
            (result, conn)
        })
        .await?;

        self.conn = Some(conn);
        self.broken = false;
        result.map_err(Error::from)
    }

    async fn run_batch(&mut self, sql: &'static str) -> Result<()> {
        self.run(move |conn| conn.execute_batch(sql)).await
    }

    // Fetches need an executed statement; an implicit transaction still open
    // at that point is committed first.
    async fn finalize_for_read(&mut self) -> Result<()> {
        if !self.executed {
            return Err(Error::state(
                "cannot read results before a statement has been executed",
            ));
        }
        if self.state == TransactionState::Open {
            self.commit().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::new(Sqlite)
    }

    fn transaction_state(&self) -> TransactionState {
        self.state
    }

    fn is_usable(&self) -> bool {
        self.conn.is_some() && !self.broken
    }

    async fn close(&mut self) -> Result<()> {
        let rollback = if self.state == TransactionState::Open {
            self.rollback().await
        } else {
            Ok(())
        };

        self.rows.clear();
        self.executed = false;
        self.state = TransactionState::Idle;

        if let Some(conn) = self.conn.take() {
            tokio::task::spawn_blocking(move || conn.close().map_err(|(_, e)| e)).await??;
            debug!("sqlite connection closed");
        }
        rollback
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        if self.state == TransactionState::Open {
            return Err(Error::state("a transaction is already open"));
        }
        self.run_batch("BEGIN").await?;
        self.state = TransactionState::Open;
        self.executed = false;
        self.rows.clear();
        self.affected = 0;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.state != TransactionState::Open {
            return Err(Error::state("no open transaction to commit"));
        }
        self.run_batch("COMMIT").await?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.state == TransactionState::Open {
            self.run_batch("ROLLBACK").await?;
        }
        self.state = TransactionState::Idle;
        self.executed = false;
        self.rows.clear();
        self.affected = 0;
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        // Outside a transaction this only clears the buffered result.
        self.rollback().await
    }

    async fn execute_query(&mut self, sql: &str, params: &Params) -> Result<()> {
        if self.state != TransactionState::Open {
            self.begin_transaction().await?;
        }

        debug!(sql, params = params.len(), "executing statement");

        let owned_sql = sql.to_owned();
        let bound: Vec<(String, Value)> = params
            .iter()
            .map(|(name, value)| (Sqlite.placeholder(name), value.clone()))
            .collect();

        let outcome = self
            .run(move |conn| {
                let mut stmt = conn.prepare(&owned_sql)?;
                let refs: Vec<(&str, &dyn ToSql)> = bound
                    .iter()
                    .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
                    .collect();
                let readonly = stmt.readonly();
                let width = stmt.column_count();

                let mut rows = VecDeque::new();
                let mut cursor = stmt.query(refs.as_slice())?;
                while let Some(row) = cursor.next()? {
                    let mut raw = Vec::with_capacity(width);
                    for i in 0..width {
                        raw.push(value_from_ref(row.get_ref(i)?));
                    }
                    rows.push_back(raw);
                }
                drop(cursor);

                let affected = if readonly {
                    0
                } else {
                    u64::try_from(conn.changes()).unwrap_or(0)
                };
                Ok((rows, affected))
            })
            .await;

        match outcome {
            Ok((rows, affected)) => {
                self.rows = rows;
                self.affected = affected;
                self.executed = true;
                Ok(())
            }
            Err(e) => {
                warn!(sql, error = %e, "statement failed");
                self.rows.clear();
                self.executed = false;
                Err(e)
            }
        }
    }

    async fn fetch_one(&mut self) -> Result<Option<RawRow>> {
        self.finalize_for_read().await?;
        Ok(self.rows.pop_front())
    }

    async fn fetch_many(&mut self, n: usize) -> Result<Vec<RawRow>> {
        self.finalize_for_read().await?;
        let n = n.min(self.rows.len());
        Ok(self.rows.drain(..n).collect())
    }

    async fn fetch_all(&mut self) -> Result<Vec<RawRow>> {
        self.finalize_for_read().await?;
        Ok(self.rows.drain(..).collect())
    }

    async fn affected_count(&mut self) -> Result<u64> {
        self.finalize_for_read().await?;
        Ok(self.affected)
    }
}
