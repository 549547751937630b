//! Static description of one relation and the pools it reads from and
//! writes to.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::backend::{Action, Dialect};
use crate::error::{Error, Result};
use crate::pool::{Pool, PooledConnection};
use crate::query::{Assignment, Query};
use crate::settings::{DEFAULT_POOL, Databases};

/// Which pool binding of a table to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Read,
    Write,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Read => "read",
            Mode::Write => "write",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read" => Ok(Mode::Read),
            "write" => Ok(Mode::Write),
            _ => Err(Error::UnsupportedMode { mode: s.to_owned() }),
        }
    }
}

/// Builder for [`Table`]. Created with [`Table::builder`].
#[derive(Debug, Clone)]
pub struct TableBuilder {
    name: String,
    columns: Vec<String>,
    primary_key: String,
    pools: HashMap<Mode, String>,
}

impl TableBuilder {
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Sets the primary-key column. Defaults to `id`.
    #[must_use]
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Binds `mode` to the pool registered as `pool`.
    #[must_use]
    pub fn pool(mut self, mode: Mode, pool: impl Into<String>) -> Self {
        self.pools.insert(mode, pool.into());
        self
    }

    /// Finishes the schema.
    ///
    /// Pool names are resolved lazily, so `databases` does not need to hold
    /// the bound pools yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PrimaryKeyUndefined`] if the primary key is not one of
    /// the declared columns.
    pub fn build(self, databases: &Arc<Databases>) -> Result<Table> {
        if !self.columns.contains(&self.primary_key) {
            return Err(Error::PrimaryKeyUndefined {
                table: self.name,
                column: self.primary_key,
            });
        }

        let mut pools = self.pools;
        for mode in [Mode::Read, Mode::Write] {
            pools
                .entry(mode)
                .or_insert_with(|| DEFAULT_POOL.to_owned());
        }

        Ok(Table {
            inner: Arc::new(TableInner {
                name: self.name,
                columns: self.columns,
                primary_key: self.primary_key,
                pools,
                databases: Arc::clone(databases),
            }),
        })
    }
}

struct TableInner {
    name: String,
    columns: Vec<String>,
    primary_key: String,
    pools: HashMap<Mode, String>,
    databases: Arc<Databases>,
}

/// Immutable schema of one relation.
///
/// Cloning is cheap; clones share the same schema.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rttp_db::{Databases, Mode, Table};
///
/// # fn example(databases: Arc<Databases>) -> rttp_db::Result<()> {
/// let users = Table::builder("users")
///     .columns(["id", "name", "email"])
///     .pool(Mode::Read, "replica")
///     .build(&databases)?;
///
/// assert_eq!(users.pool_name(Mode::Read), "replica");
/// assert_eq!(users.pool_name(Mode::Write), "default");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Table {
    inner: Arc<TableInner>,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.inner.name)
            .field("columns", &self.inner.columns)
            .field("primary_key", &self.inner.primary_key)
            .field("read", &self.pool_name(Mode::Read))
            .field("write", &self.pool_name(Mode::Write))
            .finish()
    }
}

impl Table {
    /// Starts a schema for the relation `name`.
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder {
            name: name.into(),
            columns: Vec::new(),
            primary_key: "id".to_owned(),
            pools: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Declared columns, in declaration order.
    pub fn columns(&self) -> &[String] {
        &self.inner.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.inner.columns.iter().any(|c| c == column)
    }

    pub fn primary_key(&self) -> &str {
        &self.inner.primary_key
    }

    /// Name of the pool bound to `mode`.
    pub fn pool_name(&self, mode: Mode) -> &str {
        self.inner
            .pools
            .get(&mode)
            .map_or(DEFAULT_POOL, String::as_str)
    }

    /// The pool bound to `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPool`] if the bound name is not registered.
    pub fn pool_for(&self, mode: Mode) -> Result<&Pool> {
        self.inner.databases.get(self.pool_name(mode))
    }

    /// Dialect of the pool bound to `mode`.
    pub fn dialect(&self, mode: Mode) -> Result<Arc<dyn Dialect>> {
        Ok(self.pool_for(mode)?.dialect())
    }

    pub async fn acquire_connection(&self, mode: Mode) -> Result<PooledConnection> {
        self.pool_for(mode)?.get().await
    }

    pub async fn release_connection(&self, mode: Mode, conn: PooledConnection) -> Result<()> {
        self.pool_for(mode)?.release(conn).await;
        Ok(())
    }

    /// A SELECT over this table, projecting every declared column.
    pub fn select(&self) -> Query {
        Query::new(self, Action::Select)
    }

    /// An INSERT of `assignments`.
    pub fn insert<I, K, V>(&self, assignments: I) -> Query
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Assignment>,
    {
        Query::new(self, Action::Insert).set_all(assignments)
    }

    /// An UPDATE setting `assignments`. Add a filter before executing it, or
    /// every row is updated.
    pub fn update<I, K, V>(&self, assignments: I) -> Query
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Assignment>,
    {
        Query::new(self, Action::Update).set_all(assignments)
    }

    pub fn delete(&self) -> Query {
        Query::new(self, Action::Delete)
    }
}
