//! Fluent SELECT / INSERT / UPDATE / DELETE requests.
//!
//! A [`Query`] is built from a [`Table`], refined with chained calls and then
//! either compiled into a [`Statement`] or run directly with
//! [`execute`](Query::execute), [`all`](Query::all), [`one`](Query::one) or
//! [`count`](Query::count).
//!
//! ```rust,no_run
//! use rttp_db::Table;
//!
//! # async fn example(users: Table) -> rttp_db::Result<()> {
//! let admins = users
//!     .select()
//!     .columns(["id", "name"])
//!     .and_where(("role", "admin"))
//!     .or_where(("id", vec![1, 2, 3]))
//!     .order_by(["-created_at", "name"])
//!     .limit(20)
//!     .all()
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Compilation numbers every bound value `p1, p2, ...` in the order it is
//! rendered (assignments, WHERE, then HAVING) and every joined table
//! `j1, j2, ...` in join order. Sub-selects continue the same numbering, so
//! one compiled statement never binds two values under the same name.

use std::fmt;

use tracing::debug;

use crate::backend::{
    Action, Dialect, Direction, JoinClause, JoinKind, RawRow, SelectColumn, StatementParts,
};
use crate::error::{Error, Result};
use crate::pool::PooledConnection;
use crate::predicate::{Combinator, Condition, Where};
use crate::row::Row;
use crate::table::{Mode, Table};
use crate::value::{Binder, Params, Value};

/// Columns a SELECT returns.
///
/// ```
/// use rttp_db::Projection;
///
/// let plain = Projection::from(["id", "name"]);
/// let aliased = Projection::aliased([("total", "COUNT(*)")]);
/// assert_eq!(aliased.names(), ["total"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection(Vec<SelectColumn>);

impl Projection {
    /// Builds `expression AS alias` columns from `(alias, expression)` pairs.
    pub fn aliased<I, A, E>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, E)>,
        A: Into<String>,
        E: Into<String>,
    {
        Projection(
            pairs
                .into_iter()
                .map(|(alias, expr)| SelectColumn {
                    expr: expr.into(),
                    alias: alias.into(),
                })
                .collect(),
        )
    }

    /// Names the returned columns are keyed by.
    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|c| c.alias.clone()).collect()
    }

    fn plain<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection(
            columns
                .into_iter()
                .map(|c| {
                    let c = c.into();
                    SelectColumn {
                        expr: c.clone(),
                        alias: c,
                    }
                })
                .collect(),
        )
    }
}

impl From<&str> for Projection {
    fn from(column: &str) -> Self {
        Projection::plain([column])
    }
}

impl From<String> for Projection {
    fn from(column: String) -> Self {
        Projection::plain([column])
    }
}

impl From<Vec<&str>> for Projection {
    fn from(columns: Vec<&str>) -> Self {
        Projection::plain(columns)
    }
}

impl From<Vec<String>> for Projection {
    fn from(columns: Vec<String>) -> Self {
        Projection::plain(columns)
    }
}

impl<const N: usize> From<[&str; N]> for Projection {
    fn from(columns: [&str; N]) -> Self {
        Projection::plain(columns)
    }
}

/// The value assigned to one column by an INSERT or UPDATE.
///
/// Either a literal, bound as a parameter, or a SELECT request inlined as a
/// parenthesized sub-select.
#[derive(Debug, Clone)]
pub struct Assignment(AssignmentKind);

#[derive(Debug, Clone)]
enum AssignmentKind {
    Value(Value),
    Subquery(Box<Query>),
}

impl Assignment {
    /// Wraps a SELECT request as the assigned value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SubqueryAction`] for any other action.
    pub fn subquery(query: Query) -> Result<Self> {
        if query.action != Action::Select {
            return Err(Error::SubqueryAction {
                action: query.action.to_string(),
            });
        }
        Ok(Assignment(AssignmentKind::Subquery(Box::new(query))))
    }
}

impl From<Value> for Assignment {
    fn from(value: Value) -> Self {
        Assignment(AssignmentKind::Value(value))
    }
}

macro_rules! impl_assignment_from_scalar {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Assignment {
                fn from(v: $t) -> Self {
                    Assignment::from(Value::from(v))
                }
            }
        )*
    };
}

impl_assignment_from_scalar!(
    i8, i16, i32, i64, u8, u16, u32, f32, f64, bool, &str, String, Vec<u8>
);

impl<T: Into<Value>> From<Option<T>> for Assignment {
    fn from(v: Option<T>) -> Self {
        Assignment::from(Value::from(v))
    }
}

impl TryFrom<Query> for Assignment {
    type Error = Error;

    fn try_from(query: Query) -> Result<Self> {
        Assignment::subquery(query)
    }
}

/// A compiled statement: SQL text plus the parameters it references.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Params,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[derive(Debug, Clone)]
struct Join {
    table: Table,
    kind: JoinKind,
    // (target column, source column)
    on: Vec<(String, String)>,
}

/// One SQL statement in progress.
#[derive(Debug, Clone)]
pub struct Query {
    table: Table,
    action: Action,
    projection: Option<Projection>,
    assignments: Vec<(String, Assignment)>,
    joins: Vec<Join>,
    filter: Where,
    having: Where,
    group_by: Vec<String>,
    order_by: Vec<(String, Direction)>,
    limit: Option<u64>,
    offset: u64,
}

impl Query {
    pub fn new(table: &Table, action: Action) -> Self {
        Self {
            table: table.clone(),
            action,
            projection: None,
            assignments: Vec::new(),
            joins: Vec::new(),
            filter: Where::new(),
            having: Where::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Replaces the projection. Defaults to every declared column.
    #[must_use]
    pub fn columns(mut self, projection: impl Into<Projection>) -> Self {
        self.projection = Some(projection.into());
        self
    }

    /// Assigns `value` to `column` (INSERT / UPDATE).
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Assignment>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    #[must_use]
    pub fn set_all<I, K, V>(mut self, assignments: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Assignment>,
    {
        self.assignments
            .extend(assignments.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn and_where(mut self, condition: impl Condition) -> Self {
        condition.apply(&mut self.filter, Combinator::And);
        self
    }

    #[must_use]
    pub fn or_where(mut self, condition: impl Condition) -> Self {
        condition.apply(&mut self.filter, Combinator::Or);
        self
    }

    /// Adds a post-aggregation condition with AND. Only rendered for SELECT.
    #[must_use]
    pub fn having(mut self, condition: impl Condition) -> Self {
        condition.apply(&mut self.having, Combinator::And);
        self
    }

    #[must_use]
    pub fn or_having(mut self, condition: impl Condition) -> Self {
        condition.apply(&mut self.having, Combinator::Or);
        self
    }

    #[must_use]
    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Adds ORDER BY entries. A leading `-` sorts descending, a leading `+`
    /// or no prefix ascending.
    #[must_use]
    pub fn order_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for column in columns {
            let column = column.as_ref();
            let entry = match column.strip_prefix('-') {
                Some(rest) => (rest.to_owned(), Direction::Desc),
                None => (
                    column.strip_prefix('+').unwrap_or(column).to_owned(),
                    Direction::Asc,
                ),
            };
            self.order_by.push(entry);
        }
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Joins `target`, matching each `(target_column, source_column)` pair
    /// for equality.
    ///
    /// The joined table is aliased `j1`, `j2`, ... in join order; refer to
    /// its columns through that alias in projections and filters. An
    /// unqualified source column is qualified with this query's table.
    #[must_use]
    pub fn join<I, T, S>(mut self, target: &Table, kind: JoinKind, on: I) -> Self
    where
        I: IntoIterator<Item = (T, S)>,
        T: Into<String>,
        S: Into<String>,
    {
        self.joins.push(Join {
            table: target.clone(),
            kind,
            on: on.into_iter().map(|(t, s)| (t.into(), s.into())).collect(),
        });
        self
    }

    fn mode(&self) -> Mode {
        match self.action {
            Action::Select => Mode::Read,
            _ => Mode::Write,
        }
    }

    fn projected(&self) -> Projection {
        match &self.projection {
            Some(projection) => projection.clone(),
            None if self.joins.is_empty() => Projection::plain(self.table.columns()),
            // Qualify so joined tables sharing a column name stay unambiguous.
            None => {
                let table = self.table.name();
                Projection::aliased(
                    self.table
                        .columns()
                        .iter()
                        .map(|c| (c.clone(), format!("{table}.{c}"))),
                )
            }
        }
    }

    /// Compiles against the dialect of the pool this query runs on: the read
    /// pool for SELECT, the write pool otherwise.
    pub fn compile(&self) -> Result<Statement> {
        let dialect = self.table.dialect(self.mode())?;
        self.compile_with(dialect.as_ref())
    }

    /// Compiles against an explicit dialect.
    pub fn compile_with(&self, dialect: &dyn Dialect) -> Result<Statement> {
        self.compile_into(dialect, &mut Binder::new())
    }

    pub(crate) fn compile_into(
        &self,
        dialect: &dyn Dialect,
        binder: &mut Binder,
    ) -> Result<Statement> {
        let mut params = Params::new();
        let mut parts = StatementParts::new(self.action, self.table.name());

        if self.action == Action::Select {
            parts.columns = self.projected().0;
            let source = self.table.name();
            for join in &self.joins {
                let alias = binder.alias();
                let on = join
                    .on
                    .iter()
                    .map(|(target, src)| {
                        let src = if src.contains('.') {
                            src.clone()
                        } else {
                            format!("{source}.{src}")
                        };
                        (format!("{alias}.{target}"), src)
                    })
                    .collect();
                parts.joins.push(JoinClause {
                    kind: join.kind,
                    table: join.table.name().to_owned(),
                    alias,
                    on,
                });
            }
        }

        if matches!(self.action, Action::Insert | Action::Update) {
            for (column, assignment) in &self.assignments {
                let rendered = match &assignment.0 {
                    AssignmentKind::Value(value) => {
                        let name = binder.bind(value.clone(), &mut params)?;
                        dialect.placeholder(&name)
                    }
                    AssignmentKind::Subquery(query) => {
                        let nested = query.compile_into(dialect, binder)?;
                        params.merge(nested.params)?;
                        format!("({})", nested.sql)
                    }
                };
                parts.assignments.push((column.clone(), rendered));
            }
        }

        if self.action != Action::Insert {
            if let Some((sql, where_params)) = self.filter.render_with(dialect, binder)? {
                params.merge(where_params)?;
                parts.where_clause = Some(sql);
            }
        }

        if self.action == Action::Select {
            if let Some((sql, having_params)) = self.having.render_with(dialect, binder)? {
                params.merge(having_params)?;
                parts.having = Some(sql);
            }
            parts.group_by = self.group_by.clone();
            parts.order_by = self.order_by.clone();
            parts.limit = self.limit;
            parts.offset = self.offset;
        }

        let sql = dialect.compile_statement(&parts)?;
        Ok(Statement { sql, params })
    }

    pub fn to_sql(&self) -> Result<String> {
        Ok(self.compile()?.sql)
    }

    /// Every parameter the compiled statement references.
    pub fn params(&self) -> Result<Params> {
        Ok(self.compile()?.params)
    }

    /// Runs the statement on a write connection and commits it.
    ///
    /// Returns the number of affected rows. The connection goes back to its
    /// pool whether or not the statement succeeds.
    pub async fn execute(&self) -> Result<u64> {
        let statement = self.compile()?;
        let mut conn = self.table.acquire_connection(Mode::Write).await?;

        let outcome = run_write(&mut conn, &statement).await;
        if let Err(e) = &outcome {
            if e.is_connection_fatal() {
                conn.mark_broken();
            }
        }
        let released = self.table.release_connection(Mode::Write, conn).await;

        let affected = outcome?;
        released?;
        debug!(table = self.table.name(), action = %self.action, affected, "statement executed");
        Ok(affected)
    }

    /// Runs a SELECT and returns every row.
    pub async fn all(&self) -> Result<Vec<Row>> {
        let rows = self.fetch(Fetch::All).await?;
        let names = self.projected().names();
        Ok(rows
            .into_iter()
            .map(|raw| Row::new(self.table.clone(), &names, raw))
            .collect())
    }

    /// Runs a SELECT and returns its first row.
    pub async fn one(&self) -> Result<Option<Row>> {
        let mut rows = self.fetch(Fetch::One).await?;
        let names = self.projected().names();
        Ok(rows
            .pop()
            .map(|raw| Row::new(self.table.clone(), &names, raw)))
    }

    /// Counts the rows [`all`](Self::all) would return.
    pub async fn count(&self) -> Result<i64> {
        self.require_select()?;
        let rows = self.read(&self.compile_count()?, Fetch::One).await?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    // Grouping, HAVING and paging change how many rows come back, so those
    // queries are counted through a sub-select.
    fn compile_count(&self) -> Result<Statement> {
        let dialect = self.table.dialect(Mode::Read)?;
        let mut counting = self.clone();
        counting.order_by.clear();

        let shaped = !self.group_by.is_empty()
            || !self.having.is_empty()
            || self.limit.is_some()
            || self.offset > 0;
        if !shaped {
            counting.projection = Some(Projection::aliased([("count", "COUNT(*)")]));
            return counting.compile_with(dialect.as_ref());
        }

        let inner = counting.compile_with(dialect.as_ref())?;
        Ok(Statement {
            sql: dialect.count_rows(&inner.sql),
            params: inner.params,
        })
    }

    fn require_select(&self) -> Result<()> {
        if self.action != Action::Select {
            return Err(Error::InvalidStatement(format!(
                "only SELECT requests return rows, got {}",
                self.action
            )));
        }
        Ok(())
    }

    async fn fetch(&self, fetch: Fetch) -> Result<Vec<RawRow>> {
        self.require_select()?;
        self.read(&self.compile()?, fetch).await
    }

    async fn read(&self, statement: &Statement, fetch: Fetch) -> Result<Vec<RawRow>> {
        let mut conn = self.table.acquire_connection(Mode::Read).await?;

        let outcome = run_read(&mut conn, statement, fetch).await;
        if let Err(e) = &outcome {
            if e.is_connection_fatal() {
                conn.mark_broken();
            }
        }
        let released = self.table.release_connection(Mode::Read, conn).await;

        let rows = outcome?;
        released?;
        Ok(rows)
    }
}

#[derive(Debug, Clone, Copy)]
enum Fetch {
    One,
    All,
}

async fn run_write(conn: &mut PooledConnection, statement: &Statement) -> Result<u64> {
    conn.execute_query(&statement.sql, &statement.params).await?;
    conn.commit().await?;
    conn.affected_count().await
}

async fn run_read(
    conn: &mut PooledConnection,
    statement: &Statement,
    fetch: Fetch,
) -> Result<Vec<RawRow>> {
    conn.execute_query(&statement.sql, &statement.params).await?;
    match fetch {
        Fetch::One => Ok(conn.fetch_one().await?.into_iter().collect()),
        Fetch::All => conn.fetch_all().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::sqlite::{Sqlite, SqliteConnector};
    use crate::pool::{Pool, PoolConfig};
    use crate::predicate::Operand;
    use crate::settings::Databases;

    fn databases() -> Arc<Databases> {
        let pool = Pool::new(SqliteConnector::open_path(":memory:"), PoolConfig::new()).unwrap();
        Arc::new(Databases::new().with_pool("default", pool))
    }

    fn table(name: &str, columns: &[&str]) -> Table {
        Table::builder(name)
            .columns(columns.iter().copied())
            .build(&databases())
            .unwrap()
    }

    fn users() -> Table {
        table("users", &["id", "name", "age"])
    }

    #[test]
    fn bare_select() {
        assert_eq!(
            users().select().to_sql().unwrap(),
            "SELECT id, name, age FROM users"
        );
    }

    #[test]
    fn where_then_or_where() {
        let t = table("t", &["id", "name"]);
        let statement = t
            .select()
            .and_where([("name", "x")])
            .or_where([("age", 5)])
            .compile()
            .unwrap();
        assert_eq!(
            statement.sql,
            "SELECT id, name FROM t WHERE (name = :p1) OR (age = :p2)"
        );
        assert_eq!(statement.params.get("p1"), Some(&Value::from("x")));
        assert_eq!(statement.params.get("p2"), Some(&Value::from(5)));
    }

    #[test]
    fn full_select_clause_order() {
        let sql = users()
            .select()
            .columns(Projection::aliased([("n", "name"), ("total", "COUNT(*)")]))
            .and_where(("age", vec![30, 40]))
            .group_by(["name"])
            .having(("name", "ada"))
            .order_by(["-total", "+name", "age"])
            .limit(10)
            .offset(5)
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT name AS n, COUNT(*) AS total FROM users \
             WHERE age IN (:p1_0, :p1_1) GROUP BY name HAVING name = :p2 \
             ORDER BY total DESC, name ASC, age ASC LIMIT 10 OFFSET 5"
        );
    }

    #[test]
    fn joins_are_aliased_in_order() {
        let posts = table("posts", &["id", "author_id", "title"]);
        let tags = table("tags", &["id", "post_id"]);
        let sql = posts
            .select()
            .columns(["posts.title", "j1.name"])
            .join(&users(), JoinKind::Left, [("id", "author_id")])
            .join(&tags, JoinKind::Inner, [("post_id", "posts.id")])
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT posts.title, j1.name FROM posts \
             LEFT JOIN users AS j1 ON j1.id = posts.author_id \
             INNER JOIN tags AS j2 ON j2.post_id = posts.id"
        );
    }

    #[test]
    fn default_projection_is_qualified_with_joins() {
        let posts = table("posts", &["id", "title"]);
        let sql = posts
            .select()
            .join(&users(), JoinKind::Cross, Vec::<(String, String)>::new())
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT posts.id AS id, posts.title AS title FROM posts CROSS JOIN users AS j1"
        );
    }

    #[test]
    fn insert_update_delete() {
        let users = users();

        let insert = users.insert([("name", "ada")]).set("age", 36).compile().unwrap();
        assert_eq!(insert.sql, "INSERT INTO users (name, age) VALUES (:p1, :p2)");
        assert_eq!(insert.params.len(), 2);

        let update = users
            .update([("name", "grace")])
            .and_where(("id", 7))
            .compile()
            .unwrap();
        assert_eq!(update.sql, "UPDATE users SET name = :p1 WHERE id = :p2");
        assert_eq!(update.params.get("p2"), Some(&Value::from(7)));

        let delete = users.delete().and_where(("age", None::<i64>)).compile().unwrap();
        assert_eq!(delete.sql, "DELETE FROM users WHERE age IS NULL");
        assert!(delete.params.is_empty());
    }

    #[test]
    fn write_statements_ignore_select_clauses() {
        let sql = users()
            .delete()
            .and_where(("id", 1))
            .having(("name", "x"))
            .order_by(["name"])
            .limit(1)
            .to_sql()
            .unwrap();
        assert_eq!(sql, "DELETE FROM users WHERE id = :p1");
    }

    #[test]
    fn subquery_in_where_shares_numbering() {
        let posts = table("posts", &["id", "author_id"]);
        let authors = users().select().columns("id").and_where(("name", "ada"));
        let statement = posts
            .select()
            .and_where(("id", 3))
            .and_where(("author_id", Operand::subquery(authors).unwrap()))
            .compile()
            .unwrap();
        assert_eq!(
            statement.sql,
            "SELECT id, author_id FROM posts WHERE (id = :p1) AND \
             (author_id IN (SELECT id FROM users WHERE name = :p2))"
        );
        assert_eq!(statement.params.names().collect::<Vec<_>>(), ["p1", "p2"]);
    }

    #[test]
    fn subquery_assignment_is_inlined() {
        let users = users();
        let oldest = users.select().columns("MAX(age)").and_where(("name", "ada"));
        let statement = users
            .update([("name", Assignment::from("x"))])
            .set("age", Assignment::subquery(oldest).unwrap())
            .and_where(("id", 1))
            .compile()
            .unwrap();
        assert_eq!(
            statement.sql,
            "UPDATE users SET name = :p1, age = (SELECT MAX(age) FROM users WHERE name = :p2) \
             WHERE id = :p3"
        );
        assert_eq!(statement.params.len(), 3);
    }

    #[test]
    fn only_select_can_be_a_subquery() {
        let users = users();
        let update = users.update([("name", "x")]);
        assert!(matches!(
            Operand::try_from(update.clone()),
            Err(Error::SubqueryAction { action }) if action == "UPDATE"
        ));
        assert!(matches!(
            Assignment::try_from(users.delete()),
            Err(Error::SubqueryAction { .. })
        ));
    }

    #[test]
    fn independently_built_filters_merge_without_collisions() {
        let left = Where::new().and_where([("name", "a"), ("age", "b")]);
        let right = Where::new().and_where([("name", "c"), ("age", "d")]);
        let params = users()
            .select()
            .and_where(left.append_or(right))
            .params()
            .unwrap();
        assert_eq!(params.names().collect::<Vec<_>>(), ["p1", "p2", "p3", "p4"]);
    }

    #[test]
    fn compile_with_explicit_dialect() {
        let statement = users().delete().compile_with(&Sqlite).unwrap();
        assert_eq!(statement.to_string(), "DELETE FROM users");
    }

    #[test]
    fn update_without_assignments_is_invalid() {
        assert!(matches!(
            users().update(Vec::<(&str, Value)>::new()).to_sql(),
            Err(Error::InvalidStatement(_))
        ));
    }

    #[test]
    fn plain_count_replaces_the_projection() {
        let statement = users()
            .select()
            .and_where(("name", "ada"))
            .order_by(["-age"])
            .compile_count()
            .unwrap();
        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) AS count FROM users WHERE name = :p1"
        );
        assert_eq!(statement.params.len(), 1);
    }

    #[test]
    fn paged_or_grouped_count_wraps_a_sub_select() {
        let users = users();
        assert_eq!(
            users.select().offset(2).order_by(["age"]).compile_count().unwrap().sql,
            "SELECT COUNT(*) FROM (SELECT id, name, age FROM users LIMIT -1 OFFSET 2) AS counted"
        );

        let grouped = users
            .select()
            .columns("age")
            .group_by(["age"])
            .having(("age", vec![30, 40]))
            .compile_count()
            .unwrap();
        assert_eq!(
            grouped.sql,
            "SELECT COUNT(*) FROM (SELECT age FROM users GROUP BY age \
             HAVING age IN (:p1_0, :p1_1)) AS counted"
        );
        assert_eq!(grouped.params.len(), 2);
    }

    #[tokio::test]
    async fn rows_are_only_fetched_for_select() {
        let err = users().delete().all().await.unwrap_err();
        assert!(matches!(err, Error::InvalidStatement(_)));
        let err = users().update([("name", "x")]).count().await.unwrap_err();
        assert!(matches!(err, Error::InvalidStatement(_)));
    }
}
