//! Composable WHERE / HAVING predicates.
//!
//! A [`Where`] is a binary tree of AND / OR nodes over leaf comparisons. The
//! comparison of a leaf is picked from the shape of its [`Operand`]:
//!
//! | Operand                         | Rendered (SQLite)           |
//! |---------------------------------|-----------------------------|
//! | scalar (`5`, `"x"`)             | `col = :p1`                 |
//! | list (`vec![1, 2]`)             | `col IN (:p1_0, :p1_1)`     |
//! | null (`None`, `Value::Null`)    | `col IS NULL`               |
//! | SELECT request                  | `col IN (SELECT ...)`       |
//!
//! Adding leaves to a tree folds them left: the first leaf becomes the root
//! and every later leaf is combined with `(tree, leaf)`. Both sides of every
//! combination are parenthesized, so precedence never depends on nesting.
//!
//! Parameter names are not stored in the tree. They are allocated when the
//! statement that owns the tree is compiled, from one counter shared by the
//! whole statement, so independently built trees can be merged freely.

use std::fmt;

use crate::backend::{Action, Dialect, Leaf};
use crate::error::{Error, Result};
use crate::query::Query;
use crate::value::{Binder, Params, Value};

/// How a new condition joins the existing tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

/// The right-hand side of one leaf comparison.
///
/// Built with `From` for scalars, `Option`s and lists, and with `TryFrom` for
/// sub-selects:
///
/// ```
/// use rttp_db::Operand;
///
/// let by_name = Operand::from("ada");
/// let in_list = Operand::from(vec![1, 2, 3]);
/// let missing = Operand::from(None::<i64>);
/// ```
#[derive(Debug, Clone)]
pub struct Operand(OperandKind);

#[derive(Debug, Clone)]
enum OperandKind {
    Scalar(Value),
    List(Vec<Value>),
    Null,
    Subquery(Box<Query>),
}

impl Operand {
    /// Wraps a SELECT request as a sub-select operand.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SubqueryAction`] for any other action.
    pub fn subquery(query: Query) -> Result<Self> {
        if query.action() != Action::Select {
            return Err(Error::SubqueryAction {
                action: query.action().to_string(),
            });
        }
        Ok(Operand(OperandKind::Subquery(Box::new(query))))
    }

    pub fn is_null(&self) -> bool {
        matches!(self.0, OperandKind::Null)
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Operand(OperandKind::Null),
            value => Operand(OperandKind::Scalar(value)),
        }
    }
}

macro_rules! impl_operand_from_scalar {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Operand {
                fn from(v: $t) -> Self {
                    Operand::from(Value::from(v))
                }
            }
        )*
    };
}

impl_operand_from_scalar!(i8, i16, i32, i64, u8, u16, u32, f32, f64, bool, &str, String);

impl<T: Into<Value>> From<Option<T>> for Operand {
    fn from(v: Option<T>) -> Self {
        Operand::from(Value::from(v))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Operand {
    fn from(values: Vec<T>) -> Self {
        Operand(OperandKind::List(values.into_iter().map(Into::into).collect()))
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Operand {
    fn from(values: [T; N]) -> Self {
        Operand(OperandKind::List(values.into_iter().map(Into::into).collect()))
    }
}

impl TryFrom<Query> for Operand {
    type Error = Error;

    fn try_from(query: Query) -> Result<Self> {
        Operand::subquery(query)
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf { column: String, operand: OperandKind },
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

impl Node {
    fn join(left: Node, right: Node, op: Combinator) -> Node {
        match op {
            Combinator::And => Node::And(Box::new(left), Box::new(right)),
            Combinator::Or => Node::Or(Box::new(left), Box::new(right)),
        }
    }

    fn leaves(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::And(l, r) | Node::Or(l, r) => l.leaves() + r.leaves(),
        }
    }

    fn render(&self, dialect: &dyn Dialect, binder: &mut Binder) -> Result<(String, Params)> {
        match self {
            Node::Leaf { column, operand } => {
                let mut params = Params::new();
                let sql = match operand {
                    OperandKind::Scalar(value) => {
                        let param = binder.bind(value.clone(), &mut params)?;
                        dialect.render_leaf(column, Leaf::Equality { param: &param })
                    }
                    OperandKind::List(values) => {
                        let names = binder.bind_list(values, &mut params)?;
                        dialect.render_leaf(column, Leaf::Membership { params: &names })
                    }
                    OperandKind::Null => dialect.render_leaf(column, Leaf::IsNull),
                    OperandKind::Subquery(query) => {
                        let statement = query.compile_into(dialect, binder)?;
                        params.merge(statement.params)?;
                        dialect.render_leaf(column, Leaf::Subquery { sql: &statement.sql })
                    }
                };
                Ok((sql, params))
            }
            Node::And(left, right) | Node::Or(left, right) => {
                let (left_sql, mut params) = left.render(dialect, binder)?;
                let (right_sql, right_params) = right.render(dialect, binder)?;
                params.merge(right_params)?;
                let sql = if matches!(self, Node::And(..)) {
                    dialect.combine_and(&left_sql, &right_sql)
                } else {
                    dialect.combine_or(&left_sql, &right_sql)
                };
                Ok((sql, params))
            }
        }
    }
}

/// Something that can be added to a [`Where`]: column/operand pairs or a
/// prebuilt tree.
pub trait Condition {
    /// Folds `self` into `target` with `op`.
    fn apply(self, target: &mut Where, op: Combinator);
}

impl<K: Into<String>, V: Into<Operand>> Condition for (K, V) {
    fn apply(self, target: &mut Where, op: Combinator) {
        target.push(self.0.into(), self.1.into(), op);
    }
}

impl<K: Into<String>, V: Into<Operand>> Condition for Vec<(K, V)> {
    fn apply(self, target: &mut Where, op: Combinator) {
        for (column, operand) in self {
            target.push(column.into(), operand.into(), op);
        }
    }
}

impl<K: Into<String>, V: Into<Operand>, const N: usize> Condition for [(K, V); N] {
    fn apply(self, target: &mut Where, op: Combinator) {
        for (column, operand) in self {
            target.push(column.into(), operand.into(), op);
        }
    }
}

impl Condition for Where {
    fn apply(self, target: &mut Where, op: Combinator) {
        target.merge(self, op);
    }
}

/// A boolean predicate tree.
///
/// # Examples
///
/// ```
/// use rttp_db::{Operand, Where};
/// use rttp_db::backend::sqlite::Sqlite;
///
/// let filter = Where::new()
///     .and_where([("name", Operand::from("ada"))])
///     .or_where([("age", Operand::from(36))]);
///
/// let (sql, params) = filter.render(&Sqlite).unwrap().unwrap();
/// assert_eq!(sql, "(name = :p1) OR (age = :p2)");
/// assert_eq!(params.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Where {
    root: Option<Node>,
}

impl Where {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `condition` with AND.
    #[must_use]
    pub fn and_where(mut self, condition: impl Condition) -> Self {
        condition.apply(&mut self, Combinator::And);
        self
    }

    /// Adds `condition` with OR.
    #[must_use]
    pub fn or_where(mut self, condition: impl Condition) -> Self {
        condition.apply(&mut self, Combinator::Or);
        self
    }

    /// Combines this tree with `other` as `(self) AND (other)`.
    #[must_use]
    pub fn append(mut self, other: Where) -> Self {
        self.merge(other, Combinator::And);
        self
    }

    /// Combines this tree with `other` as `(self) OR (other)`.
    #[must_use]
    pub fn append_or(mut self, other: Where) -> Self {
        self.merge(other, Combinator::Or);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of leaf comparisons in the tree.
    pub fn len(&self) -> usize {
        self.root.as_ref().map_or(0, Node::leaves)
    }

    /// Renders the tree on its own, numbering parameters from `p1`.
    /// Returns `None` for an empty tree.
    pub fn render(&self, dialect: &dyn Dialect) -> Result<Option<(String, Params)>> {
        self.render_with(dialect, &mut Binder::new())
    }

    pub(crate) fn render_with(
        &self,
        dialect: &dyn Dialect,
        binder: &mut Binder,
    ) -> Result<Option<(String, Params)>> {
        self.root
            .as_ref()
            .map(|root| root.render(dialect, binder))
            .transpose()
    }

    pub(crate) fn push(&mut self, column: String, operand: Operand, op: Combinator) {
        let leaf = Node::Leaf {
            column,
            operand: operand.0,
        };
        self.root = Some(match self.root.take() {
            None => leaf,
            Some(root) => Node::join(root, leaf, op),
        });
    }

    pub(crate) fn merge(&mut self, other: Where, op: Combinator) {
        let Some(other) = other.root else {
            return;
        };
        self.root = Some(match self.root.take() {
            None => other,
            Some(root) => Node::join(root, other, op),
        });
    }
}

impl fmt::Display for Where {
    /// Renders with the SQLite dialect, for logs and debugging.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render(&crate::backend::sqlite::Sqlite) {
            Ok(Some((sql, _))) => f.write_str(&sql),
            Ok(None) => Ok(()),
            Err(e) => write!(f, "<{e}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sqlite::Sqlite;

    fn render(filter: &Where) -> (String, Params) {
        filter.render(&Sqlite).unwrap().unwrap()
    }

    #[test]
    fn empty_tree_renders_nothing() {
        let filter = Where::new();
        assert!(filter.is_empty());
        assert!(filter.render(&Sqlite).unwrap().is_none());
        assert_eq!(filter.to_string(), "");
    }

    #[test]
    fn single_leaf_is_not_parenthesized() {
        let (sql, params) = render(&Where::new().and_where(("id", 1)));
        assert_eq!(sql, "id = :p1");
        assert_eq!(params.get("p1"), Some(&Value::Integer(1)));
    }

    #[test]
    fn and_then_or() {
        let filter = Where::new()
            .and_where([("name", Operand::from("x"))])
            .or_where([("age", Operand::from(5))]);
        let (sql, params) = render(&filter);
        assert_eq!(sql, "(name = :p1) OR (age = :p2)");
        assert_eq!(params.get("p1"), Some(&Value::Text("x".into())));
        assert_eq!(params.get("p2"), Some(&Value::Integer(5)));
    }

    #[test]
    fn pairs_fold_left() {
        let filter = Where::new().or_where([("a", 1), ("b", 2), ("c", 3)]);
        assert_eq!(filter.len(), 3);
        assert_eq!(
            render(&filter).0,
            "((a = :p1) OR (b = :p2)) OR (c = :p3)"
        );
    }

    #[test]
    fn operand_shapes() {
        let filter = Where::new()
            .and_where(("deleted_at", None::<i64>))
            .and_where(("id", vec![1, 2]))
            .and_where(("kind", Value::Null));
        let (sql, params) = render(&filter);
        assert_eq!(
            sql,
            "((deleted_at IS NULL) AND (id IN (:p1_0, :p1_1))) AND (kind IS NULL)"
        );
        assert_eq!(params.names().collect::<Vec<_>>(), vec!["p1_0", "p1_1"]);
    }

    #[test]
    fn independently_built_trees_never_collide() {
        let left = Where::new().and_where([("a", 1), ("b", 2)]);
        let right = Where::new().and_where([("c", 3), ("d", 4)]);
        let (sql, params) = render(&left.append_or(right));
        assert_eq!(
            sql,
            "((a = :p1) AND (b = :p2)) OR ((c = :p3) AND (d = :p4))"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn mixed_appends_are_left_associative() {
        let a = Where::new().and_where(("a", 1));
        let b = Where::new().and_where(("b", 2));
        let c = Where::new().and_where(("c", 3));
        let (sql, _) = render(&a.append(b).append_or(c));
        assert_eq!(sql, "((a = :p1) AND (b = :p2)) OR (c = :p3)");
    }

    #[test]
    fn append_to_empty_takes_other_tree() {
        let other = Where::new().and_where(("a", 1));
        let (sql, _) = render(&Where::new().append_or(other));
        assert_eq!(sql, "a = :p1");

        let filter = Where::new().and_where(("a", 1)).append(Where::new());
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn prebuilt_tree_is_a_condition() {
        let inner = Where::new().or_where([("a", 1), ("b", 2)]);
        let filter = Where::new().and_where(("c", 3)).and_where(inner);
        assert_eq!(
            render(&filter).0,
            "(c = :p1) AND ((a = :p2) OR (b = :p3))"
        );
    }

    #[test]
    fn display_uses_sqlite_syntax() {
        let filter = Where::new().and_where(("id", 7));
        assert_eq!(filter.to_string(), "id = :p1");
    }
}
