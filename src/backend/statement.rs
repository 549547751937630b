//! Dialect-neutral shape of one SQL statement.
//!
//! The query builder lowers a [`Query`](crate::query::Query) into
//! [`StatementParts`]: every predicate is already rendered into a fragment and
//! every value is already a placeholder. A [`Dialect`](super::Dialect) then
//! only has to glue the parts together with its statement templates.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The kind of statement a request produces.
///
/// # Examples
///
/// ```
/// use rttp_db::Action;
///
/// let action: Action = "select".parse().unwrap();
/// assert_eq!(action, Action::Select);
/// assert!("MERGE".parse::<Action>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Select,
    Insert,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SELECT" => Ok(Self::Select),
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(Error::UnsupportedAction {
                action: s.to_owned(),
            }),
        }
    }
}

/// Join flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinKind {
    Inner,
    #[default]
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Full => "FULL",
            Self::Cross => "CROSS",
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction of one ORDER BY entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One projected column: `expr AS alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    pub expr: String,
    pub alias: String,
}

/// One rendered join.
///
/// `on` holds `(left, right)` operands that are already qualified, e.g.
/// `("j1.user_id", "users.id")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    pub on: Vec<(String, String)>,
}

/// Everything a dialect needs to render one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementParts {
    pub action: Action,
    pub table: String,
    pub columns: Vec<SelectColumn>,
    pub joins: Vec<JoinClause>,
    /// `(column, rendered value)` pairs for INSERT / UPDATE.
    pub assignments: Vec<(String, String)>,
    pub where_clause: Option<String>,
    pub group_by: Vec<String>,
    pub having: Option<String>,
    pub order_by: Vec<(String, Direction)>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl StatementParts {
    /// Empty parts for `action` on `table`.
    pub fn new(action: Action, table: impl Into<String>) -> Self {
        Self {
            action,
            table: table.into(),
            columns: Vec::new(),
            joins: Vec::new(),
            assignments: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_parse_is_case_insensitive() {
        assert_eq!("Update".parse::<Action>().unwrap(), Action::Update);
        assert_eq!("delete".parse::<Action>().unwrap(), Action::Delete);
        assert_eq!("INSERT".parse::<Action>().unwrap(), Action::Insert);
    }

    #[test]
    fn action_parse_rejects_unknown() {
        let err = "UPSERT".parse::<Action>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedAction { action } if action == "UPSERT"));
    }

    #[test]
    fn defaults() {
        assert_eq!(JoinKind::default(), JoinKind::Left);
        assert_eq!(Direction::default().as_str(), "ASC");
        let parts = StatementParts::new(Action::Select, "users");
        assert!(parts.limit.is_none());
        assert_eq!(parts.offset, 0);
    }
}
