//! Materialized result rows that can write themselves back.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::backend::{Action, RawRow};
use crate::error::{Error, Result};
use crate::query::Query;
use crate::table::Table;
use crate::value::Value;

/// One fetched row: column name to value, in projection order.
///
/// The primary-key value is captured when the row is fetched, so
/// [`save`](Self::save) and [`delete`](Self::delete) address the stored row
/// even after the key column has been changed with [`set`](Self::set).
///
/// ```rust,no_run
/// # async fn example(users: rttp_db::Table) -> rttp_db::Result<()> {
/// if let Some(mut user) = users.select().and_where(("id", 1)).one().await? {
///     user.set("name", "grace");
///     user.save().await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Row {
    table: Table,
    data: IndexMap<String, Value>,
    key: Option<Value>,
}

impl Row {
    /// Zips `columns` with the values of `raw`.
    pub fn new(table: Table, columns: &[String], raw: RawRow) -> Self {
        let data: IndexMap<String, Value> = columns.iter().cloned().zip(raw).collect();
        let key = data.get(table.primary_key()).cloned();
        Self { table, data, key }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.data.get(column)
    }

    /// Sets `column`, returning its previous value. Changes are only stored
    /// by [`save`](Self::save).
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.data.insert(column.into(), value.into())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn key(&self) -> Result<&Value> {
        self.key.as_ref().ok_or_else(|| Error::PrimaryKeyMissing {
            table: self.table.name().to_owned(),
            column: self.table.primary_key().to_owned(),
        })
    }

    /// The UPDATE [`save`](Self::save) runs: every held table column, keyed
    /// on the captured primary key.
    pub fn save_query(&self) -> Result<Query> {
        let key = self.key()?.clone();
        let assignments = self
            .data
            .iter()
            .filter(|(column, _)| self.table.has_column(column))
            .map(|(column, value)| (column.clone(), value.clone()));
        Ok(Query::new(&self.table, Action::Update)
            .set_all(assignments)
            .and_where((self.table.primary_key(), key)))
    }

    /// The DELETE [`delete`](Self::delete) runs.
    pub fn delete_query(&self) -> Result<Query> {
        let key = self.key()?.clone();
        Ok(Query::new(&self.table, Action::Delete).and_where((self.table.primary_key(), key)))
    }

    /// Writes the row back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PrimaryKeyMissing`] if the row was fetched without
    /// its primary key.
    pub async fn save(&mut self) -> Result<u64> {
        let affected = self.save_query()?.execute().await?;
        if let Some(key) = self.data.get(self.table.primary_key()) {
            self.key = Some(key.clone());
        }
        Ok(affected)
    }

    /// Deletes the stored row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PrimaryKeyMissing`] if the row was fetched without
    /// its primary key.
    pub async fn delete(&self) -> Result<u64> {
        self.delete_query()?.execute().await
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.data.serialize(serializer)
    }
}
