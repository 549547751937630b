//! Scalar values and named parameter bags.
//!
//! [`Value`] is the only data type that crosses the backend boundary: bound
//! parameters go in as values and fetched columns come back as values.
//! [`Params`] is the ordered `name → value` bag attached to one compiled
//! statement.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single SQL scalar.
///
/// # Examples
///
/// ```
/// use rttp_db::Value;
///
/// assert_eq!(Value::from(5), Value::Integer(5));
/// assert_eq!(Value::from("x"), Value::Text("x".into()));
/// assert_eq!(Value::from(None::<i64>), Value::Null);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as an integer. Booleans map to `0` / `1`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Integer(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(f64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Named parameters bound to one statement, in binding order.
///
/// Names are unique: binding a name twice, or merging two bags that share a
/// name, fails with [`Error::ParameterCollision`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Params {
    values: IndexMap<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `value` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParameterCollision`] if `name` is already bound.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) -> Result<()> {
        let name = name.into();
        if self.values.contains_key(&name) {
            return Err(Error::ParameterCollision { name });
        }
        self.values.insert(name, value);
        Ok(())
    }

    /// Moves every parameter of `other` into this bag.
    ///
    /// The bag is left untouched when any name collides.
    pub fn merge(&mut self, other: Params) -> Result<()> {
        if let Some(name) = other.values.keys().find(|k| self.values.contains_key(*k)) {
            return Err(Error::ParameterCollision { name: name.clone() });
        }
        self.values.extend(other.values);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl IntoIterator for Params {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// Allocates statement-unique parameter names (`p1`, `p2`, ...) and join
/// aliases (`j1`, `j2`, ...).
///
/// One binder is threaded through the compilation of a whole statement,
/// sub-selects included, so names never depend on which tree produced them.
#[derive(Debug, Default)]
pub(crate) struct Binder {
    next: usize,
    next_alias: usize,
}

impl Binder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alias(&mut self) -> String {
        self.next_alias += 1;
        format!("j{}", self.next_alias)
    }

    /// Binds one value under a fresh name and returns the name.
    pub(crate) fn bind(&mut self, value: Value, params: &mut Params) -> Result<String> {
        self.next += 1;
        let name = format!("p{}", self.next);
        params.bind(name.clone(), value)?;
        Ok(name)
    }

    /// Binds every element of a list under `p<n>_<i>` names.
    pub(crate) fn bind_list(&mut self, values: &[Value], params: &mut Params) -> Result<Vec<String>> {
        self.next += 1;
        let base = self.next;
        values
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let name = format!("p{base}_{i}");
                params.bind(name.clone(), value.clone())?;
                Ok(name)
            })
            .collect()
    }
}
