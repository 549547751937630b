//! Named pool registry and the database settings it is built from.
//!
//! [`Databases`] maps pool names to [`Pool`]s. It is built once at start-up
//! and shared by `Arc` with every [`Table`](crate::table::Table) that needs
//! it. Nothing in this crate looks pools up through global state.
//!
//! ## Settings format
//!
//! ```json
//! {
//!     "default": {
//!         "backend": { "type": "sqlite", "options": { "path": "app.db" } },
//!         "lifetime": 3600,
//!         "pool_size": 10
//!     }
//! }
//! ```
//!
//! `lifetime` is in seconds (`0`, the default, never recycles) and
//! `pool_size` defaults to 10.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::backend::Connector;
use crate::backend::sqlite::{SqliteConnector, SqliteOptions};
use crate::error::{Error, Result};
use crate::pool::{DEFAULT_POOL_SIZE, Pool, PoolConfig};

/// Name of the pool tables use when they do not bind one explicitly.
pub const DEFAULT_POOL: &str = "default";

/// Which engine a pool connects to, with its connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "options", rename_all = "lowercase")]
pub enum BackendSettings {
    Sqlite(SqliteOptions),
}

impl BackendSettings {
    pub fn connector(&self) -> Arc<dyn Connector> {
        match self {
            BackendSettings::Sqlite(options) => Arc::new(SqliteConnector::new(options.clone())),
        }
    }
}

/// Settings of one named pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolSettings {
    pub backend: BackendSettings,

    /// Connection lifetime in seconds; `0` never recycles.
    #[serde(default)]
    pub lifetime: u64,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

impl PoolSettings {
    pub fn config(&self) -> PoolConfig {
        PoolConfig::new()
            .size(self.pool_size)
            .lifetime(Duration::from_secs(self.lifetime))
    }

    /// Builds the pool these settings describe. No connection is opened yet.
    pub fn build(&self) -> Result<Pool> {
        Pool::with_connector(self.backend.connector(), self.config())
    }
}

/// Registry of named connection pools.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rttp_db::settings::Databases;
///
/// let databases = Databases::from_json(r#"{
///     "default": { "backend": { "type": "sqlite", "options": { "path": "app.db" } } }
/// }"#)?;
/// let databases = Arc::new(databases);
/// assert!(databases.get("default").is_ok());
/// # Ok::<(), rttp_db::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct Databases {
    pools: HashMap<String, Pool>,
}

impl Databases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pool` under `name`, replacing any previous pool of that name.
    #[must_use]
    pub fn with_pool(mut self, name: impl Into<String>, pool: Pool) -> Self {
        self.insert(name, pool);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, pool: Pool) -> Option<Pool> {
        self.pools.insert(name.into(), pool)
    }

    /// Builds one pool per settings entry.
    pub fn from_settings(settings: HashMap<String, PoolSettings>) -> Result<Self> {
        let mut databases = Self::new();
        for (name, pool_settings) in settings {
            let pool = pool_settings.build().map_err(|e| match e {
                Error::InvalidConfig(msg) => Error::InvalidConfig(format!("pool `{name}`: {msg}")),
                other => other,
            })?;
            info!(
                pool = %name,
                size = pool.capacity(),
                lifetime = ?pool.lifetime(),
                "database pool configured"
            );
            databases.insert(name, pool);
        }
        Ok(databases)
    }

    /// Parses a JSON settings object and builds its pools.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: HashMap<String, PoolSettings> = serde_json::from_str(json)?;
        Self::from_settings(settings)
    }

    /// The pool registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPool`] if no pool has that name.
    pub fn get(&self, name: &str) -> Result<&Pool> {
        self.pools.get(name).ok_or_else(|| Error::UnknownPool {
            name: name.to_owned(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Closes every registered pool.
    pub async fn close(&self) {
        for pool in self.pools.values() {
            pool.close().await;
        }
    }
}
