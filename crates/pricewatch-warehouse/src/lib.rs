//! # Pricewatch Warehouse
//!
//! DuckDB-based state storage for pricewatch.
//!
//! ## Overview
//!
//! The poller treats persistence as an opaque key-value store: every key holds
//! one JSON document that is read and written wholesale. This crate provides
//! that store on top of a single `kv_state` table.
//!
//! ### Features
//!
//! - **Wholesale JSON values**: one document per key, no partial updates
//! - **Batched writes**: [`StateWarehouse::set_many`] commits several keys in one transaction
//! - **Connection pooling**: cloned connections share one database instance
//! - **Versioned migrations**: schema changes are tracked in `schema_migrations`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pricewatch_warehouse::StateWarehouse;
//! use serde_json::json;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = StateWarehouse::open_default()?;
//!     warehouse.set("refreshInterval", &json!(15))?;
//!     assert_eq!(warehouse.get("refreshInterval")?, Some(json!(15)));
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `kv_state` | One JSON document per state key |
//! | `schema_migrations` | Applied migration versions |

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::params;
use serde_json::Value;
use thiserror::Error;

pub use duckdb::{DuckDbConnectionManager, PooledConnection};

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A stored value could not be decoded as JSON.
    #[error("stored value for key '{key}' is not valid JSON: {source}")]
    CorruptValue {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded for storage.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Configuration for the state database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for pricewatch data.
    pub pricewatch_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::for_home(resolve_pricewatch_home())
    }
}

impl WarehouseConfig {
    /// Configuration rooted at an explicit home directory.
    pub fn for_home(home: impl Into<PathBuf>) -> Self {
        let pricewatch_home = home.into();
        let db_path = pricewatch_home.join("state").join("pricewatch.duckdb");
        Self {
            pricewatch_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// Key-value state store backed by `DuckDB`.
#[derive(Clone)]
pub struct StateWarehouse {
    manager: DuckDbConnectionManager,
}

impl StateWarehouse {
    /// Open the warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open the warehouse with the specified configuration.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::open(config.db_path.clone(), config.max_pool_size)?;
        let warehouse = Self { manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Initialize the database schema.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    /// Get the path to the database file.
    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// Read the JSON document stored under `key`.
    pub fn get(&self, key: &str) -> Result<Option<Value>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare("SELECT value FROM kv_state WHERE key = ?")?;
        let mut rows = statement.query(params![key])?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let raw: String = row.get(0)?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| WarehouseError::CorruptValue {
                key: key.to_owned(),
                source,
            })
    }

    /// Replace the document stored under `key`.
    pub fn set(&self, key: &str, value: &Value) -> Result<(), WarehouseError> {
        self.set_many(&[(key, value.clone())])
    }

    /// Replace several documents atomically.
    ///
    /// Either every key is written or none is.
    pub fn set_many(&self, entries: &[(&str, Value)]) -> Result<(), WarehouseError> {
        if entries.is_empty() {
            return Ok(());
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            for (key, value) in entries {
                let encoded = serde_json::to_string(value)?;
                connection.execute(
                    "INSERT INTO kv_state (key, value) VALUES (?, ?) \
                     ON CONFLICT (key) DO UPDATE SET value = excluded.value, \
                     updated_at = CURRENT_TIMESTAMP",
                    params![*key, encoded],
                )?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                connection.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(error) => {
                let _ = connection.execute_batch("ROLLBACK");
                Err(error)
            }
        }
    }

    /// Delete every stored document.
    pub fn clear(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        connection.execute_batch("DELETE FROM kv_state")?;
        Ok(())
    }

    /// List stored keys in lexical order.
    pub fn keys(&self) -> Result<Vec<String>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare("SELECT key FROM kv_state ORDER BY key")?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn resolve_pricewatch_home() -> PathBuf {
    if let Some(path) = env::var_os("PRICEWATCH_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".pricewatch");
    }

    PathBuf::from(".pricewatch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open_temp() -> (tempfile::TempDir, StateWarehouse) {
        let dir = tempfile::tempdir().expect("tempdir");
        let warehouse =
            StateWarehouse::open(WarehouseConfig::for_home(dir.path())).expect("open warehouse");
        (dir, warehouse)
    }

    #[test]
    fn missing_key_reads_as_none() {
        let (_dir, warehouse) = open_temp();
        assert_eq!(warehouse.get("tokens").expect("get"), None);
    }

    #[test]
    fn set_overwrites_wholesale() {
        let (_dir, warehouse) = open_temp();
        warehouse
            .set("apiConfigs", &json!({"binance": {"enabled": true}}))
            .expect("first set");
        warehouse
            .set("apiConfigs", &json!({"coingecko": {"enabled": false}}))
            .expect("second set");

        assert_eq!(
            warehouse.get("apiConfigs").expect("get"),
            Some(json!({"coingecko": {"enabled": false}}))
        );
    }

    #[test]
    fn set_many_writes_every_key() {
        let (_dir, warehouse) = open_temp();
        warehouse
            .set_many(&[
                ("refreshInterval", json!(30)),
                ("hasCompletedSetup", json!(true)),
            ])
            .expect("batch write");

        assert_eq!(
            warehouse.keys().expect("keys"),
            vec![String::from("hasCompletedSetup"), String::from("refreshInterval")]
        );
    }

    #[test]
    fn clear_deletes_every_document() {
        let (_dir, warehouse) = open_temp();
        warehouse.set("a", &json!(1)).expect("set a");
        warehouse.set("b", &json!(2)).expect("set b");
        assert_eq!(warehouse.keys().expect("keys").len(), 2);

        warehouse.clear().expect("clear");
        assert!(warehouse.keys().expect("keys").is_empty());
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let warehouse = StateWarehouse::open(WarehouseConfig::for_home(dir.path()))
                .expect("open warehouse");
            warehouse.set("refreshInterval", &json!(12)).expect("set");
        }

        let reopened =
            StateWarehouse::open(WarehouseConfig::for_home(dir.path())).expect("reopen warehouse");
        assert_eq!(reopened.get("refreshInterval").expect("get"), Some(json!(12)));

        let connection = reopened.manager.acquire().expect("connection");
        assert_eq!(
            migrations::applied_versions(&connection).expect("versions"),
            vec![String::from("0001_kv_state")]
        );
    }
}
