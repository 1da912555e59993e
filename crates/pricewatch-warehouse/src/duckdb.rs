//! `DuckDB` connection pool management.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ::duckdb::Connection;

struct PoolInner {
    db_path: PathBuf,
    max_pool_size: usize,
    /// Every pooled connection is cloned from this one so they all share a
    /// single database instance and its file lock.
    root: Mutex<Connection>,
    idle: Mutex<Vec<Connection>>,
}

/// A connection pool manager for `DuckDB` connections.
#[derive(Clone)]
pub struct DuckDbConnectionManager {
    inner: Arc<PoolInner>,
}

impl DuckDbConnectionManager {
    /// Open the database file and create a pool around it.
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened or configured.
    pub fn open(path: impl Into<PathBuf>, max_pool_size: usize) -> Result<Self, ::duckdb::Error> {
        let db_path = path.into();
        let root = Connection::open(&db_path)?;
        configure_connection(&root)?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                db_path,
                max_pool_size: max_pool_size.max(1),
                root: Mutex::new(root),
                idle: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Acquire a connection from the pool.
    ///
    /// # Errors
    /// Returns an error if a fresh connection cannot be cloned from the root.
    ///
    /// # Panics
    /// Panics if a pool mutex is poisoned.
    pub fn acquire(&self) -> Result<PooledConnection, ::duckdb::Error> {
        let idle = self
            .inner
            .idle
            .lock()
            .expect("duckdb connection pool mutex poisoned")
            .pop();

        let connection = match idle {
            Some(connection) => connection,
            None => {
                let root = self
                    .inner
                    .root
                    .lock()
                    .expect("duckdb root connection mutex poisoned");
                let connection = root.try_clone()?;
                configure_connection(&connection)?;
                connection
            }
        };

        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.inner.db_path.as_path()
    }

    /// Number of idle connections currently held by the pool.
    #[must_use]
    pub fn idle_len(&self) -> usize {
        self.inner
            .idle
            .lock()
            .expect("duckdb connection pool mutex poisoned")
            .len()
    }
}

/// A pooled connection that returns to the pool when dropped.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("pooled connection unexpectedly missing")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("pooled connection unexpectedly missing")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let mut idle = self
            .pool
            .idle
            .lock()
            .expect("duckdb connection pool mutex poisoned");
        if idle.len() < self.pool.max_pool_size {
            idle.push(connection);
        }
    }
}

fn configure_connection(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")?;
    Ok(())
}
