use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use pricewatch_warehouse::StateWarehouse;
use serde_json::Value;

use crate::StoreError;

/// Opaque persistent store: whole JSON documents per key.
pub trait KeyValueStore: Send + Sync {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Value>, StoreError>> + Send + 'a>>;

    /// Writes every entry in one batch.
    fn set_many<'a>(
        &'a self,
        entries: Vec<(String, Value)>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

    fn clear<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;
}

/// In-process store for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, Value>>,
    batches: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set_many` batches applied so far.
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

impl KeyValueStore for MemoryStore {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Value>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            Ok(self
                .values
                .lock()
                .expect("memory store should not be poisoned")
                .get(key)
                .cloned())
        })
    }

    fn set_many<'a>(
        &'a self,
        entries: Vec<(String, Value)>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut values = self
                .values
                .lock()
                .expect("memory store should not be poisoned");
            values.extend(entries);
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn clear<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move {
            self.values
                .lock()
                .expect("memory store should not be poisoned")
                .clear();
            Ok(())
        })
    }
}

/// DuckDB calls are blocking, so each one runs on the blocking pool.
impl KeyValueStore for StateWarehouse {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Value>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let warehouse = self.clone();
            let key = key.to_owned();
            tokio::task::spawn_blocking(move || warehouse.get(&key))
                .await
                .map_err(|e| StoreError::Task(e.to_string()))?
                .map_err(StoreError::from)
        })
    }

    fn set_many<'a>(
        &'a self,
        entries: Vec<(String, Value)>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let warehouse = self.clone();
            tokio::task::spawn_blocking(move || {
                let borrowed = entries
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.clone()))
                    .collect::<Vec<_>>();
                warehouse.set_many(&borrowed)
            })
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
            .map_err(StoreError::from)
        })
    }

    fn clear<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let warehouse = self.clone();
            tokio::task::spawn_blocking(move || warehouse.clear())
                .await
                .map_err(|e| StoreError::Task(e.to_string()))?
                .map_err(StoreError::from)
        })
    }
}
