//! Storage layer for evalloop.
//!
//! Key-value persistence for datasets, results and run records, with a
//! JSONL-backed store for durable use and an in-memory store for embedding
//! and tests.

mod jsonl;
mod traits;

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

use crate::error::{EvalLoopError, Result};

pub use jsonl::JsonlStorage;
pub use traits::{DATASETS, RESULTS, RUNS, Storage, StorageExt};

/// In-memory storage.
#[derive(Default)]
pub struct MemoryStorage {
    collections: RwLock<HashMap<String, Vec<(String, Value)>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn record(&self, collection: &str, key: &str, value: &Value) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| EvalLoopError::Storage(e.to_string()))?;
        let entries = collections.entry(collection.to_string()).or_default();
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.clone(),
            None => entries.push((key.to_string(), value.clone())),
        }
        Ok(())
    }

    fn get_by_key(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| EvalLoopError::Storage(e.to_string()))?;
        Ok(collections
            .get(collection)
            .and_then(|entries| entries.iter().find(|(k, _)| k == key))
            .map(|(_, v)| v.clone()))
    }

    fn keys(&self, collection: &str) -> Result<Vec<String>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| EvalLoopError::Storage(e.to_string()))?;
        Ok(collections
            .get(collection)
            .map(|entries| entries.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default())
    }
}
