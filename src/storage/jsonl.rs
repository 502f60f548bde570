//! JSONL-based storage implementation with in-memory caching.
//!
//! Each collection is an append-only `{collection}.jsonl` file of
//! `{"key": ..., "value": ...}` lines. On load the last line for a key wins.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::traits::Storage;
use crate::error::{EvalLoopError, Result};

#[derive(Serialize, Deserialize)]
struct Line {
    key: String,
    value: Value,
}

#[derive(Default)]
struct Collection {
    order: Vec<String>,
    records: HashMap<String, Value>,
}

impl Collection {
    fn put(&mut self, key: String, value: Value) {
        if !self.records.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.records.insert(key, value);
    }
}

/// JSONL-based storage with in-memory caching.
pub struct JsonlStorage {
    base_path: PathBuf,
    cache: RwLock<HashMap<String, Collection>>,
}

impl JsonlStorage {
    /// Create a new JsonlStorage at the given path.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a collection.
    fn collection_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", collection))
    }

    /// Load a collection into cache if not already loaded.
    fn ensure_loaded(&self, collection: &str) -> Result<()> {
        {
            let cache = self.cache.read().map_err(|e| EvalLoopError::Storage(e.to_string()))?;
            if cache.contains_key(collection) {
                return Ok(());
            }
        }

        let mut cache = self.cache.write().map_err(|e| EvalLoopError::Storage(e.to_string()))?;
        if cache.contains_key(collection) {
            return Ok(());
        }

        let path = self.collection_path(collection);
        let mut loaded = Collection::default();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if !line.trim().is_empty() {
                    let parsed: Line = serde_json::from_str(&line)?;
                    loaded.put(parsed.key, parsed.value);
                }
            }
            log::debug!("Loaded {} records from {}", loaded.order.len(), path.display());
        }

        cache.insert(collection.to_string(), loaded);
        Ok(())
    }

    /// Append a record to the JSONL file.
    fn append_to_file(&self, collection: &str, line: &Line) -> Result<()> {
        let path = self.collection_path(collection);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(line)?)?;
        Ok(())
    }
}

impl Storage for JsonlStorage {
    fn record(&self, collection: &str, key: &str, value: &Value) -> Result<()> {
        self.ensure_loaded(collection)?;

        let line = Line {
            key: key.to_string(),
            value: value.clone(),
        };

        // File first: it is the source of truth
        self.append_to_file(collection, &line)?;

        let mut cache = self.cache.write().map_err(|e| EvalLoopError::Storage(e.to_string()))?;
        cache
            .entry(collection.to_string())
            .or_default()
            .put(line.key, line.value);
        Ok(())
    }

    fn get_by_key(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(|e| EvalLoopError::Storage(e.to_string()))?;
        Ok(cache.get(collection).and_then(|c| c.records.get(key).cloned()))
    }

    fn keys(&self, collection: &str) -> Result<Vec<String>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(|e| EvalLoopError::Storage(e.to_string()))?;
        Ok(cache.get(collection).map(|c| c.order.clone()).unwrap_or_default())
    }
}
