//! Storage trait definitions.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::Result;

/// Collection holding evaluation datasets, keyed by run id.
pub const DATASETS: &str = "eval_datasets";
/// Collection holding evaluation results, keyed by run id.
pub const RESULTS: &str = "eval_results";
/// Collection holding run records, keyed by run id.
pub const RUNS: &str = "eval_runs";

/// Durable key-value record storage.
///
/// Writing a key that already exists replaces the previous value.
pub trait Storage: Send + Sync {
    /// Write a record under `key` in `collection`.
    fn record(&self, collection: &str, key: &str, value: &Value) -> Result<()>;

    /// Read the record stored under `key`, if any.
    fn get_by_key(&self, collection: &str, key: &str) -> Result<Option<Value>>;

    /// All keys in a collection, in first-write order.
    fn keys(&self, collection: &str) -> Result<Vec<String>>;
}

/// Typed helpers over any [`Storage`].
pub trait StorageExt: Storage {
    /// Serialize and write a record.
    fn record_typed<T: Serialize>(&self, collection: &str, key: &str, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.record(collection, key, &value)
    }

    /// Read and deserialize a record.
    fn get_typed<T: DeserializeOwned>(&self, collection: &str, key: &str) -> Result<Option<T>> {
        match self.get_by_key(collection, key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}
