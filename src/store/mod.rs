//! Small durable key-value storage for JSON-serializable state.
//!
//! Backends: [`MemoryStore`] (process lifetime only), [`JsonFileStore`] (one
//! JSON document on disk) and the SQLite-backed [`crate::db::Database`].

use std::{collections::HashMap, sync::RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

mod json_file;

pub use json_file::JsonFileStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn put(&self, key: &str, value: Value) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let guard = self
            .entries
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        guard.insert(key.to_string(), value);
        Ok(())
    }
}
