use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use crate::store::KeyValueStore;

use super::Database;

fn parse_value(key: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("stored value for '{key}' is not valid JSON"))
}

impl Database {
    pub async fn get_entry(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM kv_entries WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .with_context(|| format!("failed to read entry '{key}'"))?;

            raw.map(|raw| parse_value(&key, &raw)).transpose()
        })
        .await
    }

    pub async fn put_entry(&self, key: &str, value: &Value, updated_at: DateTime<Utc>) -> Result<()> {
        let key = key.to_string();
        let serialized = serde_json::to_string(value)?;
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, serialized, updated_at.to_rfc3339()],
            )
            .with_context(|| format!("failed to write entry '{key}'"))?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.get_entry(key).await
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        self.put_entry(key, &value, Utc::now()).await
    }
}
