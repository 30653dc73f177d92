use std::collections::{BTreeMap, BTreeSet};

use rusqlite::params;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};

use super::schema::SCHEMA;

pub const CATEGORIES_KEY: &str = "categories";
pub const CATEGORIZED_POSTS_KEY: &str = "categorizedPosts";
pub const SIDE_PANEL_KEY: &str = "sidePanel";

const CHANGE_BUFFER: usize = 64;

/// Byte limits of the storage area. An item is measured as its key plus the
/// JSON encoding of its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub total_bytes: usize,
    pub bytes_per_item: usize,
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            total_bytes: 102_400,
            bytes_per_item: 8_192,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0} quota exceeded")]
struct QuotaViolation(&'static str);

/// A partial view of storage: some subset of top-level keys and their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageRecord(BTreeMap<String, Value>);

impl StorageRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `key` with the serialized form of `value`.
    pub fn with<T: Serialize + ?Sized>(mut self, key: &str, value: &T) -> Result<Self> {
        self.0.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Deserialize `key`; absent and `null` values both read as `None`.
    pub fn typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(T::deserialize(value)?)),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(value) if !value.is_null())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Emitted once per key after every successful write.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Value,
}

/// Key-value facade over the synchronized storage area.
///
/// Individual `get`/`set` calls are atomic, but a read followed by a write is
/// not; callers that read-modify-write must serialize themselves.
#[derive(Clone)]
pub struct Storage {
    conn: Connection,
    quota: Quota,
    changes: broadcast::Sender<StorageChange>,
}

impl Storage {
    pub async fn open(db_path: &str, quota: Quota) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path).await?;
        Self::init(conn, quota).await
    }

    pub async fn open_in_memory(quota: Quota) -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn, quota).await
    }

    async fn init(conn: Connection, quota: Quota) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Ok(Self {
            conn,
            quota,
            changes,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }

    /// Read the requested keys. Keys that were never written are missing
    /// from the returned record.
    pub async fn get(&self, keys: &[&str]) -> Result<StorageRecord> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT key, value FROM records")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                    .filter(|row| match row {
                        Ok((key, _)) => keys.contains(key),
                        Err(_) => true,
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut record = BTreeMap::new();
        for (key, value) in rows {
            record.insert(key, serde_json::from_str(&value)?);
        }
        Ok(StorageRecord(record))
    }

    /// Write every key of `record` in one transaction. Fails without
    /// touching storage when either quota would be exceeded.
    pub async fn set(&self, record: StorageRecord) -> Result<()> {
        if record.is_empty() {
            return Ok(());
        }

        let mut items = Vec::with_capacity(record.0.len());
        for (key, value) in &record.0 {
            let json = serde_json::to_string(value)?;
            if key.len() + json.len() > self.quota.bytes_per_item {
                tracing::warn!("Refusing to write {} ({} bytes)", key, key.len() + json.len());
                return Err(AppError::QuotaExceeded(
                    QuotaViolation("QUOTA_BYTES_PER_ITEM").to_string(),
                ));
            }
            items.push((key.clone(), json));
        }

        let total_bytes = self.quota.total_bytes;
        let previous = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let existing: BTreeMap<String, String> = {
                    let mut stmt = tx.prepare("SELECT key, value FROM records")?;
                    let rows = stmt
                        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                        .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
                    rows
                };

                let written: BTreeSet<&str> = items.iter().map(|(k, _)| k.as_str()).collect();
                let untouched: usize = existing
                    .iter()
                    .filter(|(k, _)| !written.contains(k.as_str()))
                    .map(|(k, v)| k.len() + v.len())
                    .sum();
                let incoming: usize = items.iter().map(|(k, v)| k.len() + v.len()).sum();
                if untouched + incoming > total_bytes {
                    return Err(tokio_rusqlite::Error::Other(Box::new(QuotaViolation(
                        "QUOTA_BYTES",
                    ))));
                }

                for (key, value) in &items {
                    tx.execute(
                        r#"INSERT INTO records (key, value) VALUES (?1, ?2)
                           ON CONFLICT(key) DO UPDATE SET
                               value = excluded.value,
                               updated_at = datetime('now')"#,
                        params![key, value],
                    )?;
                }
                tx.commit()?;

                let previous: Vec<(String, Option<String>)> = items
                    .into_iter()
                    .map(|(key, _)| {
                        let old = existing.get(&key).cloned();
                        (key, old)
                    })
                    .collect();
                Ok(previous)
            })
            .await
            .map_err(quota_or_database)?;

        let mut values = record.0;
        for (key, old) in previous {
            let Some(new_value) = values.remove(&key) else {
                continue;
            };
            // No subscribers is not an error for writers.
            let _ = self.changes.send(StorageChange {
                key,
                old_value: old.and_then(|s| serde_json::from_str(&s).ok()),
                new_value,
            });
        }

        Ok(())
    }

    /// Bytes currently occupied across all records.
    pub async fn bytes_in_use(&self) -> Result<usize> {
        let used = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT key, value FROM records")?;
                let sizes = stmt
                    .query_map([], |row| {
                        let key: String = row.get(0)?;
                        let value: String = row.get(1)?;
                        Ok(key.len() + value.len())
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(sizes.into_iter().sum())
            })
            .await?;
        Ok(used)
    }
}

fn quota_or_database(err: tokio_rusqlite::Error) -> AppError {
    if let tokio_rusqlite::Error::Other(inner) = &err {
        if let Some(violation) = inner.downcast_ref::<QuotaViolation>() {
            return AppError::QuotaExceeded(violation.to_string());
        }
    }
    AppError::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    async fn memory_storage(quota: Quota) -> Storage {
        Storage::open_in_memory(quota).await.unwrap()
    }

    #[tokio::test]
    async fn absent_keys_are_missing_from_record() {
        let storage = memory_storage(Quota::default()).await;
        let record = storage.get(&[CATEGORIES_KEY]).await.unwrap();
        assert!(record.is_empty());
        assert!(!record.contains(CATEGORIES_KEY));
    }

    #[tokio::test]
    async fn set_then_get_returns_written_values() {
        let storage = memory_storage(Quota::default()).await;
        let record = StorageRecord::new()
            .with(CATEGORIES_KEY, &json!([{"id": "work"}]))
            .unwrap()
            .with(CATEGORIZED_POSTS_KEY, &json!({}))
            .unwrap();
        assert_ok!(storage.set(record).await);

        let read = storage.get(&[CATEGORIES_KEY]).await.unwrap();
        assert_eq!(read.get(CATEGORIES_KEY), Some(&json!([{"id": "work"}])));
        assert!(read.get(CATEGORIZED_POSTS_KEY).is_none());

        let both = storage.get(&[CATEGORIES_KEY, CATEGORIZED_POSTS_KEY]).await.unwrap();
        assert_eq!(both.keys().collect::<Vec<_>>(), [CATEGORIES_KEY, CATEGORIZED_POSTS_KEY]);
    }

    #[tokio::test]
    async fn oversized_item_is_rejected_without_writing() {
        let storage = memory_storage(Quota {
            total_bytes: 1_000,
            bytes_per_item: 40,
        })
        .await;
        let big = "x".repeat(100);
        let err = assert_err!(
            storage
                .set(StorageRecord::new().with(CATEGORIES_KEY, &big).unwrap())
                .await
        );
        assert!(err.is_storage_failure());
        assert_eq!(err.to_string(), "QUOTA_BYTES_PER_ITEM quota exceeded");
        assert!(storage.get(&[CATEGORIES_KEY]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn total_quota_counts_existing_records() {
        let storage = memory_storage(Quota {
            total_bytes: 60,
            bytes_per_item: 50,
        })
        .await;
        let first = StorageRecord::new().with("a", &"y".repeat(30)).unwrap();
        assert_ok!(storage.set(first).await);

        let second = StorageRecord::new().with("b", &"z".repeat(30)).unwrap();
        let err = assert_err!(storage.set(second).await);
        assert_eq!(err.to_string(), "QUOTA_BYTES quota exceeded");

        // Overwriting the same key only counts the new value.
        let replace = StorageRecord::new().with("a", &"w".repeat(40)).unwrap();
        assert_ok!(storage.set(replace).await);
        assert_eq!(storage.bytes_in_use().await.unwrap(), 1 + 42);
    }

    #[tokio::test]
    async fn writes_are_broadcast_per_key() {
        let storage = memory_storage(Quota::default()).await;
        let mut changes = storage.subscribe();

        storage
            .set(StorageRecord::new().with(CATEGORIES_KEY, &json!([])).unwrap())
            .await
            .unwrap();
        storage
            .set(StorageRecord::new().with(CATEGORIES_KEY, &json!([1])).unwrap())
            .await
            .unwrap();

        let first = changes.recv().await.unwrap();
        assert_eq!(first.key, CATEGORIES_KEY);
        assert_eq!(first.old_value, None);
        assert_eq!(first.new_value, json!([]));

        let second = changes.recv().await.unwrap();
        assert_eq!(second.old_value, Some(json!([])));
        assert_eq!(second.new_value, json!([1]));
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.db");
        let path = path.to_str().unwrap();

        {
            let storage = Storage::open(path, Quota::default()).await.unwrap();
            storage
                .set(StorageRecord::new().with(SIDE_PANEL_KEY, &json!({"enabled": true})).unwrap())
                .await
                .unwrap();
        }

        let storage = Storage::open(path, Quota::default()).await.unwrap();
        let record = storage.get(&[SIDE_PANEL_KEY]).await.unwrap();
        assert_eq!(record.get(SIDE_PANEL_KEY), Some(&json!({"enabled": true})));
    }
}
