use std::path::Path;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use super::error::{LedgerError, Result};
use super::models::{HistoryQuery, HistoryRecord};
use super::partitions::{decode_recent_key, encode_history_key, encode_recent_key};

/// Fjall-backed store of job outcomes
#[derive(Clone)]
pub struct HistoryStore {
    keyspace: Keyspace,
    history: PartitionHandle,
    recent: PartitionHandle,
}

impl HistoryStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening history store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let history = keyspace.open_partition("history", PartitionCreateOptions::default())?;
        let recent = keyspace.open_partition("recent", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            history,
            recent,
        })
    }

    /// Insert or replace a record by id.
    ///
    /// Replacing keeps the original `created_at`, so the record's position in
    /// the recency index does not move.
    pub fn upsert(&self, mut record: HistoryRecord) -> Result<()> {
        let key = encode_history_key(&record.id);

        match self.get(&record.id)? {
            Some(existing) => record.created_at = existing.created_at,
            None => {
                let index_key =
                    encode_recent_key(record.created_at.timestamp_millis(), &record.id);
                self.recent.insert(index_key, record.id.as_bytes())?;
            }
        }

        let value = serde_json::to_vec(&record)?;
        self.history.insert(key, value)?;
        debug!(id = %record.id, status = %record.status, "Upserted history record");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<HistoryRecord>> {
        match self.history.get(encode_history_key(id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Records newest first, filtered and paginated.
    pub fn list(&self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>> {
        let needle = query.needle();
        let mut records = Vec::new();
        let mut skipped = 0;

        for item in self.recent.iter().rev() {
            if records.len() >= query.limit {
                break;
            }
            let (_, id) = item?;
            let id = std::str::from_utf8(&id)
                .map_err(|e| LedgerError::InvalidKey(e.to_string()))?;

            // index entries can outlive a record only if a delete was interrupted
            let Some(record) = self.get(id)? else {
                continue;
            };
            if !query.accepts(&record, needle.as_deref()) {
                continue;
            }
            if skipped < query.offset {
                skipped += 1;
                continue;
            }
            records.push(record);
        }

        Ok(records)
    }

    /// Delete one record. Returns whether it existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let Some(record) = self.get(id)? else {
            return Ok(false);
        };
        self.history.remove(encode_history_key(id))?;
        self.recent
            .remove(encode_recent_key(record.created_at.timestamp_millis(), id))?;
        debug!(id, "Deleted history record");
        Ok(true)
    }

    /// Delete every record. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for item in self.history.iter() {
            let (key, _) = item?;
            self.history.remove(key)?;
            removed += 1;
        }
        for item in self.recent.iter() {
            let (key, _) = item?;
            if decode_recent_key(&key).is_none() {
                return Err(LedgerError::InvalidKey(
                    String::from_utf8_lossy(&key).into_owned(),
                ));
            }
            self.recent.remove(key)?;
        }
        info!(removed, "Cleared history");
        Ok(removed)
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let mut record_count = 0;
        for item in self.history.iter() {
            item?;
            record_count += 1;
        }
        Ok(StoreStats { record_count })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub record_count: usize,
}
