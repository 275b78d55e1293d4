//! JSON-file record store keyed by user
//!
//! The whole map is held in memory and rewritten atomically on every change.
//! Writers are serialized by an async mutex; concurrent writes for the same
//! user are last-write-wins.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::errors::PanelError;
use crate::filesys::file::File;

/// Chat user identity
pub type UserId = i64;

pub struct RecordStore<T> {
    file: File,
    records: Mutex<BTreeMap<UserId, T>>,
}

impl<T> RecordStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send,
{
    /// Load existing records from `file`; a missing file starts empty
    pub async fn open(file: File) -> Result<Self, PanelError> {
        let records = file
            .read_json_opt::<BTreeMap<UserId, T>>()
            .await
            .map_err(|e| {
                PanelError::StorageError(format!("cannot load {:?}: {}", file.path(), e))
            })?
            .unwrap_or_default();
        debug!("Loaded {} records from {:?}", records.len(), file.path());

        Ok(Self {
            file,
            records: Mutex::new(records),
        })
    }

    pub async fn get(&self, user: UserId) -> Option<T> {
        self.records.lock().await.get(&user).cloned()
    }

    /// Insert or replace the whole record
    pub async fn put(&self, user: UserId, record: T) -> Result<(), PanelError> {
        let mut records = self.records.lock().await;
        let previous = records.insert(user, record);
        if let Err(e) = self.persist(&records).await {
            match previous {
                Some(previous) => records.insert(user, previous),
                None => records.remove(&user),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Mutate an existing record in place; `None` when there is no record
    pub async fn update<R>(
        &self,
        user: UserId,
        change: impl FnOnce(&mut T) -> R,
    ) -> Result<Option<R>, PanelError> {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(&user) else {
            return Ok(None);
        };

        let previous = record.clone();
        let result = change(record);
        if let Err(e) = self.persist(&records).await {
            records.insert(user, previous);
            return Err(e);
        }
        Ok(Some(result))
    }

    /// Insert a default record if needed, then mutate it
    pub async fn upsert_with<R>(
        &self,
        user: UserId,
        create: impl FnOnce() -> T,
        change: impl FnOnce(&mut T) -> R,
    ) -> Result<R, PanelError> {
        let mut records = self.records.lock().await;
        let previous = records.get(&user).cloned();
        let result = change(records.entry(user).or_insert_with(create));
        if let Err(e) = self.persist(&records).await {
            match previous {
                Some(previous) => records.insert(user, previous),
                None => records.remove(&user),
            };
            return Err(e);
        }
        Ok(result)
    }

    pub async fn remove(&self, user: UserId) -> Result<Option<T>, PanelError> {
        let mut records = self.records.lock().await;
        let Some(removed) = records.remove(&user) else {
            return Ok(None);
        };
        if let Err(e) = self.persist(&records).await {
            records.insert(user, removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    /// Snapshot of all records
    pub async fn entries(&self) -> Vec<(UserId, T)> {
        self.records
            .lock()
            .await
            .iter()
            .map(|(user, record)| (*user, record.clone()))
            .collect()
    }

    async fn persist(&self, records: &BTreeMap<UserId, T>) -> Result<(), PanelError> {
        self.file.write_json_atomic(records).await.map_err(|e| {
            error!("Failed to persist {:?}: {}", self.file.path(), e);
            PanelError::StorageError(format!("cannot write {:?}: {}", self.file.path(), e))
        })
    }
}
