use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::remote::{
    ChangeCallback, EntityKind, RemoteError, RemoteStore, SubscriberRegistry, SubscriptionHandle,
};

/// Owner id used for every record when no backend is configured.
pub const LOCAL_OWNER: &str = "local";

/// Blob store: one JSON array per entity key, `<data_dir>/<key>.json`.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened datastore");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }

    /// Rows stored under `key`. A missing or empty file is an empty
    /// collection.
    #[tracing::instrument(skip(self))]
    pub fn load(&self, key: &str) -> anyhow::Result<Vec<Value>> {
        let path = self.path_for(key);
        if !path.exists() {
            debug!(file = %path.display(), "no blob yet");
            return Ok(Vec::new());
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<Value> = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", path.display()))?;
        debug!(count = rows.len(), "loaded rows");
        Ok(rows)
    }

    #[tracing::instrument(skip(self, rows))]
    pub fn save(&self, key: &str, rows: &[Value]) -> anyhow::Result<()> {
        let path = self.path_for(key);
        save_json_atomic(&path, rows).with_context(|| format!("failed to save {key}"))
    }
}

#[tracing::instrument(skip(path, rows))]
fn save_json_atomic(path: &Path, rows: &[Value]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = rows.len(), "saving json atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, rows)?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn row_owned_by(row: &Value, owner: &str) -> bool {
    row.get("user_id")
        .and_then(Value::as_str)
        .is_none_or(|row_owner| row_owner == owner)
}

fn row_created_at(row: &Value) -> Option<DateTime<Utc>> {
    row.get("created_at")
        .or_else(|| row.get("createdAt"))
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc))
}

/// Older blobs used camelCase keys. Once the snake_case column is
/// written the old key would shadow it as a duplicate field.
const LEGACY_KEYS: [(&str, &str); 3] = [
    ("dueDate", "due_date"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
];

fn drop_shadowed_legacy_keys(row: &mut serde_json::Map<String, Value>) {
    for (legacy, current) in LEGACY_KEYS {
        if row.contains_key(current) {
            row.remove(legacy);
        }
    }
}

fn storage_error(err: anyhow::Error) -> RemoteError {
    RemoteError::Storage(format!("{err:#}"))
}

/// [`RemoteStore`] over a [`DataStore`] for non-networked mode. Every
/// mutation rewrites the whole blob. Nothing else writes the files, so
/// subscriptions are accepted but never fire.
pub struct LocalBackend {
    store: DataStore,
    subscribers: SubscriberRegistry,
}

impl LocalBackend {
    pub fn new(store: DataStore) -> Self {
        Self {
            store,
            subscribers: SubscriberRegistry::new(),
        }
    }

    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        Ok(Self::new(DataStore::open(data_dir)?))
    }

    pub fn data_store(&self) -> &DataStore {
        &self.store
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn load(&self, kind: EntityKind) -> Result<Vec<Value>, RemoteError> {
        self.store.load(kind.storage_key()).map_err(storage_error)
    }

    fn save(&self, kind: EntityKind, rows: &[Value]) -> Result<(), RemoteError> {
        self.store
            .save(kind.storage_key(), rows)
            .map_err(storage_error)
    }
}

#[async_trait(?Send)]
impl RemoteStore for LocalBackend {
    async fn fetch_all(&self, kind: EntityKind, owner: &str) -> Result<Vec<Value>, RemoteError> {
        let mut rows: Vec<Value> = self
            .load(kind)?
            .into_iter()
            .filter(|row| row_owned_by(row, owner))
            .collect();
        rows.sort_by(|a, b| row_created_at(b).cmp(&row_created_at(a)));
        Ok(rows)
    }

    async fn insert(&self, kind: EntityKind, record: Value) -> Result<(), RemoteError> {
        let id = row_id(&record)
            .ok_or_else(|| RemoteError::Rejected(format!("{} row without id", kind.singular())))?
            .to_string();
        let mut rows = self.load(kind)?;
        if rows.iter().any(|row| row_id(row) == Some(id.as_str())) {
            return Err(RemoteError::Rejected(format!("duplicate {} id {id}", kind.singular())));
        }
        rows.insert(0, record);
        self.save(kind, &rows)?;
        debug!(%kind, id = %id, "inserted local row");
        Ok(())
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        owner: &str,
        fields: Value,
    ) -> Result<(), RemoteError> {
        let Value::Object(fields) = fields else {
            return Err(RemoteError::Rejected("update fields must be an object".to_string()));
        };
        let mut rows = self.load(kind)?;
        let row = rows
            .iter_mut()
            .find(|row| row_id(row) == Some(id) && row_owned_by(row, owner))
            .ok_or_else(|| RemoteError::Rejected(format!("no {} with id {id}", kind.singular())))?;
        let Some(target) = row.as_object_mut() else {
            return Err(RemoteError::Storage(format!("{} row {id} is not an object", kind.singular())));
        };
        for (key, value) in fields {
            target.insert(key, value);
        }
        drop_shadowed_legacy_keys(target);
        self.save(kind, &rows)?;
        debug!(%kind, id, "updated local row");
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, id: &str, owner: &str) -> Result<(), RemoteError> {
        let mut rows = self.load(kind)?;
        let before = rows.len();
        rows.retain(|row| !(row_id(row) == Some(id) && row_owned_by(row, owner)));
        if rows.len() != before {
            self.save(kind, &rows)?;
        }
        debug!(%kind, id, removed = before - rows.len(), "deleted local row");
        Ok(())
    }

    fn subscribe(
        &self,
        kind: EntityKind,
        owner: &str,
        on_change: ChangeCallback,
    ) -> SubscriptionHandle {
        self.subscribers.add(kind, owner, on_change)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscribers.remove(handle);
    }
}
