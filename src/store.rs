//! Persistence seam for resource records.
//!
//! The pipeline does not own a database. It talks to whatever the host
//! application uses through [`ResourceStore`]. Two adapters ship with the
//! crate: [`InMemoryStore`] for tests and embedding, and [`JsonFileStore`],
//! which keeps one pretty-printed JSON file per resource and backs the CLI.

use crate::error::IngestError;
use crate::resource::Resource;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Durable storage for [`Resource`] records.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch a resource, failing with [`IngestError::ResourceNotFound`].
    async fn load(&self, id: Uuid) -> Result<Resource, IngestError>;

    /// Insert or replace a resource.
    async fn save(&self, resource: &Resource) -> Result<(), IngestError>;

    /// All resources of a project, oldest upload first.
    async fn list_project(&self, project: Uuid) -> Result<Vec<Resource>, IngestError>;

    /// Delete every resource of a project. Returns how many were removed.
    async fn delete_project(&self, project: Uuid) -> Result<usize, IngestError>;
}

// ── In-memory ────────────────────────────────────────────────────────────────

/// A [`ResourceStore`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<Uuid, Resource>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Resource>>, IngestError> {
        self.records.lock().map_err(|_| IngestError::Store {
            detail: "in-memory store lock poisoned".to_string(),
        })
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn load(&self, id: Uuid) -> Result<Resource, IngestError> {
        self.records()?
            .get(&id)
            .cloned()
            .ok_or(IngestError::ResourceNotFound { id })
    }

    async fn save(&self, resource: &Resource) -> Result<(), IngestError> {
        self.records()?.insert(resource.id, resource.clone());
        Ok(())
    }

    async fn list_project(&self, project: Uuid) -> Result<Vec<Resource>, IngestError> {
        let mut out: Vec<Resource> = self
            .records()?
            .values()
            .filter(|r| r.project == project)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.uploaded_at());
        Ok(out)
    }

    async fn delete_project(&self, project: Uuid) -> Result<usize, IngestError> {
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|_, r| r.project != project);
        Ok(before - records.len())
    }
}

// ── JSON files ───────────────────────────────────────────────────────────────

/// A [`ResourceStore`] keeping `<id>.json` files in one directory.
///
/// Writes go to a temporary file that is then renamed over the target, so a
/// crash never leaves a half-written record behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, IngestError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| store_error(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn read_all(&self) -> Result<Vec<Resource>, IngestError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| store_error(&self.dir, e))?;
        let mut out = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| store_error(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            out.push(read_record(&path).await?);
        }
        Ok(out)
    }
}

#[async_trait]
impl ResourceStore for JsonFileStore {
    async fn load(&self, id: Uuid) -> Result<Resource, IngestError> {
        let path = self.record_path(id);
        if !tokio::fs::try_exists(&path)
            .await
            .map_err(|e| store_error(&path, e))?
        {
            return Err(IngestError::ResourceNotFound { id });
        }
        read_record(&path).await
    }

    async fn save(&self, resource: &Resource) -> Result<(), IngestError> {
        let path = self.record_path(resource.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(resource).map_err(|e| IngestError::Store {
            detail: format!("failed to serialise resource {}: {e}", resource.id),
        })?;

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| store_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| store_error(&path, e))?;

        debug!("Saved resource {} to {}", resource.id, path.display());
        Ok(())
    }

    async fn list_project(&self, project: Uuid) -> Result<Vec<Resource>, IngestError> {
        let mut out: Vec<Resource> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|r| r.project == project)
            .collect();
        out.sort_by_key(|r| r.uploaded_at());
        Ok(out)
    }

    async fn delete_project(&self, project: Uuid) -> Result<usize, IngestError> {
        let mut removed = 0;
        for r in self.list_project(project).await? {
            let path = self.record_path(r.id);
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| store_error(&path, e))?;
            removed += 1;
        }
        Ok(removed)
    }
}

async fn read_record(path: &Path) -> Result<Resource, IngestError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| store_error(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| IngestError::Store {
        detail: format!("corrupt record {}: {e}", path.display()),
    })
}

fn store_error(path: &Path, e: std::io::Error) -> IngestError {
    IngestError::Store {
        detail: format!("{}: {e}", path.display()),
    }
}
