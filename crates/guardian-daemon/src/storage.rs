//! Catalog persistence for the daemon.
//!
//! The catalog (workspaces, documents and their stored content) lives in
//! `catalog.json` inside the data directory and is rewritten after every
//! mutation, so a restart picks up exactly what the store last acknowledged.
//! Each write snapshots the store while holding the storage lock, so a later
//! write never carries less than an earlier one.

use anyhow::{Context, Result};
use async_trait::async_trait;
use guardian_core::client::{self, ClientError, PersistenceClient};
use guardian_core::{Catalog, Document, DocumentId, DocumentStore, Workspace, WorkspaceId};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::native_fs::NativeFs;

pub const CATALOG_FILE: &str = "catalog.json";

/// Storage for the catalog file.
pub struct CatalogStorage {
    path: PathBuf,
}

impl CatalogStorage {
    /// Storage at `<data_dir>/catalog.json`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(CATALOG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the catalog from disk. A missing file is an empty catalog.
    pub fn load(&self) -> Result<Catalog> {
        if !self.path.exists() {
            return Ok(Catalog::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let catalog = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(catalog)
    }

    /// Save the catalog to disk.
    pub fn save(&self, catalog: &Catalog) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(catalog)?;
        fs::write(&self.path, contents)?;
        debug!("Saved catalog to {}", self.path.display());
        Ok(())
    }
}

/// `DocumentStore` on the native filesystem whose catalog is written to disk
/// after every change.
pub struct PersistentStore {
    store: DocumentStore<NativeFs>,
    storage: Mutex<CatalogStorage>,
}

impl PersistentStore {
    /// Open the store in `data_dir`, loading any existing catalog.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let storage = CatalogStorage::new(data_dir);
        let catalog = storage.load()?;
        debug!(
            "Loaded {} workspace(s), {} document(s)",
            catalog.workspaces.len(),
            catalog.documents.len()
        );
        Ok(Self {
            store: DocumentStore::with_catalog(NativeFs::new(), catalog),
            storage: Mutex::new(storage),
        })
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.lock_storage().path().to_path_buf()
    }

    fn lock_storage(&self) -> std::sync::MutexGuard<'_, CatalogStorage> {
        self.storage.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self) -> client::Result<()> {
        let storage = self.lock_storage();
        storage
            .save(&self.store.snapshot())
            .map_err(|e| ClientError::Storage(format!("{:#}", e)))
    }

    pub fn add_workspace(&self, name: &str, root_path: &str) -> client::Result<Workspace> {
        let workspace = self.store.add_workspace(name, root_path)?;
        self.persist()?;
        Ok(workspace)
    }

    pub fn workspaces(&self) -> Vec<Workspace> {
        self.store.workspaces()
    }

    pub fn workspace(&self, id: WorkspaceId) -> Option<Workspace> {
        self.store.workspace(id)
    }

    pub fn remove_workspace(&self, id: WorkspaceId) -> client::Result<Vec<DocumentId>> {
        let removed = self.store.remove_workspace(id)?;
        self.persist()?;
        Ok(removed)
    }

    pub async fn add_document(
        &self,
        workspace_id: WorkspaceId,
        name: &str,
        relative_path: &str,
    ) -> client::Result<Document> {
        let document = self
            .store
            .add_document(workspace_id, name, relative_path)
            .await?;
        self.persist()?;
        Ok(document)
    }

    pub fn documents(&self) -> Vec<Document> {
        self.store.documents()
    }

    pub fn document(&self, id: DocumentId) -> Option<Document> {
        self.store.document(id)
    }

    pub fn delete_document(&self, id: DocumentId) -> client::Result<()> {
        self.store.delete_document(id)?;
        self.persist()
    }
}

#[async_trait]
impl PersistenceClient for PersistentStore {
    async fn fetch_sanitized_preview(&self, id: DocumentId) -> client::Result<String> {
        self.store.fetch_sanitized_preview(id).await
    }

    async fn update_original_content(&self, id: DocumentId, content: &str) -> client::Result<()> {
        self.store.update_original_content(id, content).await?;
        self.persist()
    }

    async fn update_sanitized_content(&self, id: DocumentId, content: &str) -> client::Result<()> {
        self.store.update_sanitized_content(id, content).await?;
        self.persist()
    }

    async fn write_original_to_file(&self, id: DocumentId, workspace_root: &str) -> client::Result<()> {
        self.store.write_original_to_file(id, workspace_root).await
    }

    async fn write_sanitized_to_file(&self, id: DocumentId, workspace_root: &str) -> client::Result<()> {
        self.store.write_sanitized_to_file(id, workspace_root).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sample_catalog() -> Catalog {
        Catalog {
            workspaces: vec![Workspace {
                id: 1,
                name: "app".into(),
                root_path: "/srv/app".into(),
            }],
            documents: vec![Document {
                id: 2,
                workspace_id: 1,
                name: "env".into(),
                path: ".env".into(),
                original_content: "KEY=secret\n".into(),
                sanitized_content: Some("KEY=<set me>\n".into()),
            }],
            next_id: 2,
        }
    }

    #[test]
    fn test_missing_catalog_loads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let storage = CatalogStorage::new(temp_dir.path());

        assert_eq!(storage.load().unwrap(), Catalog::default());
    }

    #[test]
    fn test_catalog_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");

        CatalogStorage::new(&data_dir).save(&sample_catalog()).unwrap();

        assert!(data_dir.join(CATALOG_FILE).exists());
        let loaded = CatalogStorage::new(&data_dir).load().unwrap();
        assert_eq!(loaded, sample_catalog());
    }

    #[test]
    fn test_corrupt_catalog_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(CATALOG_FILE), "{not json").unwrap();

        let err = CatalogStorage::new(temp_dir.path()).load().unwrap_err();
        assert!(format!("{:#}", err).contains("parsing"));
    }

    #[tokio::test]
    async fn test_content_updates_are_written_through() {
        let temp_dir = TempDir::new().unwrap();
        CatalogStorage::new(temp_dir.path())
            .save(&sample_catalog())
            .unwrap();

        let store = PersistentStore::open(temp_dir.path()).unwrap();
        store.update_original_content(2, "KEY=rotated\n").await.unwrap();

        let reloaded = CatalogStorage::new(temp_dir.path()).load().unwrap();
        assert_eq!(reloaded.documents[0].original_content, "KEY=rotated\n");
    }

    #[tokio::test]
    async fn test_remove_workspace_is_written_through() {
        let temp_dir = TempDir::new().unwrap();
        CatalogStorage::new(temp_dir.path())
            .save(&sample_catalog())
            .unwrap();

        let store = PersistentStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.remove_workspace(1).unwrap(), vec![2]);

        let reloaded = CatalogStorage::new(temp_dir.path()).load().unwrap();
        assert!(reloaded.workspaces.is_empty());
        assert!(reloaded.documents.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_all_reach_disk() {
        let temp_dir = TempDir::new().unwrap();
        let mut catalog = sample_catalog();
        catalog.documents.push(Document {
            id: 3,
            path: "config.json".into(),
            original_content: "{}".into(),
            sanitized_content: None,
            ..catalog.documents[0].clone()
        });
        CatalogStorage::new(temp_dir.path()).save(&catalog).unwrap();

        let store = Arc::new(PersistentStore::open(temp_dir.path()).unwrap());
        let tasks: Vec<_> = (0..50)
            .map(|round| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let id = if round % 2 == 0 { 2 } else { 3 };
                    store
                        .update_original_content(id, &format!("round {}", round))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let mut on_disk = CatalogStorage::new(temp_dir.path()).load().unwrap().documents;
        let mut in_memory = store.documents();
        on_disk.sort_by_key(|d| d.id);
        in_memory.sort_by_key(|d| d.id);
        assert_eq!(on_disk, in_memory);
    }
}
