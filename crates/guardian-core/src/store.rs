//! DocumentStore: in-process implementation of `PersistenceClient`.
//!
//! Keeps the catalog of workspaces and documents in memory and writes files
//! through a `FileSystem`. Previews are derived with the sanitizer from the
//! stored original content, so a save followed by a fetch always sees the
//! saved text.
//!
//! Callers that need durability take a `snapshot()` after each mutation and
//! feed it back through `with_catalog` on startup.

use crate::client::{ClientError, PersistenceClient, Result};
use crate::fs::{FileSystem, FsError};
use crate::models::{Catalog, Document, DocumentId, Workspace, WorkspaceId};
use crate::sanitizer;
use async_trait::async_trait;
use std::path::{Component, Path};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

pub struct DocumentStore<F: FileSystem> {
    fs: F,
    catalog: RwLock<Catalog>,
}

impl From<FsError> for ClientError {
    fn from(err: FsError) -> Self {
        ClientError::Io(err.to_string())
    }
}

/// Join `relative` onto `workspace_root`, refusing paths that would land
/// outside the workspace.
pub fn resolve_document_path(workspace_root: &str, relative: &str) -> Result<String> {
    let rel = Path::new(relative);
    if relative.trim().is_empty() {
        return Err(ClientError::InvalidPath("empty path".into()));
    }
    if rel.is_absolute() || relative.starts_with('/') || relative.starts_with('\\') {
        return Err(ClientError::InvalidPath(format!(
            "{} is absolute, expected a path inside the workspace",
            relative
        )));
    }
    if rel
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(ClientError::InvalidPath(format!(
            "{} is outside the workspace",
            relative
        )));
    }
    Ok(Path::new(workspace_root)
        .join(rel)
        .to_string_lossy()
        .into_owned())
}

impl<F: FileSystem> DocumentStore<F> {
    pub fn new(fs: F) -> Self {
        Self::with_catalog(fs, Catalog::default())
    }

    pub fn with_catalog(fs: F, catalog: Catalog) -> Self {
        Self {
            fs,
            catalog: RwLock::new(catalog),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> Catalog {
        self.read().clone()
    }

    // ==================== Workspaces ====================

    pub fn add_workspace(&self, name: &str, root_path: &str) -> Result<Workspace> {
        let mut catalog = self.write();
        if catalog.workspaces.iter().any(|w| w.root_path == root_path) {
            return Err(ClientError::Storage(format!(
                "workspace already registered: {}",
                root_path
            )));
        }
        catalog.next_id += 1;
        let workspace = Workspace {
            id: catalog.next_id,
            name: name.to_string(),
            root_path: root_path.to_string(),
        };
        catalog.workspaces.push(workspace.clone());
        info!("Added workspace {} ({})", workspace.name, workspace.root_path);
        Ok(workspace)
    }

    pub fn workspaces(&self) -> Vec<Workspace> {
        self.read().workspaces.clone()
    }

    pub fn workspace(&self, id: WorkspaceId) -> Option<Workspace> {
        self.read().workspaces.iter().find(|w| w.id == id).cloned()
    }

    /// Remove a workspace and every document in it. Returns the removed
    /// document ids.
    pub fn remove_workspace(&self, id: WorkspaceId) -> Result<Vec<DocumentId>> {
        let mut catalog = self.write();
        let before = catalog.workspaces.len();
        catalog.workspaces.retain(|w| w.id != id);
        if catalog.workspaces.len() == before {
            return Err(ClientError::WorkspaceNotFound(id));
        }
        let removed: Vec<DocumentId> = catalog
            .documents
            .iter()
            .filter(|d| d.workspace_id == id)
            .map(|d| d.id)
            .collect();
        catalog.documents.retain(|d| d.workspace_id != id);
        Ok(removed)
    }

    // ==================== Documents ====================

    /// Start tracking a file, reading its current content from disk.
    pub async fn add_document(
        &self,
        workspace_id: WorkspaceId,
        name: &str,
        relative_path: &str,
    ) -> Result<Document> {
        let workspace = self
            .workspace(workspace_id)
            .ok_or(ClientError::WorkspaceNotFound(workspace_id))?;
        let full_path = resolve_document_path(&workspace.root_path, relative_path)?;

        let bytes = self.fs.read(&full_path).await?;
        let original_content = String::from_utf8(bytes)
            .map_err(|_| ClientError::Io(format!("{} is not valid UTF-8", full_path)))?;

        let mut catalog = self.write();
        catalog.next_id += 1;
        let document = Document {
            id: catalog.next_id,
            workspace_id,
            name: name.to_string(),
            path: relative_path.to_string(),
            original_content,
            sanitized_content: None,
        };
        catalog.documents.push(document.clone());
        info!("Tracking {} as document {}", full_path, document.id);
        Ok(document)
    }

    /// All documents, ordered by workspace then path.
    pub fn documents(&self) -> Vec<Document> {
        let mut documents = self.read().documents.clone();
        documents.sort_by(|a, b| {
            a.workspace_id
                .cmp(&b.workspace_id)
                .then_with(|| a.path.cmp(&b.path))
        });
        documents
    }

    pub fn document(&self, id: DocumentId) -> Option<Document> {
        self.read().documents.iter().find(|d| d.id == id).cloned()
    }

    pub fn delete_document(&self, id: DocumentId) -> Result<()> {
        let mut catalog = self.write();
        let before = catalog.documents.len();
        catalog.documents.retain(|d| d.id != id);
        if catalog.documents.len() == before {
            return Err(ClientError::NotFound(id));
        }
        Ok(())
    }

    fn require(&self, id: DocumentId) -> Result<Document> {
        self.document(id).ok_or(ClientError::NotFound(id))
    }

    fn update(&self, id: DocumentId, apply: impl FnOnce(&mut Document)) -> Result<()> {
        let mut catalog = self.write();
        let document = catalog
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(ClientError::NotFound(id))?;
        apply(document);
        Ok(())
    }

    fn derive(document: &Document) -> Result<String> {
        sanitizer::sanitize_content(&document.original_content, &document.path)
            .map_err(|e| ClientError::Sanitize(e.to_string()))
    }
}

#[async_trait]
impl<F: FileSystem + 'static> PersistenceClient for DocumentStore<F> {
    async fn fetch_sanitized_preview(&self, id: DocumentId) -> Result<String> {
        let document = self.require(id)?;
        Self::derive(&document)
    }

    async fn update_original_content(&self, id: DocumentId, content: &str) -> Result<()> {
        self.update(id, |d| d.original_content = content.to_string())?;
        debug!("Stored original content for {} ({} bytes)", id, content.len());
        Ok(())
    }

    async fn update_sanitized_content(&self, id: DocumentId, content: &str) -> Result<()> {
        self.update(id, |d| d.sanitized_content = Some(content.to_string()))?;
        debug!("Stored sanitized content for {} ({} bytes)", id, content.len());
        Ok(())
    }

    async fn write_original_to_file(&self, id: DocumentId, workspace_root: &str) -> Result<()> {
        let document = self.require(id)?;
        let full_path = resolve_document_path(workspace_root, &document.path)?;
        self.fs
            .write(&full_path, document.original_content.as_bytes())
            .await?;
        info!("Wrote original content of {} to {}", id, full_path);
        Ok(())
    }

    async fn write_sanitized_to_file(&self, id: DocumentId, workspace_root: &str) -> Result<()> {
        let document = self.require(id)?;
        let content = match &document.sanitized_content {
            Some(manual) => manual.clone(),
            None => Self::derive(&document)?,
        };
        let full_path = resolve_document_path(workspace_root, &document.path)?;
        self.fs.write(&full_path, content.as_bytes()).await?;
        info!("Wrote sanitized content of {} to {}", id, full_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;
    use std::sync::Arc;

    async fn store_with_env() -> (DocumentStore<Arc<InMemoryFs>>, Arc<InMemoryFs>, Document) {
        let fs = Arc::new(InMemoryFs::new());
        fs.insert("/srv/app/.env", "TOKEN=abc\n");
        let store = DocumentStore::new(Arc::clone(&fs));
        let ws = store.add_workspace("app", "/srv/app").unwrap();
        let doc = store.add_document(ws.id, "env", ".env").await.unwrap();
        (store, fs, doc)
    }

    #[test]
    fn test_resolve_document_path() {
        assert_eq!(
            resolve_document_path("/srv/app", "config/app.json").unwrap(),
            "/srv/app/config/app.json"
        );
        assert!(resolve_document_path("/srv/app", "../etc/passwd").is_err());
        assert!(resolve_document_path("/srv/app", "a/../../b").is_err());
        assert!(resolve_document_path("/srv/app", "/etc/passwd").is_err());
        assert!(resolve_document_path("/srv/app", "  ").is_err());
    }

    #[tokio::test]
    async fn test_add_document_reads_file() {
        let (store, _fs, doc) = store_with_env().await;

        assert_eq!(doc.original_content, "TOKEN=abc\n");
        assert_eq!(doc.sanitized_content, None);
        assert_eq!(store.documents().len(), 1);
    }

    #[tokio::test]
    async fn test_add_document_missing_file() {
        let fs = InMemoryFs::new();
        let store = DocumentStore::new(fs);
        let ws = store.add_workspace("app", "/srv/app").unwrap();

        let err = store.add_document(ws.id, "x", "missing.json").await.unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }

    #[test]
    fn test_duplicate_workspace_root_rejected() {
        let store = DocumentStore::new(InMemoryFs::new());
        store.add_workspace("a", "/srv/app").unwrap();
        assert!(store.add_workspace("b", "/srv/app").is_err());
    }

    #[tokio::test]
    async fn test_preview_follows_saved_original() {
        let (store, _fs, doc) = store_with_env().await;

        store
            .update_original_content(doc.id, "TOKEN=abc\nSECRET=xyz\n")
            .await
            .unwrap();
        let preview = store.fetch_sanitized_preview(doc.id).await.unwrap();

        assert_eq!(preview, "TOKEN=***\nSECRET=***\n");
    }

    #[tokio::test]
    async fn test_write_sanitized_prefers_manual_content() {
        let (store, fs, doc) = store_with_env().await;

        store.write_sanitized_to_file(doc.id, "/srv/app").await.unwrap();
        assert_eq!(fs.contents("/srv/app/.env").as_deref(), Some("TOKEN=***\n"));

        store
            .update_sanitized_content(doc.id, "TOKEN=<redacted>\n")
            .await
            .unwrap();
        store.write_sanitized_to_file(doc.id, "/srv/app").await.unwrap();
        assert_eq!(
            fs.contents("/srv/app/.env").as_deref(),
            Some("TOKEN=<redacted>\n")
        );
    }

    #[tokio::test]
    async fn test_write_original_to_file() {
        let (store, fs, doc) = store_with_env().await;

        store.update_original_content(doc.id, "TOKEN=new\n").await.unwrap();
        store.write_original_to_file(doc.id, "/srv/app").await.unwrap();

        assert_eq!(fs.contents("/srv/app/.env").as_deref(), Some("TOKEN=new\n"));
    }

    #[tokio::test]
    async fn test_remove_workspace_cascades() {
        let (store, _fs, doc) = store_with_env().await;

        let removed = store.remove_workspace(doc.workspace_id).unwrap();

        assert_eq!(removed, vec![doc.id]);
        assert!(store.document(doc.id).is_none());
        assert!(store.workspaces().is_empty());
        assert!(matches!(
            store.fetch_sanitized_preview(doc.id).await,
            Err(ClientError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_round_trips_through_with_catalog() {
        let (store, fs, doc) = store_with_env().await;

        let restored = DocumentStore::with_catalog(fs, store.snapshot());

        assert_eq!(restored.document(doc.id), Some(doc));
    }
}
