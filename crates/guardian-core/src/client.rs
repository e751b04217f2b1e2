//! Boundary traits for the engine's external collaborators.
//!
//! - `PersistenceClient`: the store that holds documents and derives previews
//! - `Confirmer`: the explicit user confirmation step before writing a file

use crate::models::DocumentId;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Document not found: {0}")]
    NotFound(DocumentId),

    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(i64),

    #[error("Sanitization failed: {0}")]
    Sanitize(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Request/response operations the engine performs against the store.
///
/// The engine never retries these calls; retry policy, if any, belongs to
/// the implementation.
#[async_trait]
pub trait PersistenceClient: Send + Sync + 'static {
    /// Sanitized preview derived from the currently stored original content
    async fn fetch_sanitized_preview(&self, id: DocumentId) -> Result<String>;

    /// Replace the stored original content (last write wins)
    async fn update_original_content(&self, id: DocumentId, content: &str) -> Result<()>;

    /// Replace the stored hand-edited sanitized content
    async fn update_sanitized_content(&self, id: DocumentId, content: &str) -> Result<()>;

    /// Write the stored original content to the document's file
    async fn write_original_to_file(&self, id: DocumentId, workspace_root: &str) -> Result<()>;

    /// Write the stored sanitized content to the document's file
    async fn write_sanitized_to_file(&self, id: DocumentId, workspace_root: &str) -> Result<()>;
}

#[async_trait]
impl<T: PersistenceClient> PersistenceClient for std::sync::Arc<T> {
    async fn fetch_sanitized_preview(&self, id: DocumentId) -> Result<String> {
        (**self).fetch_sanitized_preview(id).await
    }

    async fn update_original_content(&self, id: DocumentId, content: &str) -> Result<()> {
        (**self).update_original_content(id, content).await
    }

    async fn update_sanitized_content(&self, id: DocumentId, content: &str) -> Result<()> {
        (**self).update_sanitized_content(id, content).await
    }

    async fn write_original_to_file(&self, id: DocumentId, workspace_root: &str) -> Result<()> {
        (**self).write_original_to_file(id, workspace_root).await
    }

    async fn write_sanitized_to_file(&self, id: DocumentId, workspace_root: &str) -> Result<()> {
        (**self).write_sanitized_to_file(id, workspace_root).await
    }
}

/// Asks the user to confirm a destructive action.
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Confirms everything. Used for non-interactive runs.
pub struct AlwaysConfirm;

#[async_trait]
impl Confirmer for AlwaysConfirm {
    async fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}
