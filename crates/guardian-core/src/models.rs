//! Workspace and document metadata shared by the engine and the store.

use serde::{Deserialize, Serialize};

/// Opaque key naming a document. Stable for the lifetime of the document.
pub type DocumentId = i64;

pub type WorkspaceId = i64;

/// A directory tree that documents live in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    /// Absolute path of the workspace directory
    pub root_path: String,
}

/// A tracked config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    /// Path relative to the workspace root
    pub path: String,
    pub original_content: String,
    /// Hand-edited sanitized content, if the user ever saved one
    pub sanitized_content: Option<String>,
}

/// Everything the store knows, in a serializable form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub workspaces: Vec<Workspace>,
    pub documents: Vec<Document>,
    /// Next id handed out by the store (shared by workspaces and documents)
    pub next_id: i64,
}
