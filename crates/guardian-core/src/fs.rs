//! FileSystem trait abstraction for writing documents back to their workspace.
//!
//! Implementations:
//! - `InMemoryFs` - For testing
//! - `NativeFs` (in guardian-daemon) - Uses tokio::fs
//!
//! Paths handed to a `FileSystem` are already resolved against the workspace
//! root by the caller; see `store::resolve_document_path`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Is a directory: {0}")]
    IsDirectory(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// Platform-independent filesystem abstraction.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read file contents
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write file contents (creates parent directories if needed)
    async fn write(&self, path: &str, content: &[u8]) -> Result<()>;
}

/// In-memory filesystem for testing
#[derive(Default)]
pub struct InMemoryFs {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file without going through the async API.
    pub fn insert(&self, path: &str, content: impl Into<Vec<u8>>) {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.insert(Self::normalize_path(path), content.into());
    }

    /// Read a file as UTF-8, for assertions.
    pub fn contents(&self, path: &str) -> Option<String> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files
            .get(&Self::normalize_path(path))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    fn normalize_path(path: &str) -> String {
        path.trim_end_matches('/').to_string()
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = Self::normalize_path(path);
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files.get(&path).cloned().ok_or(FsError::NotFound(path))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let path = Self::normalize_path(path);
        if path.is_empty() {
            return Err(FsError::IsDirectory(path));
        }
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.insert(path, content.to_vec());
        Ok(())
    }
}

// Lets a test keep a handle on the filesystem it gave to a store.
#[async_trait]
impl<T: FileSystem> FileSystem for std::sync::Arc<T> {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        (**self).read(path).await
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        (**self).write(path, content).await
    }
}
