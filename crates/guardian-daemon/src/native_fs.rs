//! Native filesystem implementation using tokio::fs.
//!
//! Paths are absolute: the store resolves document paths against their
//! workspace root before handing them over.

use async_trait::async_trait;
use guardian_core::fs::{FileSystem, FsError, Result};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

fn map_io(path: &str, err: std::io::Error) -> FsError {
    match err.kind() {
        ErrorKind::NotFound => FsError::NotFound(path.to_string()),
        _ => FsError::Io(format!("{}: {}", path, err)),
    }
}

/// Native filesystem implementation for the daemon
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeFs;

impl NativeFs {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for NativeFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let metadata = fs::metadata(path).await.map_err(|e| map_io(path, e))?;
        if metadata.is_dir() {
            return Err(FsError::IsDirectory(path.to_string()));
        }
        fs::read(path).await.map_err(|e| map_io(path, e))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        // Create parent directories if needed
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(path, e))?;
        }

        fs::write(path, content).await.map_err(|e| map_io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/.env");
        let path = path.to_str().unwrap();
        let fs = NativeFs::new();

        fs.write(path, b"KEY=value\n").await.unwrap();

        assert!(Path::new(path).is_file());
        assert_eq!(fs.read(path).await.unwrap(), b"KEY=value\n");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.json");
        let fs = NativeFs::new();

        let err = fs.read(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reading_a_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let fs = NativeFs::new();

        let err = fs.read(temp_dir.path().to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, FsError::IsDirectory(_)));
    }

    #[tokio::test]
    async fn test_write_replaces_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.yml");
        let path = path.to_str().unwrap();
        let fs = NativeFs::new();

        fs.write(path, b"a: 1").await.unwrap();
        fs.write(path, b"a: 2").await.unwrap();

        assert_eq!(fs.read(path).await.unwrap(), b"a: 2");
    }
}
