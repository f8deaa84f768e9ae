//! File-based blob store

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::{
    config::{BackendType, StoreConfig},
    error::{StorageError, StorageResult},
    traits::{validate_key, BlobStore},
};

const BLOB_SUFFIX: &str = ".json";

/// Blob store rooted at a base directory, one file per key
///
/// Key `view_1/count` lives at `<base_dir>/view_1/count.json`.
pub struct FileBackend {
    base_dir: PathBuf,
    fsync: bool,
}

impl FileBackend {
    /// Create a new file backend
    pub async fn new(config: &StoreConfig) -> StorageResult<Self> {
        if config.backend != BackendType::File {
            return Err(StorageError::configuration(
                "Invalid backend config for file storage",
            ));
        }

        let backend = Self::open(&config.base_dir).await?;
        Ok(Self {
            fsync: config.fsync,
            ..backend
        })
    }

    /// Open (creating if needed) a store at base_dir
    pub async fn open(base_dir: impl AsRef<Path>) -> StorageResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir).await?;
        Ok(Self {
            base_dir,
            fsync: true,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn blob_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.base_dir.join(format!("{key}{BLOB_SUFFIX}")))
    }

    fn dir_path(&self, dir: &str) -> StorageResult<PathBuf> {
        let dir = dir.trim_matches('/');
        if dir.is_empty() {
            return Ok(self.base_dir.clone());
        }
        validate_key(dir)?;
        Ok(self.base_dir.join(dir))
    }

    /// Write to a temp sibling, then rename it over the target
    async fn write_atomic(&self, path: &Path, blob: &[u8]) -> StorageResult<()> {
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::invalid_key(path.display()))?;
        fs::create_dir_all(parent).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(blob).await?;
            if self.fsync {
                file.sync_all().await?;
            }
            drop(file);
            fs::rename(&temp_path, path).await
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!("Failed to remove temp file {}: {}", temp_path.display(), cleanup);
                }
            }
            return Err(StorageError::Io(e));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FileBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::File
    }

    async fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.blob_path(key)?;
        match fs::read(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn write(&self, key: &str, blob: &[u8]) -> StorageResult<()> {
        let path = self.blob_path(key)?;
        self.write_atomic(&path, blob).await?;
        debug!("Wrote {} bytes to {}", blob.len(), path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        let path = self.blob_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn list(&self, dir: &str) -> StorageResult<Vec<String>> {
        let dir_path = self.dir_path(dir)?;
        let mut entries = match fs::read_dir(&dir_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                // temp files start with '.'
                if name.starts_with('.') {
                    continue;
                }
                if let Some(stem) = name.strip_suffix(BLOB_SUFFIX) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
