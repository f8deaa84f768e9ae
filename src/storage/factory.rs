//! Storage factory for creating containers

use std::sync::Arc;

use super::backends::{FileBackend, MemoryBackend};
use super::config::{BackendType, StoreConfig};
use super::error::StorageResult;
use super::Container;

/// Factory for creating storage containers
pub struct StorageFactory;

impl StorageFactory {
    /// Create a container from explicit configuration
    pub async fn from_config(config: &StoreConfig) -> StorageResult<Arc<Container>> {
        match config.backend {
            BackendType::File => {
                let backend = FileBackend::new(config).await?;
                Ok(Container::new(backend))
            }
            BackendType::Memory => {
                let backend = MemoryBackend::new(config)?;
                Ok(Container::new(backend))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_factory_creates_file_backend() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::file(dir.path().join("store"));

        let container = StorageFactory::from_config(&config).await.unwrap();
        assert_eq!(container.backend_type(), BackendType::File);
        assert!(dir.path().join("store").is_dir());
    }

    #[tokio::test]
    async fn test_factory_creates_memory_backend() {
        let container = StorageFactory::from_config(&StoreConfig::memory())
            .await
            .unwrap();
        assert_eq!(container.backend_type(), BackendType::Memory);
        assert!(container.backend().list("").await.unwrap().is_empty());
    }
}
