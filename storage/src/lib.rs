//! # Storage backends
//!
//! Configuration and unification for the storage backends.

use std::sync::Arc;

use camino::Utf8Path;
#[cfg(feature = "local")]
use camino::Utf8PathBuf;
use serde::Deserialize;

#[cfg(feature = "local")]
pub(crate) mod local;

pub(crate) mod memory;
#[cfg(feature = "tmp")]
pub(crate) mod temp;

#[cfg(feature = "local")]
#[doc(inline)]
pub use local::LocalDriver;

#[doc(inline)]
pub use memory::MemoryStorage;

#[cfg(feature = "tmp")]
#[doc(inline)]
pub use temp::TempDriver;

#[doc(inline)]
pub use storage_driver::{Driver, Metadata, Reader, StorageError, StorageErrorKind, Writer};

/// Selects and configures a storage backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageConfig {
    /// Keep everything in process memory, in a single pre-created bucket.
    Memory {
        /// The bucket to create.
        bucket: String,
    },

    /// Store files below a directory on the local filesystem.
    #[cfg(feature = "local")]
    Local {
        /// Root directory for all buckets.
        path: Utf8PathBuf,
    },

    /// Store files in a fresh temporary directory, removed on drop.
    #[cfg(feature = "tmp")]
    Temp,
}

impl StorageConfig {
    /// Construct the configured backend.
    #[tracing::instrument]
    pub async fn build(self) -> Result<Storage, StorageError> {
        let client: Storage = match self {
            StorageConfig::Memory { bucket } => {
                MemoryStorage::with_buckets(&[bucket.as_str()]).into()
            }
            #[cfg(feature = "local")]
            StorageConfig::Local { path } => LocalDriver::new(path).into(),
            #[cfg(feature = "tmp")]
            StorageConfig::Temp => TempDriver::new()
                .map_err(|err| StorageError::from_io("temp", err))?
                .into(),
        };
        Ok(client)
    }
}

pub(crate) type ArcDriver = Arc<dyn Driver + Send + Sync>;

/// A cheaply cloneable handle to a storage backend.
#[derive(Debug, Clone)]
pub struct Storage {
    driver: ArcDriver,
}

impl<D> From<D> for Storage
where
    D: Driver + Send + Sync + 'static,
{
    fn from(value: D) -> Self {
        Storage::new(value)
    }
}

impl Storage {
    /// Wrap a driver.
    pub fn new<D: Driver + Send + Sync + 'static>(driver: D) -> Self {
        Self {
            driver: Arc::new(driver),
        }
    }

    /// Name of the underlying driver.
    pub fn name(&self) -> &str {
        self.driver.name()
    }

    /// A view of this storage scoped to one bucket.
    pub fn bucket<S: Into<String>>(&self, bucket: S) -> StorageBucket {
        StorageBucket {
            driver: self.driver.clone(),
            bucket: bucket.into(),
        }
    }
}

/// Storage scoped to a single bucket.
#[derive(Debug, Clone)]
pub struct StorageBucket {
    /// The bucket all operations address.
    pub bucket: String,
    driver: ArcDriver,
}

impl StorageBucket {
    /// Stat a file.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name(), bucket=%self.bucket))]
    pub async fn metadata(&self, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        self.driver.metadata(&self.bucket, remote).await
    }

    /// Write a whole file.
    #[tracing::instrument(
        skip(self, content),
        fields(driver = self.driver.name(), bucket = %self.bucket, size = content.len())
    )]
    pub async fn put_content(&self, remote: &Utf8Path, content: &[u8]) -> Result<(), StorageError> {
        self.driver.put_content(&self.bucket, remote, content).await
    }

    /// Read a whole file.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name(), bucket=%self.bucket))]
    pub async fn get_content(&self, remote: &Utf8Path) -> Result<Vec<u8>, StorageError> {
        self.driver.get_content(&self.bucket, remote).await
    }

    /// List files below a prefix.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name(), bucket=%self.bucket))]
    pub async fn list(&self, prefix: Option<&Utf8Path>) -> Result<Vec<String>, StorageError> {
        self.driver.list(&self.bucket, prefix).await
    }

    /// Remove a file.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name(), bucket=%self.bucket))]
    pub async fn delete(&self, path: &Utf8Path) -> Result<(), StorageError> {
        self.driver.delete(&self.bucket, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bucket_round_trips_content() {
        let storage: Storage = MemoryStorage::with_buckets(&["test"]).into();
        let bucket = storage.bucket("test");
        let path = Utf8Path::new("/a/b/c");

        bucket.put_content(path, b"hello").await.unwrap();
        assert_eq!(bucket.get_content(path).await.unwrap(), b"hello");
        assert_eq!(bucket.metadata(path).await.unwrap().size, 5);

        bucket.delete(path).await.unwrap();
        let err = bucket.metadata(path).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn memory_config_builds_bucket() {
        let storage = StorageConfig::Memory {
            bucket: "registry".into(),
        }
        .build()
        .await
        .unwrap();

        assert_eq!(storage.name(), "memory");
        let files = storage.bucket("registry").list(None).await.unwrap();
        assert!(files.is_empty());
    }
}
