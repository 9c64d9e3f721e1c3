//! Storage layer for the registry

use camino::{Utf8Path, Utf8PathBuf};
use storage::{Metadata, StorageBucket, StorageError};

use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult};
use crate::paths::PathSpec;

/// Registry storage backend: one bucket plus the path layout inside it.
#[derive(Clone, Debug)]
pub struct RegistryStorage {
    bucket: StorageBucket,
    paths: PathSpec,
}

impl RegistryStorage {
    /// Create a new registry storage
    pub fn new(bucket: StorageBucket, paths: PathSpec) -> Self {
        Self { bucket, paths }
    }

    /// The path layout.
    pub fn paths(&self) -> &PathSpec {
        &self.paths
    }

    /// Write a whole file.
    pub async fn put_content(&self, path: &Utf8Path, content: &[u8]) -> Result<(), StorageError> {
        self.bucket.put_content(path, content).await
    }

    /// Read a whole file.
    pub async fn get_content(&self, path: &Utf8Path) -> Result<Vec<u8>, StorageError> {
        self.bucket.get_content(path).await
    }

    /// Stat a file, mapping absence to `None`.
    pub async fn stat(&self, path: &Utf8Path) -> Result<Option<Metadata>, StorageError> {
        match self.bucket.metadata(path).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// List every file below `prefix`; a missing directory lists as empty.
    pub async fn list(&self, prefix: &Utf8Path) -> Result<Vec<Utf8PathBuf>, StorageError> {
        match self.bucket.list(Some(prefix)).await {
            Ok(files) => Ok(files.into_iter().map(Utf8PathBuf::from).collect()),
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    /// Write a link file holding `digest`.
    pub async fn write_link(&self, path: &Utf8Path, digest: &Digest) -> Result<(), StorageError> {
        self.put_content(path, digest.to_string().as_bytes()).await
    }

    /// Read the digest held by a link file, `None` if the link does not exist.
    ///
    /// Surrounding whitespace, such as a trailing newline, is ignored.
    pub async fn read_link(&self, path: &Utf8Path) -> RegistryResult<Option<Digest>> {
        let content = match self.get_content(path).await {
            Ok(content) => content,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let text = String::from_utf8_lossy(&content);
        let digest = text.trim().parse().map_err(RegistryError::InvalidDigest)?;
        Ok(Some(digest))
    }
}
