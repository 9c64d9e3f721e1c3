//! Content-addressed blob storage
//!
//! [`BlobStore`] holds the bytes of every blob exactly once, at a path derived
//! from its digest. [`LinkedBlobStore`] is a repository's view of it: a blob
//! is only visible in a repository once a link to it has been written there.

use bytes::Bytes;
use storage::StorageError;

use crate::descriptor::Descriptor;
use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult};
use crate::media_type::OCTET_STREAM;
use crate::storage::RegistryStorage;

/// The global, content-addressed blob store.
#[derive(Debug, Clone)]
pub struct BlobStore {
    storage: RegistryStorage,
}

impl BlobStore {
    /// Create a blob store on top of registry storage.
    pub fn new(storage: RegistryStorage) -> Self {
        Self { storage }
    }

    /// Store `content`, returning its descriptor.
    ///
    /// The digest is computed here from the bytes. Storing bytes which are
    /// already present writes nothing.
    pub async fn put(&self, media_type: &str, content: &[u8]) -> RegistryResult<Descriptor> {
        let digest = Digest::sha256(content);
        self.write(&digest, media_type, content).await
    }

    #[tracing::instrument(skip(self, content), fields(%digest, size = content.len()))]
    async fn write(
        &self,
        digest: &Digest,
        media_type: &str,
        content: &[u8],
    ) -> RegistryResult<Descriptor> {
        let path = self.storage.paths().blob_data(digest);
        if let Some(existing) = self.storage.stat(&path).await? {
            tracing::debug!("blob already present");
            return Ok(Descriptor::new(media_type, digest, existing.size));
        }

        self.storage.put_content(&path, content).await?;
        Ok(Descriptor::new(media_type, digest, content.len() as u64))
    }

    /// Stat a blob, `None` if it is not stored.
    pub async fn stat(&self, digest: &Digest) -> Result<Option<Descriptor>, StorageError> {
        let path = self.storage.paths().blob_data(digest);
        Ok(self
            .storage
            .stat(&path)
            .await?
            .map(|metadata| Descriptor::new(OCTET_STREAM, digest, metadata.size)))
    }

    /// Fetch the bytes of a blob.
    pub async fn get(&self, digest: &Digest) -> RegistryResult<Bytes> {
        let path = self.storage.paths().blob_data(digest);
        match self.storage.get_content(&path).await {
            Ok(content) => Ok(content.into()),
            Err(err) if err.is_not_found() => Err(RegistryError::BlobNotFound(digest.to_string())),
            Err(err) => Err(err.into()),
        }
    }
}

/// Which kind of link makes a blob visible in a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Layers, configs and other blobs pushed to the repository.
    Layers,
    /// Manifest revisions.
    ManifestRevisions,
}

/// A repository-scoped view of the blob store.
#[derive(Debug, Clone)]
pub struct LinkedBlobStore {
    repository: String,
    blobs: BlobStore,
    storage: RegistryStorage,
    kind: LinkKind,
}

impl LinkedBlobStore {
    pub(crate) fn new(repository: &str, storage: RegistryStorage, kind: LinkKind) -> Self {
        Self {
            repository: repository.to_string(),
            blobs: BlobStore::new(storage.clone()),
            storage,
            kind,
        }
    }

    fn link_path(&self, digest: &Digest) -> camino::Utf8PathBuf {
        let paths = self.storage.paths();
        match self.kind {
            LinkKind::Layers => paths.layer_link(&self.repository, digest),
            LinkKind::ManifestRevisions => paths.manifest_revision_link(&self.repository, digest),
        }
    }

    /// Store `content` and link it into the repository.
    #[tracing::instrument(
        skip(self, content),
        fields(repository = %self.repository, kind = ?self.kind)
    )]
    pub async fn put(&self, media_type: &str, content: &[u8]) -> RegistryResult<Descriptor> {
        let descriptor = self.blobs.put(media_type, content).await?;
        let digest = descriptor.digest()?;
        self.link(&digest).await?;
        Ok(descriptor)
    }

    /// Store content uploaded under a client-supplied digest.
    ///
    /// The content is hashed with the algorithm of `expected`; nothing is
    /// written when the digests differ.
    #[tracing::instrument(skip(self, content), fields(repository = %self.repository, %expected))]
    pub async fn accept(&self, expected: &Digest, content: &[u8]) -> RegistryResult<Descriptor> {
        let actual = expected.algorithm().digest(content);
        if actual != *expected {
            return Err(RegistryError::DigestMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        let descriptor = self.blobs.write(expected, OCTET_STREAM, content).await?;
        self.link(expected).await?;
        Ok(descriptor)
    }

    /// Make an already stored blob visible in this repository.
    pub async fn link(&self, digest: &Digest) -> Result<(), StorageError> {
        self.storage
            .write_link(&self.link_path(digest), digest)
            .await
    }

    /// Link a blob that `source` already links, without touching its bytes.
    #[tracing::instrument(
        skip(self, source),
        fields(repository = %self.repository, from = %source.repository, %digest)
    )]
    pub async fn mount(
        &self,
        source: &LinkedBlobStore,
        digest: &Digest,
    ) -> RegistryResult<Descriptor> {
        let descriptor = source
            .stat(digest)
            .await?
            .ok_or_else(|| RegistryError::BlobNotFound(digest.to_string()))?;
        self.link(digest).await?;
        Ok(descriptor)
    }

    /// Stat a blob through this repository, `None` unless it is both linked
    /// and stored.
    pub async fn stat(&self, digest: &Digest) -> Result<Option<Descriptor>, StorageError> {
        if self.storage.stat(&self.link_path(digest)).await?.is_none() {
            return Ok(None);
        }
        self.blobs.stat(digest).await
    }

    /// Whether the repository holds a link for this digest.
    pub async fn is_linked(&self, digest: &Digest) -> Result<bool, StorageError> {
        Ok(self.storage.stat(&self.link_path(digest)).await?.is_some())
    }

    /// Fetch a blob through this repository.
    pub async fn get(&self, digest: &Digest) -> RegistryResult<Bytes> {
        if !self.is_linked(digest).await? {
            return Err(RegistryError::BlobNotFound(digest.to_string()));
        }
        self.blobs.get(digest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::PathSpec;
    use storage::MemoryStorage;

    fn test_storage() -> (MemoryStorage, RegistryStorage) {
        let memory = MemoryStorage::with_buckets(&["test"]);
        let storage = storage::Storage::new(memory.clone());
        (
            memory,
            RegistryStorage::new(storage.bucket("test"), PathSpec::default()),
        )
    }

    #[tokio::test]
    async fn put_is_content_addressed_and_idempotent() {
        let (memory, storage) = test_storage();
        let blobs = BlobStore::new(storage);

        let first = blobs.put(OCTET_STREAM, b"test data").await.unwrap();
        let second = blobs.put(OCTET_STREAM, b"test data").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.digest().unwrap(), Digest::sha256(b"test data"));
        assert_eq!(first.size, 9);
        assert_eq!(memory.object_count().await, 1);

        let digest = first.digest().unwrap();
        assert_eq!(&blobs.get(&digest).await.unwrap()[..], b"test data");
        assert_eq!(blobs.stat(&digest).await.unwrap().unwrap().size, 9);
    }

    #[tokio::test]
    async fn missing_blobs() {
        let (_, storage) = test_storage();
        let blobs = BlobStore::new(storage);
        let digest = Digest::sha256(b"absent");

        assert!(blobs.stat(&digest).await.unwrap().is_none());
        assert!(matches!(
            blobs.get(&digest).await,
            Err(RegistryError::BlobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn linked_store_scopes_visibility() {
        let (_, storage) = test_storage();
        let app = LinkedBlobStore::new("app", storage.clone(), LinkKind::Layers);
        let other = LinkedBlobStore::new("other", storage.clone(), LinkKind::Layers);

        let descriptor = app.put(OCTET_STREAM, b"layer").await.unwrap();
        let digest = descriptor.digest().unwrap();

        assert!(app.stat(&digest).await.unwrap().is_some());
        assert!(other.stat(&digest).await.unwrap().is_none());
        assert!(matches!(
            other.get(&digest).await,
            Err(RegistryError::BlobNotFound(_))
        ));

        other.mount(&app, &digest).await.unwrap();
        assert_eq!(&other.get(&digest).await.unwrap()[..], b"layer");
    }

    #[tokio::test]
    async fn mount_requires_source_link() {
        let (_, storage) = test_storage();
        let app = LinkedBlobStore::new("app", storage.clone(), LinkKind::Layers);
        let other = LinkedBlobStore::new("other", storage, LinkKind::Layers);

        let result = other.mount(&app, &Digest::sha256(b"nothing")).await;
        assert!(matches!(result, Err(RegistryError::BlobNotFound(_))));
    }

    #[tokio::test]
    async fn accept_checks_digest_before_writing() {
        let (memory, storage) = test_storage();
        let app = LinkedBlobStore::new("app", storage, LinkKind::Layers);
        let wrong: Digest = format!("sha256:{}", "0".repeat(64)).parse().unwrap();

        let result = app.accept(&wrong, b"test data").await;
        assert!(matches!(result, Err(RegistryError::DigestMismatch { .. })));
        assert_eq!(memory.object_count().await, 0);

        let right = crate::digest::Algorithm::Sha512.digest(b"test data");
        app.accept(&right, b"test data").await.unwrap();
        assert!(app.stat(&right).await.unwrap().is_some());
    }
}
