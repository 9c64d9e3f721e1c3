use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt as _;
use tokio::sync::RwLock;

use storage_driver::{Driver, Metadata, Reader, StorageError, StorageErrorKind, Writer};

const ENGINE: &str = "memory";

#[derive(Debug)]
struct Object {
    written: DateTime<Utc>,
    content: Vec<u8>,
}

impl Object {
    fn new(content: Vec<u8>) -> Self {
        Self {
            written: Utc::now(),
            content,
        }
    }

    fn metadata(&self) -> Metadata {
        Metadata {
            size: self.content.len() as u64,
            created: self.written,
        }
    }
}

// Ordered so that listings come out sorted.
type Objects = BTreeMap<Utf8PathBuf, Object>;

/// Storage driver that keeps every object in process memory.
///
/// Reads from an unknown bucket fail with
/// [`StorageErrorKind::NotFound`]; writes create the bucket on demand.
/// Clones share the same buckets, so a test can keep a handle to inspect
/// what was written through a [`Storage`](crate::Storage).
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    buckets: Arc<RwLock<HashMap<String, Objects>>>,
}

impl MemoryStorage {
    /// An empty store with no buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with the named buckets already present.
    pub fn with_buckets(names: &[&str]) -> Self {
        let buckets = names
            .iter()
            .map(|name| (name.to_string(), Objects::new()))
            .collect();
        Self {
            buckets: Arc::new(RwLock::new(buckets)),
        }
    }

    /// Add an empty bucket, leaving an existing one untouched.
    pub async fn create_bucket(&self, name: String) {
        self.buckets.write().await.entry(name).or_default();
    }

    /// Number of objects held across all buckets.
    pub async fn object_count(&self) -> usize {
        self.buckets.read().await.values().map(BTreeMap::len).sum()
    }
}

fn no_bucket(bucket: &str) -> StorageError {
    StorageError::builder(
        ENGINE,
        StorageErrorKind::NotFound,
        format!("no bucket named {bucket}"),
    )
    .bucket(bucket)
    .build()
}

fn no_object(bucket: &str, remote: &Utf8Path) -> StorageError {
    StorageError::not_found(ENGINE, bucket, remote.as_str())
}

#[async_trait::async_trait]
impl Driver for MemoryStorage {
    fn name(&self) -> &'static str {
        ENGINE
    }

    async fn metadata(&self, bucket: &str, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        let buckets = self.buckets.read().await;
        let objects = buckets.get(bucket).ok_or_else(|| no_bucket(bucket))?;
        objects
            .get(remote)
            .map(Object::metadata)
            .ok_or_else(|| no_object(bucket, remote))
    }

    async fn delete(&self, bucket: &str, remote: &Utf8Path) -> Result<(), StorageError> {
        let mut buckets = self.buckets.write().await;
        buckets
            .get_mut(bucket)
            .ok_or_else(|| no_bucket(bucket))?
            .remove(remote);
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        reader: &mut Reader<'_>,
    ) -> Result<(), StorageError> {
        // Drain the reader before taking the lock.
        let mut content = Vec::new();
        tokio::io::copy(reader, &mut content)
            .await
            .map_err(|err| StorageError::from_io(ENGINE, err))?;

        self.buckets
            .write()
            .await
            .entry(bucket.to_owned())
            .or_default()
            .insert(remote.to_owned(), Object::new(content));
        Ok(())
    }

    async fn download(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        writer: &mut Writer<'_>,
    ) -> Result<(), StorageError> {
        let buckets = self.buckets.read().await;
        let object = buckets
            .get(bucket)
            .ok_or_else(|| no_bucket(bucket))?
            .get(remote)
            .ok_or_else(|| no_object(bucket, remote))?;

        writer
            .write_all(&object.content)
            .await
            .map_err(|err| StorageError::from_io(ENGINE, err))?;
        writer
            .flush()
            .await
            .map_err(|err| StorageError::from_io(ENGINE, err))?;
        Ok(())
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: Option<&Utf8Path>,
    ) -> Result<Vec<String>, StorageError> {
        let buckets = self.buckets.read().await;
        let objects = buckets.get(bucket).ok_or_else(|| no_bucket(bucket))?;

        let listed: Vec<String> = objects
            .keys()
            .filter(|path| prefix.is_none_or(|prefix| path.starts_with(prefix)))
            .map(|path| path.to_string())
            .collect();
        tracing::trace!(%bucket, ?prefix, count = listed.len(), "listed memory bucket");
        Ok(listed)
    }
}
