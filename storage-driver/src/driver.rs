use std::{fmt, io::Cursor};

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use tokio::io;

use crate::error::StorageError;

/// Source of the bytes for an upload.
pub type Reader<'r> = dyn io::AsyncBufRead + Unpin + Send + Sync + 'r;

/// Destination for the bytes of a download.
pub type Writer<'w> = dyn io::AsyncWrite + Unpin + Send + Sync + 'w;

/// What a driver can report about a stored object without reading it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Metadata {
    /// Object size in bytes.
    pub size: u64,

    /// When the object was written.
    pub created: DateTime<Utc>,
}

/// A byte store addressed by bucket and `/`-separated path.
///
/// A missing object or bucket is reported with
/// [`StorageErrorKind::NotFound`](crate::StorageErrorKind::NotFound), never
/// with a generic I/O error, so that callers can treat absence as data.
/// Writes replace whole objects.
#[async_trait::async_trait]
pub trait Driver: fmt::Debug {
    /// Short name of the backend, used in errors and logs.
    fn name(&self) -> &'static str;

    /// Remove an object.
    async fn delete(&self, bucket: &str, remote: &Utf8Path) -> Result<(), StorageError>;

    /// Stat an object.
    async fn metadata(&self, bucket: &str, remote: &Utf8Path) -> Result<Metadata, StorageError>;

    /// Write an object from a stream, replacing any previous content.
    async fn upload(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        reader: &mut Reader<'_>,
    ) -> Result<(), StorageError>;

    /// Stream an object into `writer`.
    async fn download(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        writer: &mut Writer<'_>,
    ) -> Result<(), StorageError>;

    /// Every object below `prefix`, recursively, or the whole bucket.
    ///
    /// The prefix matches whole path components: `a/b` lists `a/b/c` but not
    /// `a/bc`.
    async fn list(
        &self,
        bucket: &str,
        prefix: Option<&Utf8Path>,
    ) -> Result<Vec<String>, StorageError>;

    /// Write an object held in memory.
    async fn put_content(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        content: &[u8],
    ) -> Result<(), StorageError> {
        tracing::trace!(%remote, size = content.len(), "put content");
        let mut reader = io::BufReader::new(content);
        self.upload(bucket, remote, &mut reader).await
    }

    /// Read a whole object into memory.
    async fn get_content(&self, bucket: &str, remote: &Utf8Path) -> Result<Vec<u8>, StorageError> {
        tracing::trace!(%remote, "get content");
        let mut content = Vec::new();
        self.download(bucket, remote, &mut Cursor::new(&mut content))
            .await?;
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_obj_safe!(Driver);
}
