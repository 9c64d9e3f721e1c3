use camino::{Utf8Path, Utf8PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::Instrument;

use storage_driver::{Driver, Metadata, Reader, StorageError, StorageErrorKind, Writer};

const ENGINE: &str = "local";

/// Storage driver backed by a directory on the local filesystem.
///
/// Files for a bucket live below `<root>/<bucket>/b/`. Remote paths are
/// always relative to that directory, a leading `/` is ignored.
#[derive(Debug)]
pub struct LocalDriver {
    root: Utf8PathBuf,
}

impl LocalDriver {
    /// Create a driver rooted at the given directory.
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    fn bucket_root(&self, bucket: &str) -> Utf8PathBuf {
        let mut path = self.root.join(bucket);
        path.push("b");
        path
    }

    fn path(&self, bucket: &str, remote: &Utf8Path) -> Result<Utf8PathBuf, StorageError> {
        let relative = remote.strip_prefix("/").unwrap_or(remote);
        if relative
            .components()
            .any(|c| matches!(c, camino::Utf8Component::ParentDir))
        {
            return Err(StorageError::builder(
                ENGINE,
                StorageErrorKind::InvalidRequest,
                format!("path escapes bucket: {remote}"),
            )
            .bucket(bucket)
            .path(remote.as_str())
            .build());
        }

        Ok(self.bucket_root(bucket).join(relative))
    }
}

fn io_error(bucket: &str, remote: &Utf8Path, context: &str, err: std::io::Error) -> StorageError {
    StorageError::builder(ENGINE, StorageErrorKind::from_io(&err), err)
        .bucket(bucket)
        .path(remote.as_str())
        .context(context)
        .build()
}

#[async_trait::async_trait]
impl Driver for LocalDriver {
    fn name(&self) -> &'static str {
        ENGINE
    }

    async fn metadata(&self, bucket: &str, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        let path = self.path(bucket, remote)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|err| io_error(bucket, remote, "metadata", err))?;
        if metadata.is_dir() {
            return Err(StorageError::not_found(ENGINE, bucket, remote.as_str()));
        }

        Ok(Metadata {
            size: metadata.len(),
            created: metadata
                .created()
                .or_else(|_| metadata.modified())
                .map_err(|err| io_error(bucket, remote, "created timestamp", err))?
                .into(),
        })
    }

    async fn delete(&self, bucket: &str, remote: &Utf8Path) -> Result<(), StorageError> {
        let path = self.path(bucket, remote)?;
        tokio::fs::remove_file(path)
            .await
            .map_err(|err| io_error(bucket, remote, "remove file", err))?;
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        local: &mut Reader<'_>,
    ) -> Result<(), StorageError> {
        let path = self.path(bucket, remote)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| io_error(bucket, remote, "create parent directories", err))?;
        }

        let mut writer = tokio::io::BufWriter::new(
            tokio::fs::File::create(&path)
                .await
                .map_err(|err| io_error(bucket, remote, "create file", err))?,
        );

        tokio::io::copy(local, &mut writer)
            .await
            .map_err(|err| io_error(bucket, remote, "write file", err))?;

        writer
            .shutdown()
            .await
            .map_err(|err| io_error(bucket, remote, "shutdown writer", err))?;
        Ok(())
    }

    async fn download(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        local: &mut Writer<'_>,
    ) -> Result<(), StorageError> {
        let path = self.path(bucket, remote)?;

        let mut reader = tokio::io::BufReader::new(
            tokio::fs::File::open(&path)
                .await
                .map_err(|err| io_error(bucket, remote, "open file", err))?,
        );

        tokio::io::copy(&mut reader, local)
            .await
            .map_err(|err| io_error(bucket, remote, "read file", err))?;

        local
            .flush()
            .await
            .map_err(|err| io_error(bucket, remote, "flush writer", err))?;

        Ok(())
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: Option<&Utf8Path>,
    ) -> Result<Vec<String>, StorageError> {
        let base = self.bucket_root(bucket);
        let start = match prefix {
            Some(prefix) => self.path(bucket, prefix)?,
            None => base.clone(),
        };

        let items = tokio::task::spawn_blocking(move || collect_list(&base, &start))
            .in_current_span()
            .await
            .map_err(|err| StorageError::new(ENGINE, StorageErrorKind::Other, err))?
            .map_err(|err| StorageError::from_io(ENGINE, err))?;

        tracing::debug!("Found {} entries", items.len());
        Ok(items)
    }
}

/// Walk `start` and return every file below it, relative to `base`.
fn collect_list(base: &Utf8Path, start: &Utf8Path) -> std::io::Result<Vec<String>> {
    let mut files = Vec::new();
    if start.is_dir() {
        visit(start, &mut files)?;
    } else if start.is_file() {
        files.push(start.to_owned());
    }

    let mut items: Vec<String> = files
        .into_iter()
        .filter_map(|p| p.strip_prefix(base).ok().map(|p| p.to_string()))
        .collect();
    items.sort();
    Ok(items)
}

fn visit(path: &Utf8Path, files: &mut Vec<Utf8PathBuf>) -> std::io::Result<()> {
    for entry in path.read_dir_utf8()? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            visit(entry.path(), files)?;
        } else {
            files.push(entry.path().to_owned())
        }
    }

    Ok(())
}
