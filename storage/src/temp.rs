use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use crate::local::LocalDriver;
use storage_driver::{Driver, Metadata, Reader, StorageError, Writer};

/// A storage driver that stores files in a temporary directory.
///
/// The directory and everything in it is removed when the driver is dropped.
#[derive(Debug)]
pub struct TempDriver {
    dir: TempDir,
    driver: LocalDriver,
}

impl TempDriver {
    /// Create a new `TempDriver` instance, storing files in a temporary directory.
    pub fn new() -> io::Result<Self> {
        let tmp = TempDir::new()?;
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_owned()).map_err(|path| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("temporary directory is not utf-8: {}", path.display()),
            )
        })?;

        Ok(Self {
            dir: tmp,
            driver: LocalDriver::new(root),
        })
    }

    /// The directory backing this driver.
    pub fn root(&self) -> &std::path::Path {
        self.dir.path()
    }
}

#[async_trait::async_trait]
impl Driver for TempDriver {
    fn name(&self) -> &'static str {
        "temp"
    }

    async fn metadata(&self, bucket: &str, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        self.driver.metadata(bucket, remote).await
    }

    async fn delete(&self, bucket: &str, remote: &Utf8Path) -> Result<(), StorageError> {
        self.driver.delete(bucket, remote).await
    }

    async fn upload(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        local: &mut Reader<'_>,
    ) -> Result<(), StorageError> {
        self.driver.upload(bucket, remote, local).await
    }

    async fn download(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        local: &mut Writer<'_>,
    ) -> Result<(), StorageError> {
        self.driver.download(bucket, remote, local).await
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: Option<&Utf8Path>,
    ) -> Result<Vec<String>, StorageError> {
        self.driver.list(bucket, prefix).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn files_land_below_the_bucket() {
        let driver = TempDriver::new().unwrap();
        driver
            .put_content("reg", Utf8Path::new("/v2/blobs/x/data"), b"abc")
            .await
            .unwrap();

        let on_disk = driver.root().join("reg/b/v2/blobs/x/data");
        assert_eq!(std::fs::read(on_disk).unwrap(), b"abc");

        let listed = driver
            .list("reg", Some(Utf8Path::new("/v2/blobs")))
            .await
            .unwrap();
        assert_eq!(listed, vec!["v2/blobs/x/data".to_string()]);

        let meta = driver
            .metadata("reg", Utf8Path::new("/v2/blobs/x/data"))
            .await
            .unwrap();
        assert_eq!(meta.size, 3);
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let driver = TempDriver::new().unwrap();
        let err = driver
            .metadata("reg", Utf8Path::new("/absent"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = driver
            .get_content("reg", Utf8Path::new("/absent"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let listed = driver
            .list("reg", Some(Utf8Path::new("/absent")))
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn parent_components_are_rejected() {
        let driver = TempDriver::new().unwrap();
        let err = driver
            .put_content("reg", Utf8Path::new("/../escape"), b"x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), storage_driver::StorageErrorKind::InvalidRequest);
    }
}
