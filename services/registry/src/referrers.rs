//! Referrers index
//!
//! For each subject a repository keeps one link per manifest declaring that
//! subject, so that writers for different referrers never touch the same path.

use camino::Utf8Path;
use storage::StorageError;

use crate::digest::Digest;
use crate::storage::RegistryStorage;

/// Reverse index from subject manifests to the manifests referring to them.
#[derive(Debug, Clone, Copy)]
pub struct ReferrerIndex<'r> {
    repository: &'r str,
    storage: &'r RegistryStorage,
}

impl<'r> ReferrerIndex<'r> {
    pub(crate) fn new(repository: &'r str, storage: &'r RegistryStorage) -> Self {
        Self {
            repository,
            storage,
        }
    }

    /// Record that `referrer` declares `subject`.
    #[tracing::instrument(skip(self), fields(repository = %self.repository, %subject, %referrer))]
    pub async fn index(&self, subject: &Digest, referrer: &Digest) -> Result<(), StorageError> {
        let path = self
            .storage
            .paths()
            .referrer_link(self.repository, subject, referrer);
        self.storage.write_link(&path, referrer).await
    }

    /// Every manifest recorded as referring to `subject`, sorted.
    #[tracing::instrument(skip(self), fields(repository = %self.repository, %subject))]
    pub async fn list(&self, subject: &Digest) -> Result<Vec<Digest>, StorageError> {
        let dir = self
            .storage
            .paths()
            .referrers_subject_dir(self.repository, subject);

        let mut referrers: Vec<Digest> = self
            .storage
            .list(&dir)
            .await?
            .iter()
            .filter_map(|path| match referrer_from_link(path) {
                Some(digest) => Some(digest),
                None => {
                    tracing::warn!(%path, "skipping malformed referrer link");
                    None
                }
            })
            .collect();
        referrers.sort();
        referrers.dedup();

        Ok(referrers)
    }
}

/// Recover the referring digest from a path ending in `<alg>/<hex>/link`.
fn referrer_from_link(path: &Utf8Path) -> Option<Digest> {
    let mut components = path.components().rev();
    if components.next()?.as_str() != "link" {
        return None;
    }
    let hex = components.next()?.as_str();
    let algorithm = components.next()?.as_str();
    Digest::from_parts(algorithm, hex).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::PathSpec;
    use storage::{Driver, MemoryStorage};

    fn test_storage() -> (MemoryStorage, RegistryStorage) {
        let memory = MemoryStorage::with_buckets(&["test"]);
        let storage = storage::Storage::new(memory.clone());
        (
            memory,
            RegistryStorage::new(storage.bucket("test"), PathSpec::new("/registry-root")),
        )
    }

    #[tokio::test]
    async fn index_writes_link_with_referrer_digest() {
        let (memory, storage) = test_storage();
        let index = ReferrerIndex::new("myapp", &storage);
        let subject = Digest::sha256(b"subject");
        let referrer = Digest::sha256(b"referrer");

        index.index(&subject, &referrer).await.unwrap();

        let path = format!(
            "/registry-root/v2/repositories/myapp/_refs/subjects/sha256/{}/sha256/{}/link",
            subject.hex(),
            referrer.hex()
        );
        let content = memory
            .get_content("test", Utf8Path::new(&path))
            .await
            .unwrap();
        assert_eq!(content, referrer.to_string().as_bytes());
    }

    #[tokio::test]
    async fn list_returns_every_referrer_once() {
        let (memory, storage) = test_storage();
        let index = ReferrerIndex::new("myapp", &storage);
        let subject = Digest::sha256(b"subject");
        let a = Digest::sha256(b"a");
        let b = Digest::sha256(b"b");

        assert!(index.list(&subject).await.unwrap().is_empty());

        index.index(&subject, &a).await.unwrap();
        index.index(&subject, &b).await.unwrap();
        index.index(&subject, &a).await.unwrap();

        let dir = storage.paths().referrers_subject_dir("myapp", &subject);
        memory
            .put_content("test", &dir.join("sha256/nothex/link"), b"junk")
            .await
            .unwrap();

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(index.list(&subject).await.unwrap(), expected);

        let unrelated = Digest::sha256(b"unrelated");
        assert!(index.list(&unrelated).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn index_is_per_repository() {
        let (_, storage) = test_storage();
        let subject = Digest::sha256(b"subject");
        ReferrerIndex::new("one", &storage)
            .index(&subject, &Digest::sha256(b"r"))
            .await
            .unwrap();

        assert!(ReferrerIndex::new("two", &storage)
            .list(&subject)
            .await
            .unwrap()
            .is_empty());
    }
}
