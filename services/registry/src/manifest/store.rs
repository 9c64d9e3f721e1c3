//! Repository-scoped manifest storage and tags

use std::sync::LazyLock;

use bytes::Bytes;
use regex::Regex;
use storage::StorageError;

use super::manifestlist::{ManifestListHandler, OciIndexHandler};
use super::ocischema::OciManifestHandler;
use super::schema1::Schema1Handler;
use super::schema2::Schema2Handler;
use super::{Manifest, ManifestHandler};
use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult};
use crate::repository::Repository;

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("tag pattern is valid")
});

/// The manifests of one repository.
#[derive(Debug, Clone, Copy)]
pub struct ManifestStore<'r> {
    repository: &'r Repository,
}

impl<'r> ManifestStore<'r> {
    pub(crate) fn new(repository: &'r Repository) -> Self {
        Self { repository }
    }

    /// Whether a manifest revision with this digest is linked in the repository.
    pub async fn exists(&self, digest: &Digest) -> Result<bool, StorageError> {
        self.repository.manifest_blobs().is_linked(digest).await
    }

    /// Fetch and decode a stored manifest.
    pub async fn get(&self, digest: &Digest) -> RegistryResult<Manifest> {
        let content = match self.repository.manifest_blobs().get(digest).await {
            Ok(content) => content,
            Err(RegistryError::BlobNotFound(_)) => {
                return Err(RegistryError::ManifestNotFound(digest.to_string()));
            }
            Err(err) => return Err(err),
        };
        Manifest::unmarshal(None, content)
    }

    /// Decode a payload with the matching schema handler and store it.
    ///
    /// `declared` is the media type claimed by the client, if any. With
    /// `skip_dependency_verification` the references are not checked.
    #[tracing::instrument(
        skip(self, content),
        fields(repository = %self.repository.name(), size = content.len())
    )]
    pub async fn put(
        &self,
        declared: Option<&str>,
        content: Bytes,
        skip_dependency_verification: bool,
    ) -> RegistryResult<Digest> {
        let manifest = Manifest::unmarshal(declared, content)?;
        tracing::debug!(kind = %manifest.kind(), "dispatched manifest");
        self.put_manifest(&manifest, skip_dependency_verification)
            .await
    }

    /// Store an already decoded manifest with its own schema handler.
    pub async fn put_manifest(
        &self,
        manifest: &Manifest,
        skip_dependency_verification: bool,
    ) -> RegistryResult<Digest> {
        let repository = self.repository;
        match manifest {
            Manifest::Schema1(m) => {
                Schema1Handler::new(repository)
                    .put(m, skip_dependency_verification)
                    .await
            }
            Manifest::Schema2(m) => {
                Schema2Handler::new(repository)
                    .put(m, skip_dependency_verification)
                    .await
            }
            Manifest::ManifestList(m) => {
                ManifestListHandler::new(repository)
                    .put(m, skip_dependency_verification)
                    .await
            }
            Manifest::OciImage(m) => {
                OciManifestHandler::new(repository)
                    .put(m, skip_dependency_verification)
                    .await
            }
            Manifest::OciIndex(m) => {
                OciIndexHandler::new(repository)
                    .put(m, skip_dependency_verification)
                    .await
            }
        }
    }

    /// Point `tag` at a stored manifest.
    #[tracing::instrument(skip(self), fields(repository = %self.repository.name()))]
    pub async fn tag(&self, tag: &str, digest: &Digest) -> RegistryResult<()> {
        validate_tag(tag)?;

        if !self.exists(digest).await? {
            return Err(RegistryError::ManifestNotFound(digest.to_string()));
        }

        let storage = self.repository.storage();
        let path = storage.paths().tag_current_link(self.repository.name(), tag);
        storage.write_link(&path, digest).await?;
        Ok(())
    }

    /// Resolve a tag or digest reference to a stored manifest digest.
    pub async fn resolve(&self, reference: &str) -> RegistryResult<Digest> {
        if let Ok(digest) = reference.parse::<Digest>() {
            return Ok(digest);
        }

        validate_tag(reference)?;
        let storage = self.repository.storage();
        let path = storage
            .paths()
            .tag_current_link(self.repository.name(), reference);
        storage
            .read_link(&path)
            .await?
            .ok_or_else(|| RegistryError::ManifestNotFound(reference.to_string()))
    }

    /// Every tag in the repository, sorted.
    pub async fn tags(&self) -> RegistryResult<Vec<String>> {
        let storage = self.repository.storage();
        let dir = storage.paths().tags_dir(self.repository.name());

        let mut tags: Vec<String> = storage
            .list(&dir)
            .await?
            .iter()
            .filter_map(|path| {
                let mut components = path.components().rev();
                if components.next()?.as_str() != "link"
                    || components.next()?.as_str() != "current"
                {
                    return None;
                }
                Some(components.next()?.as_str().to_string())
            })
            .collect();
        tags.sort();
        tags.dedup();
        Ok(tags)
    }
}

/// Check a tag against the distribution tag grammar.
pub fn validate_tag(tag: &str) -> RegistryResult<()> {
    if TAG.is_match(tag) {
        Ok(())
    } else {
        Err(RegistryError::InvalidTag(tag.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_grammar() {
        for tag in ["latest", "v1.0.0", "_private", "1", &"a".repeat(128)] {
            assert!(validate_tag(tag).is_ok(), "{tag}");
        }
        for tag in ["", ".hidden", "-dash", "has space", "a/b", &"a".repeat(129)] {
            assert!(validate_tag(tag).is_err(), "{tag}");
        }
    }
}
