//! Registries and the repositories within them

use std::sync::LazyLock;

use camino::Utf8PathBuf;
use regex::Regex;
use storage::StorageBucket;

use crate::blob::{BlobStore, LinkKind, LinkedBlobStore};
use crate::error::{RegistryError, RegistryResult};
use crate::manifest::ManifestStore;
use crate::paths::{DEFAULT_ROOT, PathSpec};
use crate::referrers::ReferrerIndex;
use crate::storage::RegistryStorage;
use crate::verify::{UrlPolicy, Verifier};

static REPOSITORY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*)*$",
    )
    .expect("repository name pattern is valid")
});

const MAX_REPOSITORY_NAME: usize = 255;

/// Behaviour of a registry which is not tied to a storage backend.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Root of the registry's layout inside the bucket.
    pub root: Utf8PathBuf,

    /// Which external URLs foreign layers may point at.
    pub urls: UrlPolicy,

    /// Whether manifests with a subject are recorded in the referrers index.
    pub referrers_indexing: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.into(),
            urls: UrlPolicy::default(),
            referrers_indexing: true,
        }
    }
}

/// A registry: every repository stored in one bucket.
#[derive(Debug, Clone)]
pub struct Registry {
    storage: RegistryStorage,
    verifier: Verifier,
    referrers_indexing: bool,
}

impl Registry {
    /// A registry stored in `bucket`.
    pub fn new(bucket: StorageBucket, options: RegistryOptions) -> Self {
        Self {
            storage: RegistryStorage::new(bucket, PathSpec::new(options.root)),
            verifier: Verifier::new(options.urls),
            referrers_indexing: options.referrers_indexing,
        }
    }

    /// Open a repository by name.
    ///
    /// Repositories exist implicitly; opening one only validates the name.
    pub fn repository(&self, name: &str) -> RegistryResult<Repository> {
        validate_repository_name(name)?;
        Ok(Repository {
            name: name.to_string(),
            storage: self.storage.clone(),
            verifier: self.verifier.clone(),
            referrers_indexing: self.referrers_indexing,
        })
    }

    /// The global blob store.
    pub fn blobs(&self) -> BlobStore {
        BlobStore::new(self.storage.clone())
    }
}

/// A named repository of manifests, blobs and tags.
#[derive(Debug, Clone)]
pub struct Repository {
    name: String,
    storage: RegistryStorage,
    verifier: Verifier,
    referrers_indexing: bool,
}

impl Repository {
    /// The repository name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blobs pushed to this repository.
    pub fn blobs(&self) -> LinkedBlobStore {
        LinkedBlobStore::new(&self.name, self.storage.clone(), LinkKind::Layers)
    }

    /// Manifests stored in this repository.
    pub fn manifests(&self) -> ManifestStore<'_> {
        ManifestStore::new(self)
    }

    /// The referrers index of this repository.
    pub fn referrers(&self) -> ReferrerIndex<'_> {
        ReferrerIndex::new(&self.name, &self.storage)
    }

    /// Manifest payloads, linked as revisions.
    pub(crate) fn manifest_blobs(&self) -> LinkedBlobStore {
        LinkedBlobStore::new(&self.name, self.storage.clone(), LinkKind::ManifestRevisions)
    }

    pub(crate) fn storage(&self) -> &RegistryStorage {
        &self.storage
    }

    pub(crate) fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    pub(crate) fn referrers_indexing(&self) -> bool {
        self.referrers_indexing
    }
}

fn validate_repository_name(name: &str) -> RegistryResult<()> {
    if name.len() > MAX_REPOSITORY_NAME || !REPOSITORY_NAME.is_match(name) {
        return Err(RegistryError::InvalidRepository(name.to_string()));
    }
    Ok(())
}
