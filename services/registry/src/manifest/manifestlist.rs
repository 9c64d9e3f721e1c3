//! Docker manifest lists and OCI image indexes
//!
//! Both are lists of manifest descriptors and share one payload shape. The
//! docker list requires its media type to be present and has no subject.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use super::{
    ManifestHandler, ManifestKind, check_media_type, check_schema_version, decode, encode, persist,
    subject_digest,
};
use crate::descriptor::Descriptor;
use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult};
use crate::media_type::{DOCKER_MANIFEST_LIST, OCI_INDEX};
use crate::repository::Repository;

/// A list of manifests, e.g. one per platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    /// Always 2.
    pub schema_version: u32,

    /// Media type named in the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// Type of artifact, for indexes which are not multi-platform images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,

    /// The listed manifests.
    pub manifests: Vec<Descriptor>,

    /// The manifest this one refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,

    /// Arbitrary metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, rename = "config", skip_serializing)]
    unexpected_config: Option<IgnoredAny>,

    #[serde(skip)]
    canonical: Option<Bytes>,
}

impl ImageIndex {
    fn new(media_type: &str, manifests: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(media_type.to_string()),
            artifact_type: None,
            manifests,
            subject: None,
            annotations: BTreeMap::new(),
            unexpected_config: None,
            canonical: None,
        }
    }

    fn unmarshal(kind: ManifestKind, content: Bytes) -> RegistryResult<Self> {
        let mut index: ImageIndex = decode(&content)?;
        check_schema_version(kind, index.schema_version)?;
        check_media_type(
            kind,
            index.media_type.as_deref(),
            kind == ManifestKind::ManifestList,
        )?;

        if index.unexpected_config.is_some() {
            return Err(RegistryError::InvalidManifest(format!(
                "{kind} must not contain config"
            )));
        }

        index.canonical = Some(content);
        Ok(index)
    }

    /// The bytes as pushed, or a fresh serialization.
    pub fn payload(&self) -> RegistryResult<Bytes> {
        match &self.canonical {
            Some(content) => Ok(content.clone()),
            None => encode(self),
        }
    }

    /// Every listed manifest.
    pub fn references(&self) -> Vec<Descriptor> {
        self.manifests.clone()
    }
}

/// A docker schema 2 manifest list.
#[derive(Debug, Clone)]
pub struct ManifestList(ImageIndex);

impl ManifestList {
    /// A new list of manifests.
    pub fn new(manifests: Vec<Descriptor>) -> Self {
        Self(ImageIndex::new(DOCKER_MANIFEST_LIST, manifests))
    }

    /// The list contents.
    pub fn index(&self) -> &ImageIndex {
        &self.0
    }

    /// The bytes as pushed, or a fresh serialization.
    pub fn payload(&self) -> RegistryResult<Bytes> {
        self.0.payload()
    }

    /// Every listed manifest.
    pub fn references(&self) -> Vec<Descriptor> {
        self.0.references()
    }
}

/// An OCI image index.
#[derive(Debug, Clone)]
pub struct OciIndex(ImageIndex);

impl OciIndex {
    /// A new index of manifests.
    pub fn new(manifests: Vec<Descriptor>) -> Self {
        Self(ImageIndex::new(OCI_INDEX, manifests))
    }

    /// Declare the manifest this one refers to.
    pub fn with_subject(mut self, subject: Descriptor) -> Self {
        self.0.subject = Some(subject);
        self.0.canonical = None;
        self
    }

    /// The index contents.
    pub fn index(&self) -> &ImageIndex {
        &self.0
    }

    /// The bytes as pushed, or a fresh serialization.
    pub fn payload(&self) -> RegistryResult<Bytes> {
        self.0.payload()
    }

    /// Every listed manifest.
    pub fn references(&self) -> Vec<Descriptor> {
        self.0.references()
    }

    /// The subject, if one is declared.
    pub fn subject(&self) -> Option<&Descriptor> {
        self.0.subject.as_ref()
    }
}

pub(crate) struct ManifestListHandler<'r> {
    repository: &'r Repository,
}

impl<'r> ManifestListHandler<'r> {
    pub(crate) fn new(repository: &'r Repository) -> Self {
        Self { repository }
    }
}

#[async_trait::async_trait]
impl ManifestHandler for ManifestListHandler<'_> {
    type Manifest = ManifestList;

    fn unmarshal(content: Bytes) -> RegistryResult<ManifestList> {
        ImageIndex::unmarshal(ManifestKind::ManifestList, content).map(ManifestList)
    }

    #[tracing::instrument(
        skip_all,
        fields(repository = %self.repository.name(), kind = "manifestlist")
    )]
    async fn put(
        &self,
        manifest: &ManifestList,
        skip_dependency_verification: bool,
    ) -> RegistryResult<Digest> {
        tracing::debug!("putting manifest list");

        check_schema_version(ManifestKind::ManifestList, manifest.0.schema_version)?;

        if !skip_dependency_verification {
            self.repository
                .verifier()
                .verify(self.repository, &manifest.references())
                .await?;
        }

        persist(self.repository, DOCKER_MANIFEST_LIST, manifest.payload()?, None).await
    }
}

pub(crate) struct OciIndexHandler<'r> {
    repository: &'r Repository,
}

impl<'r> OciIndexHandler<'r> {
    pub(crate) fn new(repository: &'r Repository) -> Self {
        Self { repository }
    }
}

#[async_trait::async_trait]
impl ManifestHandler for OciIndexHandler<'_> {
    type Manifest = OciIndex;

    fn unmarshal(content: Bytes) -> RegistryResult<OciIndex> {
        ImageIndex::unmarshal(ManifestKind::OciIndex, content).map(OciIndex)
    }

    #[tracing::instrument(
        skip_all,
        fields(repository = %self.repository.name(), kind = "ociindex")
    )]
    async fn put(
        &self,
        manifest: &OciIndex,
        skip_dependency_verification: bool,
    ) -> RegistryResult<Digest> {
        tracing::debug!("putting oci image index");

        check_schema_version(ManifestKind::OciIndex, manifest.0.schema_version)?;
        let subject = subject_digest(manifest.subject())?;

        if !skip_dependency_verification {
            self.repository
                .verifier()
                .verify(self.repository, &manifest.references())
                .await?;
        }

        persist(self.repository, OCI_INDEX, manifest.payload()?, subject).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_type::OCI_MANIFEST;

    #[test]
    fn manifest_list_requires_media_type() {
        let content = r#"{"schemaVersion":2,"manifests":[]}"#;
        assert!(matches!(
            ManifestListHandler::unmarshal(Bytes::from_static(content.as_bytes())),
            Err(RegistryError::InvalidManifest(_))
        ));
        assert!(OciIndexHandler::unmarshal(Bytes::from_static(content.as_bytes())).is_ok());
    }

    #[test]
    fn index_rejects_config() {
        let content = r#"{"schemaVersion":2,"manifests":[],"config":{}}"#;
        assert!(matches!(
            OciIndexHandler::unmarshal(Bytes::from_static(content.as_bytes())),
            Err(RegistryError::InvalidManifest(_))
        ));
    }

    #[test]
    fn references_are_the_listed_manifests() {
        let a = Descriptor::new(OCI_MANIFEST, &Digest::sha256(b"a"), 1);
        let b = Descriptor::new(OCI_MANIFEST, &Digest::sha256(b"b"), 1);
        let index = OciIndex::new(vec![a.clone(), b.clone()]);
        assert_eq!(index.references(), vec![a, b]);
        assert!(index.subject().is_none());
    }

    #[test]
    fn unmarshal_checks_schema_version() {
        let content = r#"{"schemaVersion":1,"manifests":[]}"#;
        assert!(matches!(
            OciIndexHandler::unmarshal(Bytes::from_static(content.as_bytes())),
            Err(RegistryError::InvalidManifest(_))
        ));
    }
}
