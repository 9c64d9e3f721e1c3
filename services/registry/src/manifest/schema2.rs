//! Docker schema 2 image manifests

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{
    ManifestHandler, ManifestKind, check_media_type, check_schema_version, decode, encode, persist,
};
use crate::descriptor::Descriptor;
use crate::digest::Digest;
use crate::error::RegistryResult;
use crate::media_type::DOCKER_MANIFEST_V2;
use crate::repository::Repository;

/// A docker schema 2 image manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerManifest {
    /// Always 2.
    pub schema_version: u32,

    /// Always the docker v2 manifest media type.
    pub media_type: String,

    /// The image configuration blob.
    pub config: Descriptor,

    /// Layers, base first.
    #[serde(default)]
    pub layers: Vec<Descriptor>,

    #[serde(skip)]
    canonical: Option<Bytes>,
}

impl DockerManifest {
    /// A new manifest for a config and its layers.
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: DOCKER_MANIFEST_V2.to_string(),
            config,
            layers,
            canonical: None,
        }
    }

    /// The bytes as pushed, or a fresh serialization.
    pub fn payload(&self) -> RegistryResult<Bytes> {
        match &self.canonical {
            Some(content) => Ok(content.clone()),
            None => encode(self),
        }
    }

    /// The config followed by every layer.
    pub fn references(&self) -> Vec<Descriptor> {
        std::iter::once(&self.config)
            .chain(&self.layers)
            .cloned()
            .collect()
    }
}

pub(crate) struct Schema2Handler<'r> {
    repository: &'r Repository,
}

impl<'r> Schema2Handler<'r> {
    pub(crate) fn new(repository: &'r Repository) -> Self {
        Self { repository }
    }
}

#[async_trait::async_trait]
impl ManifestHandler for Schema2Handler<'_> {
    type Manifest = DockerManifest;

    fn unmarshal(content: Bytes) -> RegistryResult<DockerManifest> {
        let mut manifest: DockerManifest = decode(&content)?;
        check_schema_version(ManifestKind::Schema2, manifest.schema_version)?;
        check_media_type(ManifestKind::Schema2, Some(&manifest.media_type), true)?;
        manifest.canonical = Some(content);
        Ok(manifest)
    }

    #[tracing::instrument(skip_all, fields(repository = %self.repository.name(), kind = "schema2"))]
    async fn put(
        &self,
        manifest: &DockerManifest,
        skip_dependency_verification: bool,
    ) -> RegistryResult<Digest> {
        tracing::debug!("putting schema2 manifest");

        check_schema_version(ManifestKind::Schema2, manifest.schema_version)?;
        check_media_type(ManifestKind::Schema2, Some(&manifest.media_type), true)?;

        if !skip_dependency_verification {
            self.repository
                .verifier()
                .verify(self.repository, &manifest.references())
                .await?;
        }

        persist(self.repository, DOCKER_MANIFEST_V2, manifest.payload()?, None).await
    }
}
