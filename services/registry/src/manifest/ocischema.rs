//! OCI image manifests

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
use crate::media_type::OCI_MANIFEST;
use crate::repository::Repository;

/// An OCI image manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciManifest {
    /// Always 2.
    pub schema_version: u32,

    /// The OCI manifest media type, optional in the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// Type of artifact, for manifests which are not container images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,

    /// The configuration blob.
    pub config: Descriptor,

    /// Layers, base first.
    #[serde(default)]
    pub layers: Vec<Descriptor>,

    /// The manifest this one refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,

    /// Arbitrary metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, rename = "manifests", skip_serializing)]
    unexpected_manifests: Option<IgnoredAny>,

    #[serde(skip)]
    canonical: Option<Bytes>,
}

impl OciManifest {
    /// A new manifest for a config and its layers.
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(OCI_MANIFEST.to_string()),
            artifact_type: None,
            config,
            layers,
            subject: None,
            annotations: BTreeMap::new(),
            unexpected_manifests: None,
            canonical: None,
        }
    }

    /// Declare the manifest this one refers to.
    pub fn with_subject(mut self, subject: Descriptor) -> Self {
        self.subject = Some(subject);
        self.canonical = None;
        self
    }

    /// Set the artifact type.
    pub fn with_artifact_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.artifact_type = Some(artifact_type.into());
        self.canonical = None;
        self
    }

    /// The bytes as pushed, or a fresh serialization.
    pub fn payload(&self) -> RegistryResult<Bytes> {
        match &self.canonical {
            Some(content) => Ok(content.clone()),
            None => encode(self),
        }
    }

    /// The config followed by every layer. The subject is not a reference.
    pub fn references(&self) -> Vec<Descriptor> {
        std::iter::once(&self.config)
            .chain(&self.layers)
            .cloned()
            .collect()
    }

    /// The subject, if one is declared.
    pub fn subject(&self) -> Option<&Descriptor> {
        self.subject.as_ref()
    }

    /// The artifact type, falling back to the config media type.
    pub fn artifact_type(&self) -> Option<&str> {
        self.artifact_type
            .as_deref()
            .or(Some(self.config.media_type.as_str()))
            .filter(|artifact_type| !artifact_type.is_empty())
    }
}

pub(crate) struct OciManifestHandler<'r> {
    repository: &'r Repository,
}

impl<'r> OciManifestHandler<'r> {
    pub(crate) fn new(repository: &'r Repository) -> Self {
        Self { repository }
    }
}

#[async_trait::async_trait]
impl ManifestHandler for OciManifestHandler<'_> {
    type Manifest = OciManifest;

    fn unmarshal(content: Bytes) -> RegistryResult<OciManifest> {
        let mut manifest: OciManifest = decode(&content)?;
        check_schema_version(ManifestKind::OciImage, manifest.schema_version)?;
        check_media_type(ManifestKind::OciImage, manifest.media_type.as_deref(), false)?;

        if manifest.unexpected_manifests.is_some() {
            return Err(RegistryError::InvalidManifest(
                "oci image manifest must not contain manifests".into(),
            ));
        }

        manifest.canonical = Some(content);
        Ok(manifest)
    }

    #[tracing::instrument(skip_all, fields(repository = %self.repository.name(), kind = "oci"))]
    async fn put(
        &self,
        manifest: &OciManifest,
        skip_dependency_verification: bool,
    ) -> RegistryResult<Digest> {
        tracing::debug!("putting oci image manifest");

        check_schema_version(ManifestKind::OciImage, manifest.schema_version)?;
        let subject = subject_digest(manifest.subject())?;

        if !skip_dependency_verification {
            self.repository
                .verifier()
                .verify(self.repository, &manifest.references())
                .await?;
        }

        persist(self.repository, OCI_MANIFEST, manifest.payload()?, subject).await
    }
}
