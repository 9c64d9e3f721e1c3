//! Legacy docker schema 1 manifests
//!
//! Signed manifests are stored as pushed; the signatures are carried along
//! but not checked.

use std::collections::HashSet;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{
    ManifestHandler, ManifestKind, check_media_type, check_schema_version, decode, encode, persist,
};
use crate::descriptor::Descriptor;
use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult};
use crate::media_type::{DOCKER_LAYER_V1, DOCKER_MANIFEST_V1, DOCKER_MANIFEST_V1_SIGNED};
use crate::repository::Repository;

/// A docker schema 1 manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedManifest {
    /// Always 1.
    pub schema_version: u32,

    /// Media type named in the payload, usually absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// Repository name the image was built for.
    #[serde(default)]
    pub name: String,

    /// Tag the image was built for.
    #[serde(default)]
    pub tag: String,

    /// Target CPU architecture.
    #[serde(default)]
    pub architecture: String,

    /// Layers, topmost first.
    pub fs_layers: Vec<FsLayer>,

    /// One history entry per layer.
    pub history: Vec<History>,

    /// JWS signatures over the manifest.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<serde_json::Value>,

    #[serde(skip)]
    canonical: Option<Bytes>,
}

/// A schema 1 layer reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsLayer {
    /// Digest of the layer blob.
    pub blob_sum: String,
}

/// A schema 1 history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// Serialized v1 image JSON for the layer.
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

impl SignedManifest {
    /// A new unsigned manifest.
    pub fn new(
        name: impl Into<String>,
        tag: impl Into<String>,
        fs_layers: Vec<FsLayer>,
        history: Vec<History>,
    ) -> Self {
        Self {
            schema_version: 1,
            media_type: None,
            name: name.into(),
            tag: tag.into(),
            architecture: String::new(),
            fs_layers,
            history,
            signatures: Vec::new(),
            canonical: None,
        }
    }

    /// The media type the payload is served with.
    pub fn media_type(&self) -> &'static str {
        if self.signatures.is_empty() {
            DOCKER_MANIFEST_V1
        } else {
            DOCKER_MANIFEST_V1_SIGNED
        }
    }

    /// The bytes as pushed, or a fresh serialization.
    pub fn payload(&self) -> RegistryResult<Bytes> {
        match &self.canonical {
            Some(content) => Ok(content.clone()),
            None => encode(self),
        }
    }

    /// Every distinct layer, in manifest order.
    pub fn references(&self) -> Vec<Descriptor> {
        let mut seen = HashSet::new();
        self.fs_layers
            .iter()
            .filter(|layer| seen.insert(layer.blob_sum.as_str()))
            .map(|layer| Descriptor {
                media_type: DOCKER_LAYER_V1.to_string(),
                digest: layer.blob_sum.clone(),
                ..Default::default()
            })
            .collect()
    }
}

pub(crate) struct Schema1Handler<'r> {
    repository: &'r Repository,
}

impl<'r> Schema1Handler<'r> {
    pub(crate) fn new(repository: &'r Repository) -> Self {
        Self { repository }
    }
}

#[async_trait::async_trait]
impl ManifestHandler for Schema1Handler<'_> {
    type Manifest = SignedManifest;

    fn unmarshal(content: Bytes) -> RegistryResult<SignedManifest> {
        let mut manifest: SignedManifest = decode(&content)?;
        check_schema_version(ManifestKind::Schema1, manifest.schema_version)?;

        if let Some(media_type) = manifest.media_type.as_deref() {
            if media_type != DOCKER_MANIFEST_V1_SIGNED {
                check_media_type(ManifestKind::Schema1, Some(media_type), false)?;
            }
        }

        if manifest.fs_layers.is_empty() {
            return Err(RegistryError::InvalidManifest(
                "schema1 manifest has no layers".into(),
            ));
        }

        if manifest.fs_layers.len() != manifest.history.len() {
            return Err(RegistryError::InvalidManifest(format!(
                "schema1 manifest has {} layers but {} history entries",
                manifest.fs_layers.len(),
                manifest.history.len()
            )));
        }

        manifest.canonical = Some(content);
        Ok(manifest)
    }

    #[tracing::instrument(skip_all, fields(repository = %self.repository.name(), kind = "schema1"))]
    async fn put(
        &self,
        manifest: &SignedManifest,
        skip_dependency_verification: bool,
    ) -> RegistryResult<Digest> {
        tracing::debug!("putting schema1 manifest");

        check_schema_version(ManifestKind::Schema1, manifest.schema_version)?;

        if !skip_dependency_verification {
            self.repository
                .verifier()
                .verify(self.repository, &manifest.references())
                .await?;
        }

        persist(self.repository, manifest.media_type(), manifest.payload()?, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(content: &[u8]) -> FsLayer {
        FsLayer {
            blob_sum: Digest::sha256(content).to_string(),
        }
    }

    fn history() -> History {
        History {
            v1_compatibility: "{}".into(),
        }
    }

    #[test]
    fn references_are_deduplicated_in_order() {
        let manifest = SignedManifest::new(
            "app",
            "latest",
            vec![layer(b"b"), layer(b"a"), layer(b"b")],
            vec![history(), history(), history()],
        );

        let digests: Vec<_> = manifest
            .references()
            .into_iter()
            .map(|descriptor| descriptor.digest)
            .collect();
        assert_eq!(
            digests,
            vec![Digest::sha256(b"b").to_string(), Digest::sha256(b"a").to_string()]
        );
        assert!(manifest.references().iter().all(|d| d.media_type == DOCKER_LAYER_V1));
    }

    #[test]
    fn unmarshal_checks_layers_against_history() {
        let blob = Digest::sha256(b"layer");
        let mismatched = format!(
            r#"{{"schemaVersion":1,"fsLayers":[{{"blobSum":"{blob}"}}],"history":[]}}"#
        );
        assert!(matches!(
            Schema1Handler::unmarshal(Bytes::from(mismatched)),
            Err(RegistryError::InvalidManifest(_))
        ));

        let empty = r#"{"schemaVersion":1,"fsLayers":[],"history":[]}"#;
        assert!(matches!(
            Schema1Handler::unmarshal(Bytes::from_static(empty.as_bytes())),
            Err(RegistryError::InvalidManifest(_))
        ));
    }

    #[test]
    fn unmarshal_keeps_pushed_bytes() {
        let blob = Digest::sha256(b"layer");
        let content = Bytes::from(format!(
            "{{ \"schemaVersion\": 1, \"name\": \"app\",\n  \"fsLayers\": [{{\"blobSum\":\"{blob}\"}}],\n  \"history\": [{{\"v1Compatibility\":\"{{}}\"}}],\n  \"signatures\": [{{\"protected\":\"x\"}}] }}"
        ));

        let manifest = Schema1Handler::unmarshal(content.clone()).unwrap();
        assert_eq!(manifest.payload().unwrap(), content);
        assert_eq!(manifest.media_type(), DOCKER_MANIFEST_V1_SIGNED);
    }

    #[test]
    fn unmarshal_checks_schema_version() {
        let blob = Digest::sha256(b"layer");
        let content = format!(
            r#"{{"schemaVersion":2,"fsLayers":[{{"blobSum":"{blob}"}}],"history":[{{"v1Compatibility":"{{}}"}}]}}"#
        );
        assert!(matches!(
            Schema1Handler::unmarshal(Bytes::from(content)),
            Err(RegistryError::InvalidManifest(_))
        ));
    }
}
