//! Manifest schemas, dispatch and the put pipeline
//!
//! Incoming payloads are routed to one of a closed set of schema variants by
//! looking only at their envelope (`schemaVersion` and `mediaType`). Each
//! variant has a handler which decodes it and runs the put pipeline:
//! validate, verify references, persist the payload, index the subject.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};

use crate::descriptor::Descriptor;
use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult};
use crate::media_type::{
    DOCKER_MANIFEST_LIST, DOCKER_MANIFEST_V1, DOCKER_MANIFEST_V1_SIGNED, DOCKER_MANIFEST_V2,
    OCI_INDEX, OCI_MANIFEST,
};
use crate::repository::Repository;

mod manifestlist;
mod ocischema;
mod schema1;
mod schema2;
mod store;

pub use manifestlist::{ImageIndex, ManifestList, OciIndex};
pub use ocischema::OciManifest;
pub use schema1::{FsLayer, History, SignedManifest};
pub use schema2::DockerManifest;
pub use store::{ManifestStore, validate_tag};

/// The schema variants the registry accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestKind {
    /// Legacy docker schema 1, optionally signed.
    Schema1,
    /// Docker schema 2 single-image manifest.
    Schema2,
    /// Docker schema 2 multi-platform manifest list.
    ManifestList,
    /// OCI image manifest.
    OciImage,
    /// OCI image index.
    OciIndex,
}

impl ManifestKind {
    /// The schema version every manifest of this kind declares.
    pub fn schema_version(&self) -> u32 {
        match self {
            ManifestKind::Schema1 => 1,
            _ => 2,
        }
    }

    /// The media type of this kind.
    pub fn media_type(&self) -> &'static str {
        match self {
            ManifestKind::Schema1 => DOCKER_MANIFEST_V1,
            ManifestKind::Schema2 => DOCKER_MANIFEST_V2,
            ManifestKind::ManifestList => DOCKER_MANIFEST_LIST,
            ManifestKind::OciImage => OCI_MANIFEST,
            ManifestKind::OciIndex => OCI_INDEX,
        }
    }

    /// Select the kind for a payload.
    ///
    /// `declared` is the media type the caller claims for the payload, e.g.
    /// from a `Content-Type` header. Only the envelope of `content` is
    /// decoded.
    pub fn detect(declared: Option<&str>, content: &[u8]) -> RegistryResult<Self> {
        if content.trim_ascii_start().first() != Some(&b'{') {
            return Err(RegistryError::InvalidManifest(
                "manifest is not a JSON object".into(),
            ));
        }

        let envelope: Envelope =
            serde_json::from_slice(content).map_err(RegistryError::invalid_manifest)?;

        let media_type = match (envelope.media_type.as_deref(), declared) {
            (Some(payload), Some(declared)) if payload != declared => {
                return Err(RegistryError::UnsupportedManifestType(format!(
                    "declared media type {declared} does not match payload media type {payload}"
                )));
            }
            (Some(payload), _) => Some(payload),
            (None, declared) => declared,
        };

        let kind = match (envelope.schema_version, media_type) {
            (Some(1), None | Some(DOCKER_MANIFEST_V1 | DOCKER_MANIFEST_V1_SIGNED)) => {
                ManifestKind::Schema1
            }
            (Some(2), Some(DOCKER_MANIFEST_V2)) => ManifestKind::Schema2,
            (Some(2), Some(DOCKER_MANIFEST_LIST)) => ManifestKind::ManifestList,
            (Some(2), Some(OCI_MANIFEST)) => ManifestKind::OciImage,
            (Some(2), Some(OCI_INDEX)) => ManifestKind::OciIndex,
            (Some(2), None) if envelope.manifests.is_some() => ManifestKind::OciIndex,
            (Some(2), None) if envelope.config.is_some() => ManifestKind::OciImage,
            (version, media_type) => {
                return Err(RegistryError::UnsupportedManifestType(format!(
                    "media type {} with schema version {}",
                    media_type.unwrap_or("<none>"),
                    version.map_or_else(|| "<none>".to_string(), |v| v.to_string()),
                )));
            }
        };

        Ok(kind)
    }
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManifestKind::Schema1 => "schema1",
            ManifestKind::Schema2 => "schema2",
            ManifestKind::ManifestList => "manifest list",
            ManifestKind::OciImage => "oci image manifest",
            ManifestKind::OciIndex => "oci image index",
        };
        f.write_str(name)
    }
}

/// The fields shared by every manifest schema.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    schema_version: Option<u32>,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    manifests: Option<IgnoredAny>,
    #[serde(default)]
    config: Option<IgnoredAny>,
}

/// A decoded manifest of one of the supported schemas.
#[derive(Debug, Clone)]
pub enum Manifest {
    /// Legacy docker schema 1
    Schema1(SignedManifest),
    /// Docker schema 2
    Schema2(DockerManifest),
    /// Docker manifest list
    ManifestList(ManifestList),
    /// OCI image manifest
    OciImage(OciManifest),
    /// OCI image index
    OciIndex(OciIndex),
}

impl Manifest {
    /// Dispatch on the envelope and decode with the matching variant.
    pub fn unmarshal(declared: Option<&str>, content: Bytes) -> RegistryResult<Self> {
        let manifest = match ManifestKind::detect(declared, &content)? {
            ManifestKind::Schema1 => {
                Manifest::Schema1(schema1::Schema1Handler::unmarshal(content)?)
            }
            ManifestKind::Schema2 => {
                Manifest::Schema2(schema2::Schema2Handler::unmarshal(content)?)
            }
            ManifestKind::ManifestList => {
                Manifest::ManifestList(manifestlist::ManifestListHandler::unmarshal(content)?)
            }
            ManifestKind::OciImage => {
                Manifest::OciImage(ocischema::OciManifestHandler::unmarshal(content)?)
            }
            ManifestKind::OciIndex => {
                Manifest::OciIndex(manifestlist::OciIndexHandler::unmarshal(content)?)
            }
        };
        Ok(manifest)
    }

    /// Which variant this is.
    pub fn kind(&self) -> ManifestKind {
        match self {
            Manifest::Schema1(_) => ManifestKind::Schema1,
            Manifest::Schema2(_) => ManifestKind::Schema2,
            Manifest::ManifestList(_) => ManifestKind::ManifestList,
            Manifest::OciImage(_) => ManifestKind::OciImage,
            Manifest::OciIndex(_) => ManifestKind::OciIndex,
        }
    }

    /// The media type the payload is served with.
    pub fn media_type(&self) -> &'static str {
        match self {
            Manifest::Schema1(m) => m.media_type(),
            other => other.kind().media_type(),
        }
    }

    /// The canonical bytes of this manifest.
    pub fn payload(&self) -> RegistryResult<Bytes> {
        match self {
            Manifest::Schema1(m) => m.payload(),
            Manifest::Schema2(m) => m.payload(),
            Manifest::ManifestList(m) => m.payload(),
            Manifest::OciImage(m) => m.payload(),
            Manifest::OciIndex(m) => m.payload(),
        }
    }

    /// Everything this manifest depends on, in declaration order.
    pub fn references(&self) -> Vec<Descriptor> {
        match self {
            Manifest::Schema1(m) => m.references(),
            Manifest::Schema2(m) => m.references(),
            Manifest::ManifestList(m) => m.references(),
            Manifest::OciImage(m) => m.references(),
            Manifest::OciIndex(m) => m.references(),
        }
    }

    /// The manifest this one declares a relationship to, if any.
    pub fn subject(&self) -> Option<&Descriptor> {
        match self {
            Manifest::OciImage(m) => m.subject(),
            Manifest::OciIndex(m) => m.subject(),
            _ => None,
        }
    }

    /// The artifact type reported in referrers listings.
    pub fn artifact_type(&self) -> Option<&str> {
        match self {
            Manifest::OciImage(m) => m.artifact_type(),
            Manifest::OciIndex(m) => m.index().artifact_type.as_deref(),
            _ => None,
        }
    }

    /// Manifest-level annotations.
    pub fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Manifest::OciImage(m) => Some(&m.annotations),
            Manifest::OciIndex(m) => Some(&m.index().annotations),
            _ => None,
        }
    }
}

/// Decodes and stores manifests of one schema variant.
///
/// `put` only accepts the variant's own manifest type, so a manifest can
/// never be stored by the wrong handler.
#[async_trait::async_trait]
pub(crate) trait ManifestHandler: Send + Sync {
    /// The manifest type this handler stores.
    type Manifest: Send + Sync;

    /// Decode and structurally check a payload.
    fn unmarshal(content: Bytes) -> RegistryResult<Self::Manifest>;

    /// Validate, verify, persist and index a manifest, returning its digest.
    async fn put(
        &self,
        manifest: &Self::Manifest,
        skip_dependency_verification: bool,
    ) -> RegistryResult<Digest>;
}

pub(crate) fn decode<T: DeserializeOwned>(content: &[u8]) -> RegistryResult<T> {
    serde_json::from_slice(content).map_err(RegistryError::invalid_manifest)
}

/// Serialize a manifest built in memory.
pub(crate) fn encode<T: serde::Serialize>(manifest: &T) -> RegistryResult<Bytes> {
    serde_json::to_vec_pretty(manifest)
        .map(Bytes::from)
        .map_err(RegistryError::invalid_manifest)
}

pub(crate) fn check_schema_version(kind: ManifestKind, found: u32) -> RegistryResult<()> {
    if found != kind.schema_version() {
        return Err(RegistryError::InvalidManifest(format!(
            "unrecognized {kind} schema version {found}"
        )));
    }
    Ok(())
}

pub(crate) fn check_media_type(
    kind: ManifestKind,
    found: Option<&str>,
    required: bool,
) -> RegistryResult<()> {
    match found {
        Some(media_type) if media_type != kind.media_type() => Err(RegistryError::InvalidManifest(
            format!("mediaType in {kind} should be {}, not {media_type}", kind.media_type()),
        )),
        None if required => Err(RegistryError::InvalidManifest(format!(
            "mediaType is required in {kind}"
        ))),
        _ => Ok(()),
    }
}

/// Parse the subject digest, if the manifest declares a non-empty subject.
pub(crate) fn subject_digest(subject: Option<&Descriptor>) -> RegistryResult<Option<Digest>> {
    match subject {
        Some(subject) if !subject.is_empty() => Ok(Some(subject.digest()?)),
        _ => Ok(None),
    }
}

/// Persist a verified payload and index its subject.
///
/// The referrer link is only written once the payload is stored. A failure
/// to index is reported even though the payload stays stored; putting the
/// same manifest again is safe and retries the indexing.
pub(crate) async fn persist(
    repository: &Repository,
    media_type: &str,
    payload: Bytes,
    subject: Option<Digest>,
) -> RegistryResult<Digest> {
    let descriptor = repository
        .manifest_blobs()
        .put(media_type, &payload)
        .await
        .inspect_err(|err| tracing::error!(error = %err, "error putting payload into blob store"))?;
    let digest = descriptor.digest()?;

    if let Some(subject) = subject {
        if repository.referrers_indexing() {
            repository
                .referrers()
                .index(&subject, &digest)
                .await
                .inspect_err(|err| tracing::error!(error = %err, "error indexing referrers"))?;
        }
    }

    Ok(digest)
}
