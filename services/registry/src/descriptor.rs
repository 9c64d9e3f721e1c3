//! Content descriptors

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::{Digest, DigestError};

/// A reference to stored content by digest, media type and size.
///
/// The digest is kept as the string found in the manifest, so that a
/// malformed reference can be reported during verification rather than
/// rejected while decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    #[serde(default)]
    pub media_type: String,

    /// Digest of the referenced content.
    #[serde(default)]
    pub digest: String,

    /// Size in bytes of the referenced content.
    #[serde(default)]
    pub size: u64,

    /// Locations the content may be fetched from instead of this registry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,

    /// Arbitrary metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Type of artifact, when the descriptor points at an artifact manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,

    /// Platform of the referenced manifest, in an index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl Descriptor {
    /// A descriptor with just the required fields.
    pub fn new(media_type: impl Into<String>, digest: &Digest, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest: digest.to_string(),
            size,
            ..Default::default()
        }
    }

    /// Parse and validate the digest.
    pub fn digest(&self) -> Result<Digest, DigestError> {
        self.digest.parse()
    }

    /// A descriptor with no digest carries no reference.
    pub fn is_empty(&self) -> bool {
        self.digest.is_empty()
    }
}

/// Platform an image in an index is built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// CPU architecture.
    pub architecture: String,

    /// Operating system.
    pub os: String,

    /// Required operating system version, e.g. a Windows build.
    #[serde(rename = "os.version", default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,

    /// Required operating system features.
    #[serde(rename = "os.features", default, skip_serializing_if = "Vec::is_empty")]
    pub os_features: Vec<String>,

    /// CPU variant, e.g. `v8` for arm64.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}
