//! Error types for the registry

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::digest::DigestError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Error types for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Blob not found
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// Manifest not found
    #[error("manifest not found: {0}")]
    ManifestNotFound(String),

    /// Invalid digest format
    #[error("invalid digest: {0}")]
    InvalidDigest(#[from] DigestError),

    /// Storage error, passed through from the driver unchanged
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),

    /// The payload does not match the structure of its schema
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// No manifest variant handles this media type and schema version
    #[error("unsupported manifest type: {0}")]
    UnsupportedManifestType(String),

    /// One or more references of a manifest failed verification
    #[error("manifest verification failed: {0}")]
    Verification(VerificationErrors),

    /// Digest mismatch
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Expected digest
        expected: String,
        /// Actual digest
        actual: String,
    },

    /// Invalid repository name
    #[error("invalid repository name: {0}")]
    InvalidRepository(String),

    /// Invalid tag
    #[error("invalid tag: {0}")]
    InvalidTag(String),

    /// Blob upload invalid
    #[error("blob upload invalid: {0}")]
    BlobUploadInvalid(String),
}

impl RegistryError {
    pub(crate) fn invalid_manifest(err: impl fmt::Display) -> Self {
        RegistryError::InvalidManifest(err.to_string())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::BlobNotFound(_) | RegistryError::ManifestNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            RegistryError::InvalidDigest(_)
            | RegistryError::InvalidManifest(_)
            | RegistryError::InvalidRepository(_)
            | RegistryError::InvalidTag(_)
            | RegistryError::DigestMismatch { .. }
            | RegistryError::BlobUploadInvalid(_) => StatusCode::BAD_REQUEST,
            RegistryError::Verification(errors) if errors.has_storage_errors() => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            RegistryError::Verification(_) => StatusCode::BAD_REQUEST,
            RegistryError::UnsupportedManifestType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            RegistryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for OCI error responses
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::BlobNotFound(_) => "BLOB_UNKNOWN",
            RegistryError::ManifestNotFound(_) => "MANIFEST_UNKNOWN",
            RegistryError::InvalidDigest(_) => "DIGEST_INVALID",
            RegistryError::InvalidManifest(_) => "MANIFEST_INVALID",
            RegistryError::UnsupportedManifestType(_) => "UNSUPPORTED",
            RegistryError::Verification(_) => "MANIFEST_INVALID",
            RegistryError::DigestMismatch { .. } => "DIGEST_INVALID",
            RegistryError::InvalidRepository(_) => "NAME_INVALID",
            RegistryError::InvalidTag(_) => "TAG_INVALID",
            RegistryError::BlobUploadInvalid(_) => "BLOB_UPLOAD_INVALID",
            RegistryError::Storage(_) => "UNKNOWN",
        }
    }
}

/// A single broken reference found while verifying a manifest.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// The referenced object does not exist.
    #[error("blob unknown to registry: {0}")]
    BlobUnknown(String),

    /// The reference's digest is malformed.
    #[error("invalid digest {digest:?}: {source}")]
    InvalidDigest {
        /// The digest as written in the manifest.
        digest: String,
        /// Why it was rejected.
        #[source]
        source: DigestError,
    },

    /// A foreign layer URL is not allowed.
    #[error("invalid URL on layer {digest}: {url}")]
    InvalidUrl {
        /// Digest of the layer carrying the URL.
        digest: String,
        /// The rejected URL.
        url: String,
    },

    /// Checking for existence failed for a reason other than absence.
    #[error(transparent)]
    Storage(storage::StorageError),
}

impl VerificationError {
    /// Get the error code for OCI error responses
    pub fn error_code(&self) -> &'static str {
        match self {
            VerificationError::BlobUnknown(_) => "MANIFEST_BLOB_UNKNOWN",
            VerificationError::InvalidDigest { .. } => "DIGEST_INVALID",
            VerificationError::InvalidUrl { .. } => "MANIFEST_INVALID",
            VerificationError::Storage(_) => "UNKNOWN",
        }
    }

    fn detail(&self) -> Option<serde_json::Value> {
        match self {
            VerificationError::BlobUnknown(digest) => Some(serde_json::json!({ "digest": digest })),
            VerificationError::InvalidDigest { digest, .. } => {
                Some(serde_json::json!({ "digest": digest }))
            }
            VerificationError::InvalidUrl { digest, url } => {
                Some(serde_json::json!({ "digest": digest, "url": url }))
            }
            VerificationError::Storage(_) => None,
        }
    }
}

/// Every verification failure of one manifest, in reference order.
#[derive(Debug, Default)]
pub struct VerificationErrors(Vec<VerificationError>);

impl VerificationErrors {
    /// Record a failure.
    pub fn push(&mut self, error: VerificationError) {
        self.0.push(error);
    }

    /// True when nothing failed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of recorded failures.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate the recorded failures.
    pub fn iter(&self) -> std::slice::Iter<'_, VerificationError> {
        self.0.iter()
    }

    /// Digests reported as unknown, in order.
    pub fn unknown_blobs(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|err| match err {
            VerificationError::BlobUnknown(digest) => Some(digest.as_str()),
            _ => None,
        })
    }

    fn has_storage_errors(&self) -> bool {
        self.0
            .iter()
            .any(|err| matches!(err, VerificationError::Storage(_)))
    }

    /// `Ok` when empty, otherwise the aggregate as an error.
    pub fn into_result(self) -> RegistryResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::Verification(self))
        }
    }
}

impl Extend<VerificationError> for VerificationErrors {
    fn extend<T: IntoIterator<Item = VerificationError>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}

impl IntoIterator for VerificationErrors {
    type Item = VerificationError;
    type IntoIter = std::vec::IntoIter<VerificationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for VerificationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// OCI error response format
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, serde::Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let errors = match self {
            RegistryError::Verification(errors) => errors
                .into_iter()
                .map(|err| ErrorDetail {
                    code: err.error_code(),
                    message: err.to_string(),
                    detail: err.detail(),
                })
                .collect(),
            other => vec![ErrorDetail {
                code: other.error_code(),
                message: other.to_string(),
                detail: None,
            }],
        };

        (status, axum::Json(ErrorResponse { errors })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_lists_every_failure() {
        let mut errors = VerificationErrors::default();
        assert!(errors.is_empty());

        errors.push(VerificationError::BlobUnknown("sha256:aa".into()));
        errors.push(VerificationError::InvalidUrl {
            digest: "sha256:bb".into(),
            url: "ftp://example.com".into(),
        });
        errors.push(VerificationError::BlobUnknown("sha256:cc".into()));

        assert_eq!(errors.len(), 3);
        assert_eq!(
            errors.unknown_blobs().collect::<Vec<_>>(),
            vec!["sha256:aa", "sha256:cc"]
        );

        let err = errors.into_result().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("ftp://example.com"));
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            RegistryError::UnsupportedManifestType("x".into()).status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            RegistryError::ManifestNotFound("x".into()).error_code(),
            "MANIFEST_UNKNOWN"
        );
    }
}
