//! Manifest reference verification
//!
//! As a policy, the registry only stores manifests whose references it can
//! resolve, leaving trust decisions about that content to consumers.

use futures::future::join_all;
use regex::Regex;
use url::Url;

use crate::descriptor::Descriptor;
use crate::digest::Digest;
use crate::error::{RegistryResult, VerificationError, VerificationErrors};
use crate::media_type::{ReferenceClass, classify};
use crate::repository::Repository;

/// Which external URLs foreign layers may point at.
#[derive(Debug, Clone, Default)]
pub struct UrlPolicy {
    allow: Option<Regex>,
    deny: Option<Regex>,
}

impl UrlPolicy {
    /// A policy with optional allow and deny patterns. Unset allow admits
    /// every URL, unset deny rejects none.
    pub fn new(allow: Option<Regex>, deny: Option<Regex>) -> Self {
        Self { allow, deny }
    }

    /// Whether a layer may carry this URL.
    ///
    /// Only absolute `http`/`https` URLs without a fragment are considered;
    /// the deny pattern wins over the allow pattern.
    pub fn allows(&self, raw: &str) -> bool {
        let Ok(url) = Url::parse(raw) else {
            return false;
        };

        if !matches!(url.scheme(), "http" | "https") || url.fragment().is_some() {
            return false;
        }

        if self.allow.as_ref().is_some_and(|allow| !allow.is_match(raw)) {
            return false;
        }

        !self.deny.as_ref().is_some_and(|deny| deny.is_match(raw))
    }
}

/// Checks that everything a manifest references is present.
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    urls: UrlPolicy,
}

impl Verifier {
    /// A verifier enforcing the given URL policy on foreign layers.
    pub fn new(urls: UrlPolicy) -> Self {
        Self { urls }
    }

    /// Verify every reference, collecting all failures.
    ///
    /// References are checked concurrently; failures are reported in the
    /// order the references were declared.
    #[tracing::instrument(
        skip_all,
        fields(repository = %repository.name(), references = references.len())
    )]
    pub async fn verify(
        &self,
        repository: &Repository,
        references: &[Descriptor],
    ) -> RegistryResult<()> {
        let checks = references
            .iter()
            .map(|descriptor| self.verify_descriptor(repository, descriptor));

        let mut errors = VerificationErrors::default();
        for found in join_all(checks).await {
            errors.extend(found);
        }
        errors.into_result()
    }

    async fn verify_descriptor(
        &self,
        repository: &Repository,
        descriptor: &Descriptor,
    ) -> Vec<VerificationError> {
        let digest = match descriptor.digest() {
            Ok(digest) => digest,
            Err(source) => {
                return vec![
                    VerificationError::InvalidDigest {
                        digest: descriptor.digest.clone(),
                        source,
                    },
                    VerificationError::BlobUnknown(descriptor.digest.clone()),
                ];
            }
        };

        let exists = match classify(&descriptor.media_type) {
            ReferenceClass::Layer { distributable } => {
                if let Some(url) = descriptor.urls.iter().find(|url| !self.urls.allows(url)) {
                    return vec![
                        VerificationError::InvalidUrl {
                            digest: descriptor.digest.clone(),
                            url: url.clone(),
                        },
                        VerificationError::BlobUnknown(digest.to_string()),
                    ];
                }

                if descriptor.urls.is_empty() || distributable {
                    blob_exists(repository, &digest).await
                } else {
                    Ok(true)
                }
            }
            ReferenceClass::Manifest => match repository.manifests().exists(&digest).await {
                Ok(true) => Ok(true),
                Ok(false) => blob_exists(repository, &digest).await,
                Err(err) => {
                    tracing::debug!(
                        %digest,
                        error = %err,
                        "manifest existence check failed, checking blob store"
                    );
                    blob_exists(repository, &digest).await
                }
            },
            ReferenceClass::Blob => blob_exists(repository, &digest).await,
        };

        match exists {
            Ok(true) => Vec::new(),
            Ok(false) => vec![VerificationError::BlobUnknown(digest.to_string())],
            Err(err) => vec![
                VerificationError::Storage(err),
                VerificationError::BlobUnknown(digest.to_string()),
            ],
        }
    }
}

async fn blob_exists(
    repository: &Repository,
    digest: &Digest,
) -> Result<bool, storage::StorageError> {
    Ok(repository.blobs().stat(digest).await?.is_some())
}
