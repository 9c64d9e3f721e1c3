//! Referrers endpoint

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use super::OCI_FILTERS_APPLIED;
use crate::descriptor::Descriptor;
use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult};
use crate::manifest::OciIndex;
use crate::media_type::OCI_INDEX;
use crate::repository::Registry;

/// List the manifests referring to `subject` as an OCI image index.
pub(super) async fn list(
    registry: &Registry,
    name: &str,
    subject: &str,
    artifact_type: Option<&str>,
) -> RegistryResult<Response> {
    let repository = registry.repository(name)?;
    let subject: Digest = subject.parse()?;
    let manifests = repository.manifests();

    let mut descriptors = Vec::new();
    for digest in repository.referrers().list(&subject).await? {
        let manifest = match manifests.get(&digest).await {
            Ok(manifest) => manifest,
            Err(RegistryError::ManifestNotFound(_)) => {
                tracing::warn!(%subject, %digest, "referrer indexed but not stored");
                continue;
            }
            Err(err) => return Err(err),
        };

        if artifact_type.is_some_and(|wanted| manifest.artifact_type() != Some(wanted)) {
            continue;
        }

        let size = manifest.payload()?.len() as u64;
        let mut descriptor = Descriptor::new(manifest.media_type(), &digest, size);
        descriptor.artifact_type = manifest.artifact_type().map(str::to_string);
        descriptor.annotations = manifest.annotations().cloned().unwrap_or_default();
        descriptors.push(descriptor);
    }

    let payload = OciIndex::new(descriptors).payload()?;
    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, OCI_INDEX)],
        payload,
    )
        .into_response();

    if artifact_type.is_some() {
        response
            .headers_mut()
            .insert(OCI_FILTERS_APPLIED, HeaderValue::from_static("artifactType"));
    }

    Ok(response)
}
