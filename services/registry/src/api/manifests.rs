//! Manifest endpoints

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use serde_json::json;

use super::{DOCKER_CONTENT_DIGEST, OCI_SUBJECT};
use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult};
use crate::manifest::{Manifest, validate_tag};
use crate::repository::Registry;

/// Fetch a manifest by tag or digest, with or without its body.
pub(super) async fn get(
    registry: &Registry,
    name: &str,
    reference: &str,
    include_body: bool,
) -> RegistryResult<Response> {
    let repository = registry.repository(name)?;
    let manifests = repository.manifests();

    let digest = manifests.resolve(reference).await?;
    let manifest = manifests.get(&digest).await?;
    let payload = manifest.payload()?;

    let headers = [
        (header::CONTENT_TYPE, manifest.media_type().to_string()),
        (DOCKER_CONTENT_DIGEST, digest.to_string()),
        (header::CONTENT_LENGTH, payload.len().to_string()),
    ];

    if include_body {
        Ok((StatusCode::OK, headers, payload).into_response())
    } else {
        Ok((StatusCode::OK, headers).into_response())
    }
}

/// Store a manifest, tagging it when the reference is a tag.
pub(super) async fn put(
    registry: &Registry,
    name: &str,
    reference: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> RegistryResult<Response> {
    let repository = registry.repository(name)?;

    let tag = match reference.parse::<Digest>() {
        Ok(expected) => {
            if !expected.verify(&body) {
                return Err(RegistryError::DigestMismatch {
                    expected: expected.to_string(),
                    actual: expected.algorithm().digest(&body).to_string(),
                });
            }
            None
        }
        Err(_) => {
            validate_tag(reference)?;
            Some(reference)
        }
    };

    let declared = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let manifest = Manifest::unmarshal(declared, body)?;
    let manifests = repository.manifests();
    let digest = manifests.put_manifest(&manifest, false).await?;

    if let Some(tag) = tag {
        manifests.tag(tag, &digest).await?;
    }

    let location = format!("/v2/{name}/manifests/{digest}");
    let mut response = (
        StatusCode::CREATED,
        [
            (header::LOCATION, location),
            (DOCKER_CONTENT_DIGEST, digest.to_string()),
        ],
    )
        .into_response();

    if let Some(subject) = manifest.subject().filter(|subject| !subject.is_empty()) {
        if let Ok(value) = HeaderValue::from_str(&subject.digest) {
            response.headers_mut().insert(OCI_SUBJECT, value);
        }
    }

    Ok(response)
}

/// List the tags of a repository.
pub(super) async fn tags(registry: &Registry, name: &str) -> RegistryResult<Response> {
    let repository = registry.repository(name)?;
    let tags = repository.manifests().tags().await?;
    Ok(Json(json!({ "name": name, "tags": tags })).into_response())
}
