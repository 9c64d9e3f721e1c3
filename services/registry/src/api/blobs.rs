//! Blob endpoints

use std::collections::HashMap;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use super::DOCKER_CONTENT_DIGEST;
use crate::digest::Digest;
use crate::error::{RegistryError, RegistryResult};
use crate::media_type::OCTET_STREAM;
use crate::repository::Registry;

/// Fetch a blob linked in a repository, with or without its body.
pub(super) async fn get(
    registry: &Registry,
    name: &str,
    digest: &str,
    include_body: bool,
) -> RegistryResult<Response> {
    let repository = registry.repository(name)?;
    let digest: Digest = digest.parse()?;
    let blobs = repository.blobs();

    let descriptor = blobs
        .stat(&digest)
        .await?
        .ok_or_else(|| RegistryError::BlobNotFound(digest.to_string()))?;

    let headers = [
        (header::CONTENT_TYPE, OCTET_STREAM.to_string()),
        (DOCKER_CONTENT_DIGEST, digest.to_string()),
        (header::CONTENT_LENGTH, descriptor.size.to_string()),
    ];

    if include_body {
        let content = blobs.get(&digest).await?;
        Ok((StatusCode::OK, headers, content).into_response())
    } else {
        Ok((StatusCode::OK, headers).into_response())
    }
}

/// Monolithic upload (`?digest=`) or cross-repository mount (`?mount=&from=`).
pub(super) async fn upload(
    registry: &Registry,
    name: &str,
    params: &HashMap<String, String>,
    body: Bytes,
) -> RegistryResult<Response> {
    let repository = registry.repository(name)?;

    let mount = params.get("mount").zip(params.get("from"));
    let digest: Digest = if let Some((mount, from)) = mount {
        let digest: Digest = mount.parse()?;
        let source = registry.repository(from)?;
        repository.blobs().mount(&source.blobs(), &digest).await?;
        digest
    } else if let Some(digest) = params.get("digest") {
        let digest: Digest = digest.parse()?;
        repository.blobs().accept(&digest, &body).await?;
        digest
    } else {
        return Err(RegistryError::BlobUploadInvalid(
            "uploads must be monolithic and name their digest".into(),
        ));
    };

    let location = format!("/v2/{name}/blobs/{digest}");
    Ok((
        StatusCode::CREATED,
        [
            (header::LOCATION, location),
            (DOCKER_CONTENT_DIGEST, digest.to_string()),
            (header::CONTENT_LENGTH, "0".to_string()),
        ],
    )
        .into_response())
}
