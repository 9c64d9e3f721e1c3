//! API server builder and router

use std::collections::HashMap;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{any, get};
use bytes::Bytes;
use serde_json::json;
use storage::{MemoryStorage, Storage};

use crate::error::RegistryResult;
use crate::repository::{Registry, RegistryOptions};

mod blobs;
mod manifests;
mod referrers;

const DOCKER_CONTENT_DIGEST: HeaderName = HeaderName::from_static("docker-content-digest");
const OCI_SUBJECT: HeaderName = HeaderName::from_static("oci-subject");
const OCI_FILTERS_APPLIED: HeaderName = HeaderName::from_static("oci-filters-applied");

/// Registry builder for configuring and creating the OCI registry service
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    storage: Option<Storage>,
    bucket: Option<String>,
    options: RegistryOptions,
}

impl RegistryBuilder {
    /// Create a new registry builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the storage backend
    pub fn storage(mut self, storage: Storage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the bucket name for storage
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Set the registry options
    pub fn options(mut self, options: RegistryOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the registry service
    ///
    /// Without a storage backend the registry is kept in memory. Returns a
    /// Router that can be served with any tower-compatible server.
    pub fn build(self) -> Router {
        let bucket = self.bucket.unwrap_or_else(|| "registry".to_string());
        let storage = self
            .storage
            .unwrap_or_else(|| MemoryStorage::with_buckets(&[bucket.as_str()]).into());

        let registry = Registry::new(storage.bucket(bucket), self.options);

        Router::new()
            .route("/v2/", get(api_version_check))
            .route("/v2/{*path}", any(dispatch))
            .with_state(registry)
    }
}

/// API version check endpoint
///
/// Returns 200 OK to indicate the registry is available
async fn api_version_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({})))
}

/// A request path below `/v2/`.
///
/// Repository names may contain `/`, so routes are recognised by their
/// trailing segments.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route<'a> {
    Manifest { name: &'a str, reference: &'a str },
    Blob { name: &'a str, digest: &'a str },
    Upload { name: &'a str },
    Referrers { name: &'a str, digest: &'a str },
    Tags { name: &'a str },
}

impl<'a> Route<'a> {
    fn parse(path: &'a str) -> Option<Self> {
        let path = path.trim_start_matches('/');

        if let Some(name) = path.strip_suffix("/tags/list") {
            return Some(Route::Tags { name });
        }

        if let Some(name) = path
            .strip_suffix("/blobs/uploads/")
            .or_else(|| path.strip_suffix("/blobs/uploads"))
        {
            return Some(Route::Upload { name });
        }

        let (rest, last) = path.rsplit_once('/')?;
        let (name, kind) = rest.rsplit_once('/')?;
        if name.is_empty() || last.is_empty() {
            return None;
        }

        match kind {
            "manifests" => Some(Route::Manifest {
                name,
                reference: last,
            }),
            "blobs" => Some(Route::Blob { name, digest: last }),
            "referrers" => Some(Route::Referrers { name, digest: last }),
            _ => None,
        }
    }
}

async fn dispatch(
    State(registry): State<Registry>,
    method: Method,
    Path(path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> RegistryResult<Response> {
    let Some(route) = Route::parse(&path) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    tracing::debug!(%method, ?route, "registry request");

    match (route, method) {
        (Route::Manifest { name, reference }, Method::GET) => {
            manifests::get(&registry, name, reference, true).await
        }
        (Route::Manifest { name, reference }, Method::HEAD) => {
            manifests::get(&registry, name, reference, false).await
        }
        (Route::Manifest { name, reference }, Method::PUT) => {
            manifests::put(&registry, name, reference, &headers, body).await
        }
        (Route::Blob { name, digest }, Method::GET) => {
            blobs::get(&registry, name, digest, true).await
        }
        (Route::Blob { name, digest }, Method::HEAD) => {
            blobs::get(&registry, name, digest, false).await
        }
        (Route::Upload { name }, Method::POST) => {
            blobs::upload(&registry, name, &params, body).await
        }
        (Route::Referrers { name, digest }, Method::GET) => {
            referrers::list(&registry, name, digest, params.get("artifactType").map(String::as_str))
                .await
        }
        (Route::Tags { name }, Method::GET) => manifests::tags(&registry, name).await,
        _ => Ok(StatusCode::METHOD_NOT_ALLOWED.into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let storage = storage::MemoryStorage::with_buckets(&["test"]);
        let _registry = RegistryBuilder::new()
            .storage(storage.into())
            .bucket("test")
            .build();
    }

    #[test]
    fn routes_allow_nested_names() {
        assert_eq!(
            Route::parse("library/ubuntu/manifests/latest"),
            Some(Route::Manifest {
                name: "library/ubuntu",
                reference: "latest"
            })
        );
        assert_eq!(
            Route::parse("a/b/c/blobs/sha256:abc"),
            Some(Route::Blob {
                name: "a/b/c",
                digest: "sha256:abc"
            })
        );
        assert_eq!(
            Route::parse("app/blobs/uploads/"),
            Some(Route::Upload { name: "app" })
        );
        assert_eq!(
            Route::parse("/app/referrers/sha256:abc"),
            Some(Route::Referrers {
                name: "app",
                digest: "sha256:abc"
            })
        );
        assert_eq!(Route::parse("app/tags/list"), Some(Route::Tags { name: "app" }));
    }

    #[test]
    fn unknown_routes() {
        for path in [
            "",
            "app",
            "app/manifests",
            "app/unknown/x",
            "/manifests/latest",
            "app/manifests/",
        ] {
            assert_eq!(Route::parse(path), None, "{path}");
        }
    }
}
