//! Integration tests for the OCI registry

use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use bytes::Bytes;
use http_body_util::BodyExt;
use registry::media_type::{OCI_CONFIG, OCI_INDEX, OCI_LAYER_GZIP, OCI_MANIFEST};
use registry::{Descriptor, Digest, RegistryBuilder};
use storage::MemoryStorage;
use tower::ServiceExt;

/// Helper to create a test registry
fn test_registry() -> axum::Router {
    let storage = MemoryStorage::with_buckets(&["test-registry"]);
    RegistryBuilder::new()
        .storage(storage.into())
        .bucket("test-registry")
        .build()
}

async fn send(app: &axum::Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

async fn body(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body(response).await).unwrap()
}

async fn upload(app: &axum::Router, name: &str, data: &'static [u8]) -> Digest {
    let digest = Digest::sha256(data);
    let response = send(
        app,
        Request::builder()
            .method("POST")
            .uri(format!("/v2/{name}/blobs/uploads/?digest={digest}"))
            .body(Body::from(data))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    digest
}

async fn put_manifest(
    app: &axum::Router,
    name: &str,
    reference: &str,
    content: &str,
) -> Response<Body> {
    send(
        app,
        Request::builder()
            .method("PUT")
            .uri(format!("/v2/{name}/manifests/{reference}"))
            .header(header::CONTENT_TYPE, OCI_MANIFEST)
            .body(Body::from(content.to_string()))
            .unwrap(),
    )
    .await
}

fn image_manifest(config: &Digest, layer: &Digest, subject: Option<&Digest>) -> String {
    let mut manifest = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": OCI_MANIFEST,
        "config": Descriptor::new(OCI_CONFIG, config, 2),
        "layers": [Descriptor::new(OCI_LAYER_GZIP, layer, 5)],
    });
    if let Some(subject) = subject {
        manifest["subject"] =
            serde_json::to_value(Descriptor::new(OCI_MANIFEST, subject, 10)).unwrap();
        manifest["artifactType"] = "application/vnd.example.signature".into();
    }
    manifest.to_string()
}

#[tokio::test]
async fn test_api_version_check() {
    let app = test_registry();

    let response = send(&app, Request::builder().uri("/v2/").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_blob_upload_and_download() {
    let app = test_registry();
    let data = b"Hello, OCI Registry!";
    let digest = upload(&app, "test-repo", data).await;

    let response = send(
        &app,
        Request::builder()
            .uri(format!("/v2/test-repo/blobs/{digest}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["docker-content-digest"],
        digest.to_string().as_str()
    );
    assert_eq!(&body(response).await[..], data);

    let response = send(
        &app,
        Request::builder()
            .method("HEAD")
            .uri(format!("/v2/test-repo/blobs/{digest}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_LENGTH], data.len().to_string().as_str());
}

#[tokio::test]
async fn test_blob_upload_digest_mismatch() {
    let app = test_registry();
    let wrong = Digest::sha256(b"something else");

    let response = send(
        &app,
        Request::builder()
            .method("POST")
            .uri(format!("/v2/test-repo/blobs/uploads/?digest={wrong}"))
            .body(Body::from("data"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["errors"][0]["code"], "DIGEST_INVALID");
}

#[tokio::test]
async fn test_blob_not_found() {
    let app = test_registry();
    let digest = Digest::sha256(b"absent");

    let response = send(
        &app,
        Request::builder()
            .uri(format!("/v2/test-repo/blobs/{digest}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response).await["errors"][0]["code"], "BLOB_UNKNOWN");
}

#[tokio::test]
async fn test_cross_repository_mount() {
    let app = test_registry();
    let digest = upload(&app, "library/source", b"shared layer").await;

    let response = send(
        &app,
        Request::builder()
            .method("POST")
            .uri(format!("/v2/library/target/blobs/uploads/?mount={digest}&from=library/source"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(
        &app,
        Request::builder()
            .uri(format!("/v2/library/target/blobs/{digest}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(&body(response).await[..], b"shared layer");
}

#[tokio::test]
async fn test_manifest_put_and_get() {
    let app = test_registry();
    let config = upload(&app, "library/app", b"{}").await;
    let layer = upload(&app, "library/app", b"layer").await;
    let manifest = image_manifest(&config, &layer, None);
    let digest = Digest::sha256(manifest.as_bytes());

    let response = put_manifest(&app, "library/app", "latest", &manifest).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response.headers()[header::LOCATION],
        format!("/v2/library/app/manifests/{digest}").as_str()
    );
    assert_eq!(response.headers()["docker-content-digest"], digest.to_string().as_str());
    assert!(response.headers().get("oci-subject").is_none());

    for reference in ["latest".to_string(), digest.to_string()] {
        let response = send(
            &app,
            Request::builder()
                .uri(format!("/v2/library/app/manifests/{reference}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], OCI_MANIFEST);
        assert_eq!(&body(response).await[..], manifest.as_bytes());
    }

    let response = send(
        &app,
        Request::builder()
            .uri("/v2/library/app/tags/list")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(json(response).await["tags"], serde_json::json!(["latest"]));
}

#[tokio::test]
async fn test_manifest_with_missing_blobs() {
    let app = test_registry();
    let config = upload(&app, "app", b"{}").await;
    let missing = Digest::sha256(b"layer");
    let manifest = image_manifest(&config, &missing, None);

    let response = put_manifest(&app, "app", "latest", &manifest).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let errors = json(response).await;
    assert_eq!(errors["errors"].as_array().unwrap().len(), 1);
    assert_eq!(errors["errors"][0]["code"], "MANIFEST_BLOB_UNKNOWN");
    assert_eq!(errors["errors"][0]["detail"]["digest"], missing.to_string());
}

#[tokio::test]
async fn test_manifest_digest_reference_must_match() {
    let app = test_registry();
    let config = upload(&app, "app", b"{}").await;
    let layer = upload(&app, "app", b"layer").await;
    let manifest = image_manifest(&config, &layer, None);

    let other = Digest::sha256(b"other").to_string();
    let response = put_manifest(&app, "app", &other, &manifest).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["errors"][0]["code"], "DIGEST_INVALID");

    let digest = Digest::sha256(manifest.as_bytes());
    let response = put_manifest(&app, "app", &digest.to_string(), &manifest).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_unsupported_manifest() {
    let app = test_registry();
    let response = put_manifest(&app, "app", "latest", r#"{"schemaVersion":3}"#).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json(response).await["errors"][0]["code"], "UNSUPPORTED");
}

#[tokio::test]
async fn test_invalid_repository_name() {
    let app = test_registry();
    let response = send(
        &app,
        Request::builder()
            .uri("/v2/Bad_Name/manifests/latest")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["errors"][0]["code"], "NAME_INVALID");
}

#[tokio::test]
async fn test_referrers() {
    let app = test_registry();
    let config = upload(&app, "app", b"{}").await;
    let layer = upload(&app, "app", b"layer").await;

    let subject = image_manifest(&config, &layer, None);
    let response = put_manifest(&app, "app", "latest", &subject).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let subject_digest = Digest::sha256(subject.as_bytes());

    let signature = image_manifest(&config, &layer, Some(&subject_digest));
    let response = put_manifest(&app, "app", "signature", &signature).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["oci-subject"], subject_digest.to_string().as_str());
    let signature_digest = Digest::sha256(signature.as_bytes());

    let response = send(
        &app,
        Request::builder()
            .uri(format!("/v2/app/referrers/{subject_digest}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], OCI_INDEX);

    let index = json(response).await;
    let manifests = index["manifests"].as_array().unwrap();
    assert_eq!(manifests.len(), 1);
    assert_eq!(manifests[0]["digest"], signature_digest.to_string());
    assert_eq!(manifests[0]["size"], signature.len());
    assert_eq!(manifests[0]["artifactType"], "application/vnd.example.signature");

    let response = send(
        &app,
        Request::builder()
            .uri(format!(
                "/v2/app/referrers/{subject_digest}?artifactType=application/vnd.example.sbom"
            ))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.headers()["oci-filters-applied"], "artifactType");
    assert!(json(response).await["manifests"].as_array().unwrap().is_empty());
}
