//! # OCI Container Registry
//!
//! Content-addressed manifest and blob storage for an OCI registry, following
//! the [OCI Distribution Specification](https://github.com/opencontainers/distribution-spec).
//!
//! ## Features
//!
//! - Docker schema 1, schema 2 and manifest lists, OCI image manifests and indexes
//! - Reference verification before a manifest is stored, including a policy
//!   for foreign layer URLs
//! - A referrers index for manifests declaring a subject
//! - Pluggable storage backend via the `storage` crate
//! - An axum router for the distribution API
//!
//! ## Example
//!
//! ```no_run
//! use registry::RegistryBuilder;
//! use storage::MemoryStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = MemoryStorage::with_buckets(&["registry"]);
//! let registry = RegistryBuilder::new()
//!     .storage(storage.into())
//!     .bucket("registry")
//!     .build();
//!
//! // Use the registry service with axum or any tower-compatible server
//! # Ok(())
//! # }
//! ```
//!
//! The storage core can also be used directly:
//!
//! ```no_run
//! use bytes::Bytes;
//! use registry::{Registry, RegistryOptions};
//! use storage::MemoryStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = storage::Storage::new(MemoryStorage::with_buckets(&["registry"]));
//! let registry = Registry::new(storage.bucket("registry"), RegistryOptions::default());
//!
//! let repository = registry.repository("library/app")?;
//! let content = Bytes::from_static(br#"{"schemaVersion":2,"manifests":[]}"#);
//! let digest = repository.manifests().put(None, content, false).await?;
//! # Ok(())
//! # }
//! ```

mod api;
mod blob;
mod config;
mod descriptor;
mod digest;
mod error;
pub mod manifest;
pub mod media_type;
mod paths;
mod referrers;
mod repository;
mod storage;
mod verify;

pub use self::api::RegistryBuilder;
pub use self::blob::{BlobStore, LinkKind, LinkedBlobStore};
pub use self::config::{ConfigError, ReferrersConfig, RegistryConfig, UrlConfig};
pub use self::descriptor::{Descriptor, Platform};
pub use self::digest::{Algorithm, Digest, DigestError};
pub use self::error::{RegistryError, RegistryResult, VerificationError, VerificationErrors};
pub use self::manifest::{Manifest, ManifestKind, ManifestStore};
pub use self::paths::{DEFAULT_ROOT, PathSpec};
pub use self::referrers::ReferrerIndex;
pub use self::repository::{Registry, RegistryOptions, Repository};
pub use self::storage::RegistryStorage;
pub use self::verify::{UrlPolicy, Verifier};
