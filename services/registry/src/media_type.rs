//! Media types understood by the registry.

/// Legacy docker schema 1 manifest.
pub const DOCKER_MANIFEST_V1: &str = "application/vnd.docker.distribution.manifest.v1+json";
/// Legacy docker schema 1 manifest carrying JWS signatures.
pub const DOCKER_MANIFEST_V1_SIGNED: &str =
    "application/vnd.docker.distribution.manifest.v1+prettyjws";
/// Docker schema 2 single-image manifest.
pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
/// Docker schema 2 multi-platform manifest list.
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
/// OCI image manifest.
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
/// OCI image index.
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Docker image config.
pub const DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
/// Layer referenced by a schema 1 manifest.
pub const DOCKER_LAYER_V1: &str = "application/vnd.docker.container.image.rootfs.diff+x-gtar";
/// Docker gzipped layer.
pub const DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
/// Docker layer hosted outside the registry.
pub const DOCKER_FOREIGN_LAYER: &str = "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip";

/// OCI image config.
pub const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
/// OCI uncompressed layer.
pub const OCI_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";
/// OCI gzipped layer.
pub const OCI_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
/// OCI zstd layer.
pub const OCI_LAYER_ZSTD: &str = "application/vnd.oci.image.layer.v1.tar+zstd";
/// OCI uncompressed non-distributable layer.
pub const OCI_LAYER_NONDISTRIBUTABLE: &str =
    "application/vnd.oci.image.layer.nondistributable.v1.tar";
/// OCI gzipped non-distributable layer.
pub const OCI_LAYER_NONDISTRIBUTABLE_GZIP: &str =
    "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip";
/// OCI zstd non-distributable layer.
pub const OCI_LAYER_NONDISTRIBUTABLE_ZSTD: &str =
    "application/vnd.oci.image.layer.nondistributable.v1.tar+zstd";

/// Type recorded for blobs whose media type is not known.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// How a referenced descriptor is checked for existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceClass {
    /// An image layer, which may carry external URLs.
    Layer {
        /// Distributable layers must exist locally even when URLs are present.
        distributable: bool,
    },

    /// Another manifest, looked up through the manifest store first.
    Manifest,

    /// Anything else: must exist in the blob store.
    Blob,
}

/// Classify a referenced descriptor by its media type.
pub fn classify(media_type: &str) -> ReferenceClass {
    match media_type {
        OCI_LAYER | OCI_LAYER_GZIP | OCI_LAYER_ZSTD | DOCKER_LAYER => ReferenceClass::Layer {
            distributable: true,
        },
        OCI_LAYER_NONDISTRIBUTABLE
        | OCI_LAYER_NONDISTRIBUTABLE_GZIP
        | OCI_LAYER_NONDISTRIBUTABLE_ZSTD
        | DOCKER_FOREIGN_LAYER => ReferenceClass::Layer {
            distributable: false,
        },
        OCI_MANIFEST
        | OCI_INDEX
        | DOCKER_MANIFEST_V2
        | DOCKER_MANIFEST_LIST
        | DOCKER_MANIFEST_V1
        | DOCKER_MANIFEST_V1_SIGNED => ReferenceClass::Manifest,
        _ => ReferenceClass::Blob,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_references() {
        assert_eq!(
            classify(OCI_LAYER_GZIP),
            ReferenceClass::Layer {
                distributable: true
            }
        );
        assert_eq!(
            classify(DOCKER_FOREIGN_LAYER),
            ReferenceClass::Layer {
                distributable: false
            }
        );
        assert_eq!(classify(OCI_INDEX), ReferenceClass::Manifest);
        assert_eq!(classify(OCI_CONFIG), ReferenceClass::Blob);
        assert_eq!(classify("application/vnd.example+json"), ReferenceClass::Blob);
    }
}
