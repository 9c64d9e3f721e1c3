//! Storage layout
//!
//! Every object the registry writes lives at a path computed here from the
//! registry root and the object's identity:
//!
//! ```text
//! <root>/v2/blobs/<alg>/<hex[0..2]>/<hex>/data
//! <root>/v2/repositories/<name>/_layers/<alg>/<hex>/link
//! <root>/v2/repositories/<name>/_manifests/revisions/<alg>/<hex>/link
//! <root>/v2/repositories/<name>/_manifests/tags/<tag>/current/link
//! <root>/v2/repositories/<name>/_refs/subjects/<alg>/<hex>/<alg>/<hex>/link
//! ```

use camino::{Utf8Path, Utf8PathBuf};

use crate::digest::Digest;

/// Default registry root.
pub const DEFAULT_ROOT: &str = "/docker/registry";

/// Computes storage paths below a registry root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    root: Utf8PathBuf,
}

impl Default for PathSpec {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl PathSpec {
    /// Paths below `root`.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The registry root.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn v2(&self) -> Utf8PathBuf {
        self.root.join("v2")
    }

    fn repository(&self, name: &str) -> Utf8PathBuf {
        let mut path = self.v2();
        path.push("repositories");
        path.push(name);
        path
    }

    /// Where the bytes of a blob are stored, shared by all repositories.
    pub fn blob_data(&self, digest: &Digest) -> Utf8PathBuf {
        let hex = digest.hex();
        let mut path = self.v2();
        path.push("blobs");
        path.push(digest.algorithm().as_str());
        path.push(&hex[..2]);
        path.push(hex);
        path.push("data");
        path
    }

    /// Link making a blob visible as a layer of a repository.
    pub fn layer_link(&self, name: &str, digest: &Digest) -> Utf8PathBuf {
        let mut path = self.repository(name);
        path.push("_layers");
        push_digest(&mut path, digest);
        path.push("link");
        path
    }

    /// Link recording that a manifest revision belongs to a repository.
    pub fn manifest_revision_link(&self, name: &str, digest: &Digest) -> Utf8PathBuf {
        let mut path = self.repository(name);
        path.push("_manifests");
        path.push("revisions");
        push_digest(&mut path, digest);
        path.push("link");
        path
    }

    /// Directory holding all tags of a repository.
    pub fn tags_dir(&self, name: &str) -> Utf8PathBuf {
        let mut path = self.repository(name);
        path.push("_manifests");
        path.push("tags");
        path
    }

    /// Link holding the digest a tag currently points at.
    pub fn tag_current_link(&self, name: &str, tag: &str) -> Utf8PathBuf {
        let mut path = self.tags_dir(name);
        path.push(tag);
        path.push("current");
        path.push("link");
        path
    }

    /// Directory holding every referrer link for one subject.
    pub fn referrers_subject_dir(&self, name: &str, subject: &Digest) -> Utf8PathBuf {
        let mut path = self.repository(name);
        path.push("_refs");
        path.push("subjects");
        push_digest(&mut path, subject);
        path
    }

    /// Link recording that `referrer` declares `subject`.
    pub fn referrer_link(&self, name: &str, subject: &Digest, referrer: &Digest) -> Utf8PathBuf {
        let mut path = self.referrers_subject_dir(name, subject);
        push_digest(&mut path, referrer);
        path.push("link");
        path
    }
}

fn push_digest(path: &mut Utf8PathBuf, digest: &Digest) {
    path.push(digest.algorithm().as_str());
    path.push(digest.hex());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(fill: char) -> Digest {
        format!("sha256:{}", fill.to_string().repeat(64))
            .parse()
            .unwrap()
    }

    #[test]
    fn referrer_link_layout() {
        let paths = PathSpec::new("/registry-root");
        let subject = digest('a');
        let referrer = digest('b');

        assert_eq!(
            paths.referrer_link("myapp", &subject, &referrer).as_str(),
            format!(
                "/registry-root/v2/repositories/myapp/_refs/subjects/sha256/{}/sha256/{}/link",
                "a".repeat(64),
                "b".repeat(64)
            )
        );
        assert!(paths
            .referrer_link("myapp", &subject, &referrer)
            .starts_with(paths.referrers_subject_dir("myapp", &subject)));
    }

    #[test]
    fn blob_and_link_layout() {
        let paths = PathSpec::default();
        let d = digest('c');

        assert_eq!(
            paths.blob_data(&d).as_str(),
            format!("/docker/registry/v2/blobs/sha256/cc/{}/data", "c".repeat(64))
        );
        assert_eq!(
            paths.layer_link("library/alpine", &d).as_str(),
            format!(
                "/docker/registry/v2/repositories/library/alpine/_layers/sha256/{}/link",
                "c".repeat(64)
            )
        );
        assert_eq!(
            paths.manifest_revision_link("app", &d).as_str(),
            format!(
                "/docker/registry/v2/repositories/app/_manifests/revisions/sha256/{}/link",
                "c".repeat(64)
            )
        );
        assert_eq!(
            paths.tag_current_link("app", "v1.0").as_str(),
            "/docker/registry/v2/repositories/app/_manifests/tags/v1.0/current/link"
        );
    }
}
