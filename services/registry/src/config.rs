//! Registry configuration

use camino::Utf8PathBuf;
use regex::Regex;
use serde::Deserialize;
use storage::StorageConfig;

use crate::paths::DEFAULT_ROOT;
use crate::repository::RegistryOptions;
use crate::verify::UrlPolicy;

/// Errors turning configuration into a running registry.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A URL pattern is not a valid regular expression.
    #[error("invalid pattern for {field}: {source}")]
    InvalidPattern {
        /// Which setting holds the pattern.
        field: &'static str,
        /// The regex compilation error.
        #[source]
        source: regex::Error,
    },

    /// The configuration file could not be parsed.
    #[cfg(feature = "cli")]
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml_edit::de::Error),
}

/// Top-level registry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegistryConfig {
    /// The storage backend.
    pub storage: StorageConfig,

    /// Bucket holding the registry.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Root of the registry layout inside the bucket.
    #[serde(default = "default_root")]
    pub root: Utf8PathBuf,

    /// Policy for foreign layer URLs.
    #[serde(default)]
    pub urls: UrlConfig,

    /// Referrers API behaviour.
    #[serde(default)]
    pub referrers: ReferrersConfig,
}

/// Allow and deny patterns for foreign layer URLs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UrlConfig {
    /// URLs must match this pattern, when set.
    #[serde(default)]
    pub allow: Option<String>,

    /// URLs must not match this pattern, when set.
    #[serde(default)]
    pub deny: Option<String>,
}

/// Referrers index settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReferrersConfig {
    /// Record manifests with a subject in the referrers index.
    #[serde(default = "default_true")]
    pub indexing: bool,
}

impl Default for ReferrersConfig {
    fn default() -> Self {
        Self { indexing: true }
    }
}

fn default_bucket() -> String {
    "registry".into()
}

fn default_root() -> Utf8PathBuf {
    DEFAULT_ROOT.into()
}

fn default_true() -> bool {
    true
}

impl RegistryConfig {
    /// Parse a TOML configuration document.
    #[cfg(feature = "cli")]
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        Ok(toml_edit::de::from_str(document)?)
    }

    /// Compile the registry options, validating the URL patterns.
    pub fn options(&self) -> Result<RegistryOptions, ConfigError> {
        let allow = compile("urls.allow", self.urls.allow.as_deref())?;
        let deny = compile("urls.deny", self.urls.deny.as_deref())?;

        Ok(RegistryOptions {
            root: self.root.clone(),
            urls: UrlPolicy::new(allow, deny),
            referrers_indexing: self.referrers.indexing,
        })
    }
}

fn compile(field: &'static str, pattern: Option<&str>) -> Result<Option<Regex>, ConfigError> {
    pattern
        .map(Regex::new)
        .transpose()
        .map_err(|source| ConfigError::InvalidPattern { field, source })
}
