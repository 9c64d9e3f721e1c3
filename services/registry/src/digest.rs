//! Content digests (`algorithm:hex`)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256, Sha384, Sha512};

/// A digest string failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    /// Not of the form `algorithm:hex`.
    #[error("invalid digest format: {0:?}")]
    InvalidFormat(String),

    /// The algorithm is syntactically fine but not one we can compute.
    #[error("unsupported digest algorithm: {0:?}")]
    UnsupportedAlgorithm(String),

    /// The encoded part has the wrong length for its algorithm.
    #[error(
        "invalid digest length for {algorithm}: expected {expected} hex characters, got {actual}"
    )]
    InvalidLength {
        /// Algorithm named by the digest.
        algorithm: Algorithm,
        /// Required number of hex characters.
        expected: usize,
        /// Number of characters present.
        actual: usize,
    },

    /// The encoded part contains something other than lowercase hex.
    #[error("invalid hex in digest: {0:?}")]
    InvalidHex(String),
}

/// Hash algorithms a digest may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    /// SHA-256, the canonical algorithm for content we hash ourselves.
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl Algorithm {
    /// The algorithm identifier as it appears in digest strings and paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
        }
    }

    /// Length of the hex encoding of a hash produced by this algorithm.
    pub fn hex_len(&self) -> usize {
        match self {
            Algorithm::Sha256 => 64,
            Algorithm::Sha384 => 96,
            Algorithm::Sha512 => 128,
        }
    }

    /// Hash `content` and return its digest.
    pub fn digest(&self, content: &[u8]) -> Digest {
        let hex = match self {
            Algorithm::Sha256 => hex::encode(Sha256::digest(content)),
            Algorithm::Sha384 => hex::encode(Sha384::digest(content)),
            Algorithm::Sha512 => hex::encode(Sha512::digest(content)),
        };
        Digest {
            algorithm: *self,
            hex,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Algorithm::Sha256),
            "sha384" => Ok(Algorithm::Sha384),
            "sha512" => Ok(Algorithm::Sha512),
            other if is_algorithm_component(other) => {
                Err(DigestError::UnsupportedAlgorithm(other.to_string()))
            }
            other => Err(DigestError::InvalidFormat(other.to_string())),
        }
    }
}

/// `[a-z0-9]+([+._-][a-z0-9]+)*`
fn is_algorithm_component(s: &str) -> bool {
    let mut previous_separator = true;
    for c in s.chars() {
        match c {
            'a'..='z' | '0'..='9' => previous_separator = false,
            '+' | '.' | '_' | '-' if !previous_separator => previous_separator = true,
            _ => return false,
        }
    }
    !previous_separator
}

/// A validated content digest.
///
/// Parsing checks the algorithm is known and the hex part has the exact
/// length that algorithm produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: Algorithm,
    hex: String,
}

impl Digest {
    /// The canonical (SHA-256) digest of `content`.
    pub fn sha256(content: &[u8]) -> Self {
        Algorithm::Sha256.digest(content)
    }

    /// Assemble a digest from an algorithm name and hex part, as found in
    /// storage paths.
    pub fn from_parts(algorithm: &str, hex: &str) -> Result<Self, DigestError> {
        let algorithm: Algorithm = algorithm.parse()?;
        if hex.len() != algorithm.hex_len() {
            return Err(DigestError::InvalidLength {
                algorithm,
                expected: algorithm.hex_len(),
                actual: hex.len(),
            });
        }
        if !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(DigestError::InvalidHex(hex.to_string()));
        }

        Ok(Self {
            algorithm,
            hex: hex.to_string(),
        })
    }

    /// The hash algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The hex-encoded hash.
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Check that `content` hashes to this digest.
    pub fn verify(&self, content: &[u8]) -> bool {
        self.algorithm.digest(content) == *self
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, hex) = s
            .split_once(':')
            .ok_or_else(|| DigestError::InvalidFormat(s.to_string()))?;
        if algorithm.is_empty() || hex.is_empty() || hex.contains(':') {
            return Err(DigestError::InvalidFormat(s.to_string()));
        }
        Digest::from_parts(algorithm, hex)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str =
        "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn hashes_content() {
        assert_eq!(Digest::sha256(b"").to_string(), EMPTY_SHA256);
        assert!(Digest::sha256(b"abc").verify(b"abc"));
        assert!(!Digest::sha256(b"abc").verify(b"abd"));
    }

    #[test]
    fn parses_and_displays() {
        let digest: Digest = EMPTY_SHA256.parse().unwrap();
        assert_eq!(digest.algorithm(), Algorithm::Sha256);
        assert_eq!(digest.hex().len(), 64);
        assert_eq!(digest.to_string(), EMPTY_SHA256);

        let sha512 = Algorithm::Sha512.digest(b"x");
        assert_eq!(sha512.to_string().parse::<Digest>().unwrap(), sha512);
    }

    #[test]
    fn rejects_malformed_digests() {
        assert!(matches!(
            "sha256".parse::<Digest>(),
            Err(DigestError::InvalidFormat(_))
        ));
        assert!(matches!(
            ":abc".parse::<Digest>(),
            Err(DigestError::InvalidFormat(_))
        ));
        assert!(matches!(
            "md5:d41d8cd98f00b204e9800998ecf8427e".parse::<Digest>(),
            Err(DigestError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            "SHA256:abc".parse::<Digest>(),
            Err(DigestError::InvalidFormat(_))
        ));
        assert!(matches!(
            "sha256:abc".parse::<Digest>(),
            Err(DigestError::InvalidLength { expected: 64, actual: 3, .. })
        ));

        let upper = EMPTY_SHA256.to_uppercase().replace("SHA256", "sha256");
        assert!(matches!(
            upper.parse::<Digest>(),
            Err(DigestError::InvalidHex(_))
        ));
    }

    #[test]
    fn serde_uses_string_form() {
        let digest = Digest::sha256(b"layer");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{digest}\""));
        assert_eq!(serde_json::from_str::<Digest>(&json).unwrap(), digest);
        assert!(serde_json::from_str::<Digest>("\"sha256:nope\"").is_err());
    }
}
