use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Digest algorithms accepted as lookup keys.
///
/// SHA-256 is what every artifact is hashed with when the bytes are
/// available; SHA-1 is only accepted because some legacy manifests declare
/// nothing stronger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha1,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha1 => "sha1",
        }
    }

    /// Length of the digest when hex encoded.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha1 => 40,
        }
    }

    /// Guess the algorithm of an untagged hex digest from its length.
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            64 => Some(Self::Sha256),
            40 => Some(Self::Sha1),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha1" => Ok(Self::Sha1),
            _ => exn::bail!(ErrorKind::InvalidHash(s.to_string())),
        }
    }
}

/// An algorithm-tagged content digest, always stored as lowercase hex.
///
/// Displayed (and stored) as `algorithm:hex`, e.g. `sha256:e3b0c442...`.
/// Construction validates the digest length and charset, so holding a
/// `ContentHash` means holding a well-formed key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash {
    algorithm: HashAlgorithm,
    hex: String,
}

impl ContentHash {
    /// Validate a hex digest against the declared algorithm.
    pub fn new(algorithm: HashAlgorithm, hex: impl AsRef<str>) -> crate::error::Result<Self> {
        let hex = hex.as_ref().trim().to_ascii_lowercase();
        if hex.len() != algorithm.hex_len() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            exn::bail!(ErrorKind::InvalidHash(format!("{algorithm}:{hex}")));
        }
        Ok(Self { algorithm, hex })
    }

    /// Build from raw digest bytes (as produced by a hasher).
    pub fn from_digest(algorithm: HashAlgorithm, digest: &[u8]) -> crate::error::Result<Self> {
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        Self::new(algorithm, hex)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Accepts both the tagged form (`sha256:abc...`) and a bare hex digest, in
/// which case the algorithm is inferred from the digest length.
impl FromStr for ContentHash {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once([':', '=']) {
            Some((algorithm, hex)) => Self::new(algorithm.parse()?, hex),
            None => {
                let Some(algorithm) = HashAlgorithm::from_hex_len(s.len()) else {
                    exn::bail!(ErrorKind::InvalidHash(s.to_string()));
                };
                Self::new(algorithm, s)
            },
        }
    }
}

impl TryFrom<String> for ContentHash {
    type Error = Error;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentHash> for String {
    fn from(value: ContentHash) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[rstest]
    #[case(EMPTY_SHA256, HashAlgorithm::Sha256)]
    #[case("sha256:E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855", HashAlgorithm::Sha256)]
    #[case("sha256=e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855", HashAlgorithm::Sha256)]
    #[case("da39a3ee5e6b4b0d3255bfef95601890afd80709", HashAlgorithm::Sha1)]
    #[case("SHA-1:da39a3ee5e6b4b0d3255bfef95601890afd80709", HashAlgorithm::Sha1)]
    fn test_parse_valid(#[case] input: &str, #[case] algorithm: HashAlgorithm) {
        let hash: ContentHash = input.parse().unwrap();
        assert_eq!(hash.algorithm(), algorithm);
        assert_eq!(hash.hex(), hash.hex().to_ascii_lowercase());
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("md5:d41d8cd98f00b204e9800998ecf8427e")]
    #[case("sha256:da39a3ee5e6b4b0d3255bfef95601890afd80709")]
    #[case("sha256:zzb0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")]
    fn test_parse_invalid(#[case] input: &str) {
        assert!(input.parse::<ContentHash>().is_err());
    }

    #[test]
    fn test_display_is_tagged_lowercase() {
        let hash = ContentHash::new(HashAlgorithm::Sha256, EMPTY_SHA256.to_uppercase()).unwrap();
        assert_eq!(hash.to_string(), format!("sha256:{EMPTY_SHA256}"));
        assert_eq!(hash.to_string().parse::<ContentHash>().unwrap(), hash);
    }

    #[test]
    fn test_from_digest() {
        let hash = ContentHash::from_digest(HashAlgorithm::Sha1, &[0xab; 20]).unwrap();
        assert_eq!(hash.hex(), "ab".repeat(20));
        assert!(ContentHash::from_digest(HashAlgorithm::Sha256, &[0xab; 20]).is_err());
    }
}
