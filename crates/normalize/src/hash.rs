//! Content-hash selection and validation.

use crate::SkipReason;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use filedex_model::{ContentHash, DeclaredHash, HashAlgorithm};

/// Validate an upstream-declared hash.
///
/// The algorithm label must be one we index by, and the value must be either
/// hex of the right length or (as wheel `RECORD` files use) URL-safe base64
/// that decodes to a digest of the right length. Anything else is `None`.
pub fn decode_declared(declared: &DeclaredHash) -> Option<ContentHash> {
    let algorithm: HashAlgorithm = declared.algorithm.parse().ok()?;
    let value = declared.value.trim();
    if let Ok(hash) = ContentHash::new(algorithm, value) {
        return Some(hash);
    }
    let bytes = URL_SAFE_NO_PAD.decode(value.trim_end_matches('=')).ok()?;
    ContentHash::from_digest(algorithm, &bytes).ok()
}

/// Pick the hash that becomes a file's lookup key.
///
/// A valid declared hash is used as-is. When the bytes were also hashed and
/// the two disagree under the same algorithm, the computed hash wins (it
/// describes what is actually in the artifact) and the conflict is logged.
/// An invalid or missing declaration falls back to the computed hash; with
/// neither, the file is skipped.
pub fn select_hash(declared: Option<&DeclaredHash>, computed: Option<&ContentHash>) -> Result<ContentHash, SkipReason> {
    let validated = declared.and_then(|d| {
        let decoded = decode_declared(d);
        if decoded.is_none() {
            tracing::debug!(algorithm = %d.algorithm, value = %d.value, "Ignoring malformed declared hash");
        }
        decoded
    });
    match (validated, computed) {
        (Some(declared), Some(computed)) if declared.algorithm() == computed.algorithm() && &declared != computed => {
            tracing::warn!(%declared, %computed, "Declared hash does not match archive contents; using computed hash");
            Ok(computed.clone())
        },
        (Some(declared), _) => Ok(declared),
        (None, Some(computed)) => Ok(computed.clone()),
        (None, None) => Err(SkipReason::MissingHash),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const EMPTY_SHA256_B64: &str = "47DEQpj8HBSa-_TImW-5JCeuQeRkm5NMpJWZG3hSuFU";

    fn sha256(hex: &str) -> ContentHash {
        ContentHash::new(HashAlgorithm::Sha256, hex).unwrap()
    }

    #[rstest]
    #[case("sha256", EMPTY_SHA256)]
    #[case("SHA256", &EMPTY_SHA256.to_uppercase())]
    #[case("sha256", EMPTY_SHA256_B64)]
    #[case("sha256", &format!("{EMPTY_SHA256_B64}="))]
    fn test_decode_declared(#[case] algorithm: &str, #[case] value: &str) {
        let decoded = decode_declared(&DeclaredHash::new(algorithm, value)).unwrap();
        assert_eq!(decoded, sha256(EMPTY_SHA256));
    }

    #[rstest]
    #[case("md5", "d41d8cd98f00b204e9800998ecf8427e")]
    #[case("sha256", "not a hash")]
    #[case("sha256", "aaaa")]
    #[case("sha1", EMPTY_SHA256)]
    fn test_decode_declared_rejects(#[case] algorithm: &str, #[case] value: &str) {
        assert!(decode_declared(&DeclaredHash::new(algorithm, value)).is_none());
    }

    #[test]
    fn test_select_prefers_valid_declared() {
        let declared = DeclaredHash::new("sha256", EMPTY_SHA256);
        assert_eq!(select_hash(Some(&declared), None).unwrap(), sha256(EMPTY_SHA256));
    }

    #[test]
    fn test_select_falls_back_to_computed() {
        let computed = sha256(&"b".repeat(64));
        let malformed = DeclaredHash::new("sha256", "garbage");
        assert_eq!(select_hash(Some(&malformed), Some(&computed)).unwrap(), computed);
        assert_eq!(select_hash(None, Some(&computed)).unwrap(), computed);
    }

    #[test]
    fn test_select_conflict_uses_computed() {
        let computed = sha256(&"b".repeat(64));
        let declared = DeclaredHash::new("sha256", EMPTY_SHA256);
        assert_eq!(select_hash(Some(&declared), Some(&computed)).unwrap(), computed);
    }

    #[test]
    fn test_select_missing() {
        assert_eq!(select_hash(None, None), Err(SkipReason::MissingHash));
        let malformed = DeclaredHash::new("sha256", "garbage");
        assert_eq!(select_hash(Some(&malformed), None), Err(SkipReason::MissingHash));
    }
}
