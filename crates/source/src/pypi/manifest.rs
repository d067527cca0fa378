//! Turning a downloaded artifact into a [`Manifest`].
//!
//! Runs on a blocking thread: archive readers are synchronous.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use filedex_archive::{ArchiveFormat, Limits, MAGIC_BYTES_LEN};
use filedex_model::{DeclaredHash, Manifest, ManifestEntry};
use filedex_normalize::{common_root, normalize_path, strip_archive_root};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};

/// Packaging metadata that isn't part of what gets installed.
const IGNORED_FILES: [&str; 3] = ["PKG-INFO", "MANIFEST.in", "setup.cfg"];

pub(crate) fn build_manifest(
    mut file: File,
    format: ArchiveFormat,
    limits: Limits,
    max_record_bytes: u64,
) -> Result<Manifest> {
    let mut head = Vec::with_capacity(MAGIC_BYTES_LEN);
    (&mut file).take(MAGIC_BYTES_LEN as u64).read_to_end(&mut head).or_raise(|| ErrorKind::Io)?;
    if !format.check_magic_bytes(&head) {
        exn::bail!(ErrorKind::MalformedArtifact);
    }
    file.rewind().or_raise(|| ErrorKind::Io)?;
    let members = format.list_members(&mut file, limits).map_err(ErrorKind::archive)?;

    let declared = match format {
        ArchiveFormat::Wheel => match members.iter().find(|m| is_record(&m.raw_path)) {
            Some(record) => {
                file.rewind().or_raise(|| ErrorKind::Io)?;
                format
                    .read_member(&mut file, &record.raw_path, max_record_bytes)
                    .map_err(ErrorKind::archive)?
                    .map(|bytes| parse_record(&String::from_utf8_lossy(&bytes)))
                    .unwrap_or_default()
            },
            None => HashMap::new(),
        },
        _ => HashMap::new(),
    };

    let archive_root = match format.has_wrapper_dir() {
        true => common_root(members.iter().map(|m| m.raw_path.as_str())),
        false => None,
    };
    let entries: Vec<ManifestEntry> = members
        .into_iter()
        .filter(|m| !is_metadata(&m.raw_path, archive_root.as_deref()))
        .map(|m| match declared.get(&m.raw_path) {
            Some(hash) => m.with_declared(hash.clone()),
            None => m,
        })
        .collect();
    Ok(Manifest { entries, archive_root })
}

/// `<name>-<version>.dist-info/RECORD` at the top level of a wheel.
fn is_record(raw_path: &str) -> bool {
    raw_path
        .split_once('/')
        .is_some_and(|(dir, file)| dir.ends_with(".dist-info") && file == "RECORD")
}

/// Whether a member is packaging metadata rather than installed content.
pub(crate) fn is_metadata(raw_path: &str, archive_root: Option<&str>) -> bool {
    // Leave unnormalizable paths in; the normalizer reports why they're skipped.
    let Ok(path) = normalize_path(raw_path) else {
        return false;
    };
    let relative = match archive_root {
        Some(root) => match strip_archive_root(&path, root) {
            Ok(relative) => relative,
            Err(_) => return false,
        },
        None => path,
    };
    IGNORED_FILES.contains(&relative.as_str())
        || relative.split('/').next() == Some("EGG-INFO")
        || relative.split('/').any(|s| s.ends_with(".dist-info") || s.ends_with(".egg-info"))
}

/// Parse a wheel `RECORD` (CSV of `path,algorithm=digest,size`).
///
/// Paths may be quoted (they can contain commas), but the hash and size
/// columns never are, so splitting from the right is enough.
pub(crate) fn parse_record(text: &str) -> HashMap<String, DeclaredHash> {
    let mut hashes = HashMap::new();
    for line in text.lines() {
        let mut fields = line.trim_end_matches('\r').rsplitn(3, ',');
        let (Some(_size), Some(hash), Some(path)) = (fields.next(), fields.next(), fields.next()) else {
            continue;
        };
        let Some(declared) = DeclaredHash::from_record(hash) else {
            continue;
        };
        let path = match path.strip_prefix('"').and_then(|p| p.strip_suffix('"')) {
            Some(quoted) => quoted.replace("\"\"", "\""),
            None => path.to_string(),
        };
        hashes.insert(path, declared);
    }
    hashes
}

#[cfg(test)]
mod tests {
    use super::*;
    use filedex_model::FileType;
    use rstest::rstest;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const EMPTY_SHA256_B64: &str = "47DEQpj8HBSa-_TImW-5JCeuQeRkm5NMpJWZG3hSuFU";

    fn wheel_file() -> File {
        let file = tempfile::tempfile().unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        zip.start_file("demo/__init__.py", options).unwrap();
        zip.start_file("demo/util.py", options).unwrap();
        zip.write_all(b"x = 1\n").unwrap();
        zip.start_file("demo-1.0.dist-info/METADATA", options).unwrap();
        zip.write_all(b"Name: demo\n").unwrap();
        zip.start_file("demo-1.0.dist-info/RECORD", options).unwrap();
        let record = format!(
            "demo/__init__.py,sha256={EMPTY_SHA256_B64},0\ndemo/util.py,,\ndemo-1.0.dist-info/RECORD,,\n"
        );
        zip.write_all(record.as_bytes()).unwrap();
        let mut file = zip.finish().unwrap();
        file.rewind().unwrap();
        file
    }

    #[test]
    fn test_build_manifest_from_wheel() {
        let manifest = build_manifest(wheel_file(), ArchiveFormat::Wheel, Limits::default(), 1024).unwrap();
        assert_eq!(manifest.archive_root, None);
        let paths: Vec<_> = manifest.entries.iter().map(|e| e.raw_path.as_str()).collect();
        assert_eq!(paths, ["demo/__init__.py", "demo/util.py"]);
        let init = &manifest.entries[0];
        assert_eq!(init.declared.as_ref().unwrap().value, EMPTY_SHA256_B64);
        assert!(init.computed.is_some());
        assert!(manifest.entries[1].declared.is_none());
        assert_eq!(manifest.entries[1].file_type, FileType::Regular);
    }

    #[test]
    fn test_build_manifest_rejects_mislabelled_artifact() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"<!DOCTYPE html><title>Not Found</title>").unwrap();
        file.rewind().unwrap();
        let err = build_manifest(file, ArchiveFormat::Wheel, Limits::default(), 1024).unwrap_err();
        assert_eq!(*err, ErrorKind::MalformedArtifact);
    }

    #[rstest]
    #[case("demo-1.0.dist-info/METADATA", None, true)]
    #[case("demo-1.0.dist-info", None, true)]
    #[case("EGG-INFO/PKG-INFO", None, true)]
    #[case("demo-1.0/demo.egg-info/SOURCES.txt", Some("demo-1.0"), true)]
    #[case("demo-1.0/PKG-INFO", Some("demo-1.0"), true)]
    #[case("demo-1.0/setup.cfg", Some("demo-1.0"), true)]
    #[case("demo-1.0/docs/setup.cfg", Some("demo-1.0"), false)]
    #[case("demo-1.0/setup.py", Some("demo-1.0"), false)]
    #[case("demo/__init__.py", None, false)]
    #[case("../PKG-INFO", None, false)]
    fn test_is_metadata(#[case] raw: &str, #[case] root: Option<&str>, #[case] expected: bool) {
        assert_eq!(is_metadata(raw, root), expected);
    }

    #[test]
    fn test_parse_record() {
        let record = format!(
            "demo/__init__.py,sha256={EMPTY_SHA256_B64},0\r\n\"demo/a,b.py\",sha256=abc,3\ndemo/no_hash.py,,\n\n"
        );
        let hashes = parse_record(&record);
        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes["demo/__init__.py"].algorithm, "sha256");
        assert_eq!(hashes["demo/a,b.py"].value, "abc");
    }

    #[rstest]
    #[case("demo-1.0.dist-info/RECORD", true)]
    #[case("demo-1.0.dist-info/RECORD.jws", false)]
    #[case("demo/RECORD", false)]
    #[case("x/demo-1.0.dist-info/RECORD", false)]
    fn test_is_record(#[case] raw: &str, #[case] expected: bool) {
        assert_eq!(is_record(raw), expected);
    }
}
