use crate::SkipReason;
use crate::hash::select_hash;
use crate::path::{normalize_path, strip_archive_root};
use filedex_model::{FileEntry, FileType, Manifest, ManifestEntry};
use std::collections::BTreeMap;

/// A manifest entry that did not make it into the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Skipped {
    pub raw_path: String,
    pub reason: SkipReason,
}

/// Result of normalizing a whole manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NormalizedManifest {
    /// Indexable entries, sorted by path, unique per path.
    pub entries: Vec<FileEntry>,
    pub skipped: Vec<Skipped>,
}

impl NormalizedManifest {
    /// Skips worth reporting: directories are expected and not interesting.
    pub fn notable_skips(&self) -> impl Iterator<Item = &Skipped> {
        self.skipped.iter().filter(|s| s.reason != SkipReason::Directory)
    }
}

/// Normalize every entry of a manifest into indexable [`FileEntry`] values.
///
/// When two raw paths normalize to the same path, the later entry wins,
/// mirroring how extracting the archive would overwrite the earlier member.
pub fn normalize_manifest(manifest: &Manifest) -> NormalizedManifest {
    let root = manifest.archive_root.as_deref().and_then(|r| normalize_path(r).ok());
    let mut entries = BTreeMap::new();
    let mut skipped = Vec::new();
    for entry in &manifest.entries {
        match normalize_entry(entry, root.as_deref()) {
            Ok(file) => {
                entries.insert(file.path.clone(), file);
            },
            Err(reason) => {
                if reason != SkipReason::Directory {
                    tracing::debug!(path = %entry.raw_path.escape_debug(), %reason, "Skipping manifest entry");
                }
                skipped.push(Skipped { raw_path: entry.raw_path.clone(), reason });
            },
        }
    }
    NormalizedManifest { entries: entries.into_values().collect(), skipped }
}

fn normalize_entry(entry: &ManifestEntry, root: Option<&str>) -> Result<FileEntry, SkipReason> {
    if entry.file_type == FileType::Directory {
        return Err(SkipReason::Directory);
    }
    let path = normalize_path(&entry.raw_path)?;
    let path = match root {
        Some(root) => strip_archive_root(&path, root)?,
        None => path,
    };
    let hash = select_hash(entry.declared.as_ref(), entry.computed.as_ref())?;
    Ok(FileEntry { path, hash, sha1: entry.sha1.clone(), size: entry.size, file_type: entry.file_type })
}
