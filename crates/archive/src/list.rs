//! Member enumeration and hashing.

use crate::error::{ErrorKind, Result};
use crate::{ArchiveFormat, Limits};
use bzip2::read::MultiBzDecoder;
use exn::ResultExt;
use filedex_model::{ContentHash, FileType, HashAlgorithm, ManifestEntry};
use flate2::read::MultiGzDecoder;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Read, Seek};
use tar::EntryType;
use tracing::instrument;
use xz2::read::XzDecoder;
use zip::ZipArchive;
use zip::result::ZipError;

const BUFFER_SIZE: usize = 64 * 1024;

/// Digests and length of one member's bytes.
#[derive(Clone, Debug)]
struct Hashed {
    sha256: ContentHash,
    sha1: ContentHash,
    size: u64,
}

impl Hashed {
    fn entry(self, raw_path: String) -> ManifestEntry {
        ManifestEntry::regular(raw_path, self.size).with_computed(self.sha256).with_sha1(self.sha1)
    }
}

/// Running totals checked against [`Limits`] while an archive is read.
struct Budget {
    limits: Limits,
    entries: usize,
    bytes: u64,
    buffer: Vec<u8>,
}

impl Budget {
    fn new(limits: Limits) -> Self {
        Self { limits, entries: 0, bytes: 0, buffer: vec![0; BUFFER_SIZE] }
    }

    fn count_entry(&mut self) -> Result<()> {
        self.entries += 1;
        if self.entries > self.limits.max_entries {
            exn::bail!(ErrorKind::TooManyEntries(self.limits.max_entries));
        }
        Ok(())
    }

    /// Stream a member through SHA-256 and SHA-1 in one pass.
    fn hash(&mut self, reader: &mut impl Read) -> Result<Hashed> {
        let mut sha256 = Sha256::new();
        let mut sha1 = Sha1::new();
        let mut size = 0u64;
        loop {
            let read = reader.read(&mut self.buffer).or_raise(|| ErrorKind::InvalidData)?;
            if read == 0 {
                break;
            }
            // Infallible: a usize buffer length always fits in a u64.
            let read_u64 = u64::try_from(read).unwrap_or(u64::MAX);
            size += read_u64;
            self.bytes += read_u64;
            if self.bytes > self.limits.max_total_bytes {
                exn::bail!(ErrorKind::TooLarge(self.limits.max_total_bytes));
            }
            sha256.update(&self.buffer[..read]);
            sha1.update(&self.buffer[..read]);
        }
        Ok(Hashed {
            sha256: ContentHash::from_digest(HashAlgorithm::Sha256, &sha256.finalize())
                .or_raise(|| ErrorKind::InvalidData)?,
            sha1: ContentHash::from_digest(HashAlgorithm::Sha1, &sha1.finalize()).or_raise(|| ErrorKind::InvalidData)?,
            size,
        })
    }
}

impl ArchiveFormat {
    /// List every member of an archive, hashing regular files (SHA-256 and
    /// SHA-1) as they are decompressed.
    ///
    /// Symlinks are hashed by their link target, so two packages shipping the
    /// same link resolve to the same key. Tar hard links reuse the hash of the
    /// member they point at. Devices, FIFOs and tar extension headers are not
    /// reported, but still count towards [`Limits::max_entries`].
    ///
    /// # Examples
    ///
    /// ```
    /// use filedex_archive::{ArchiveFormat, Limits};
    /// use std::io::{Cursor, Write};
    ///
    /// let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    /// zip.start_file("demo/__init__.py", zip::write::SimpleFileOptions::default()).unwrap();
    /// zip.write_all(b"").unwrap();
    /// let bytes = zip.finish().unwrap();
    ///
    /// let members = ArchiveFormat::Wheel.list_members(bytes, Limits::default()).unwrap();
    /// assert_eq!(members[0].raw_path, "demo/__init__.py");
    /// ```
    #[instrument(skip(reader), fields(format = %self))]
    pub fn list_members<R: Read + Seek>(&self, reader: R, limits: Limits) -> Result<Vec<ManifestEntry>> {
        let mut budget = Budget::new(limits);
        let entries = match self {
            ArchiveFormat::Wheel | ArchiveFormat::Egg | ArchiveFormat::Zip => list_zip(reader, &mut budget)?,
            ArchiveFormat::TarGz => list_tar(MultiGzDecoder::new(reader), &mut budget)?,
            ArchiveFormat::TarBz2 => list_tar(MultiBzDecoder::new(reader), &mut budget)?,
            ArchiveFormat::TarXz => list_tar(XzDecoder::new(reader), &mut budget)?,
            ArchiveFormat::Tar => list_tar(reader, &mut budget)?,
        };
        tracing::debug!(members = entries.len(), bytes = budget.bytes, "Listed archive members");
        Ok(entries)
    }

    /// Read a single member into memory, refusing anything over `max_bytes`.
    ///
    /// Returns `Ok(None)` if the archive has no member with exactly that name.
    pub fn read_member<R: Read + Seek>(&self, reader: R, name: &str, max_bytes: u64) -> Result<Option<Vec<u8>>> {
        match self {
            ArchiveFormat::Wheel | ArchiveFormat::Egg | ArchiveFormat::Zip => read_zip_member(reader, name, max_bytes),
            ArchiveFormat::TarGz => read_tar_member(MultiGzDecoder::new(reader), name, max_bytes),
            ArchiveFormat::TarBz2 => read_tar_member(MultiBzDecoder::new(reader), name, max_bytes),
            ArchiveFormat::TarXz => read_tar_member(XzDecoder::new(reader), name, max_bytes),
            ArchiveFormat::Tar => read_tar_member(reader, name, max_bytes),
        }
    }
}

fn list_zip<R: Read + Seek>(reader: R, budget: &mut Budget) -> Result<Vec<ManifestEntry>> {
    let mut archive = ZipArchive::new(reader).or_raise(|| ErrorKind::InvalidData)?;
    // The central directory tells us up front; don't bother reading members.
    if archive.len() > budget.limits.max_entries {
        exn::bail!(ErrorKind::TooManyEntries(budget.limits.max_entries));
    }
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        budget.count_entry()?;
        let mut member = archive.by_index(index).or_raise(|| ErrorKind::InvalidData)?;
        let raw_path = member.name().to_string();
        if member.is_dir() {
            entries.push(ManifestEntry::regular(raw_path, 0).with_file_type(FileType::Directory));
            continue;
        }
        let file_type = match member.is_symlink() {
            true => FileType::Symlink,
            false => FileType::Regular,
        };
        let hashed = budget.hash(&mut member)?;
        entries.push(hashed.entry(raw_path).with_file_type(file_type));
    }
    Ok(entries)
}

fn list_tar<R: Read>(reader: R, budget: &mut Budget) -> Result<Vec<ManifestEntry>> {
    let mut archive = tar::Archive::new(reader);
    let mut entries = Vec::new();
    let mut hashed: HashMap<String, Hashed> = HashMap::new();
    for member in archive.entries().or_raise(|| ErrorKind::InvalidData)? {
        let mut member = member.or_raise(|| ErrorKind::InvalidData)?;
        budget.count_entry()?;
        let raw_path = String::from_utf8_lossy(&member.path_bytes()).into_owned();
        let entry = match member.header().entry_type() {
            EntryType::Directory => ManifestEntry::regular(raw_path, 0).with_file_type(FileType::Directory),
            EntryType::Regular | EntryType::Continuous => {
                let digests = budget.hash(&mut member)?;
                hashed.insert(raw_path.clone(), digests.clone());
                digests.entry(raw_path)
            },
            EntryType::Symlink => {
                let target = member.link_name_bytes().map(|t| t.into_owned()).unwrap_or_default();
                budget.hash(&mut target.as_slice())?.entry(raw_path).with_file_type(FileType::Symlink)
            },
            EntryType::Link => {
                let target = member.link_name_bytes().map(|t| String::from_utf8_lossy(&t).into_owned());
                match target.and_then(|t| hashed.get(&t).cloned()) {
                    Some(digests) => digests.entry(raw_path),
                    None => {
                        tracing::debug!(path = %raw_path, "Skipping hard link to unknown member");
                        continue;
                    },
                }
            },
            _ => continue,
        };
        entries.push(entry);
    }
    Ok(entries)
}

fn read_bounded(reader: &mut impl Read, max_bytes: u64) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    reader.take(max_bytes.saturating_add(1)).read_to_end(&mut buffer).or_raise(|| ErrorKind::InvalidData)?;
    if u64::try_from(buffer.len()).unwrap_or(u64::MAX) > max_bytes {
        exn::bail!(ErrorKind::TooLarge(max_bytes));
    }
    Ok(buffer)
}

fn read_zip_member<R: Read + Seek>(reader: R, name: &str, max_bytes: u64) -> Result<Option<Vec<u8>>> {
    let mut archive = ZipArchive::new(reader).or_raise(|| ErrorKind::InvalidData)?;
    let mut member = match archive.by_name(name) {
        Ok(member) => member,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err).or_raise(|| ErrorKind::InvalidData),
    };
    read_bounded(&mut member, max_bytes).map(Some)
}

fn read_tar_member<R: Read>(reader: R, name: &str, max_bytes: u64) -> Result<Option<Vec<u8>>> {
    let mut archive = tar::Archive::new(reader);
    for member in archive.entries().or_raise(|| ErrorKind::InvalidData)? {
        let mut member = member.or_raise(|| ErrorKind::InvalidData)?;
        if member.header().entry_type() == EntryType::Regular && *member.path_bytes() == *name.as_bytes() {
            return read_bounded(&mut member, max_bytes).map(Some);
        }
    }
    Ok(None)
}
