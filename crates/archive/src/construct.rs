use crate::ArchiveFormat;
use crate::error::{Error, ErrorKind};
use std::str::FromStr;

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const ZIP_EMPTY_MAGIC: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const BZIP2_MAGIC: [u8; 3] = [0x42, 0x5A, 0x68];
const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
const USTAR_MAGIC: &[u8] = b"ustar";
const USTAR_OFFSET: usize = 257;

/// Number of leading bytes needed to tell every supported format apart.
pub const MAGIC_BYTES_LEN: usize = USTAR_OFFSET + 5;

impl FromStr for ArchiveFormat {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "whl" | "wheel" => Ok(ArchiveFormat::Wheel),
            "egg" => Ok(ArchiveFormat::Egg),
            "zip" => Ok(ArchiveFormat::Zip),
            "tar.gz" | "tgz" => Ok(ArchiveFormat::TarGz),
            "tar.bz2" | "tbz2" | "tbz" => Ok(ArchiveFormat::TarBz2),
            "tar.xz" | "txz" => Ok(ArchiveFormat::TarXz),
            "tar" => Ok(ArchiveFormat::Tar),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(s.to_string())),
        }
    }
}

impl ArchiveFormat {
    /// Detect the archive format from an artifact filename.
    ///
    /// Returns `None` for anything that isn't a recognised archive extension
    /// (`.exe` installers, `.msi`, `.rpm`, ...).
    #[must_use]
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_lowercase();
        // Longest suffixes first so `.tar.gz` isn't mistaken for something else.
        let suffixes = ["tar.gz", "tar.bz2", "tar.xz", "tgz", "tbz2", "tbz", "txz", "tar", "whl", "egg", "zip"];
        suffixes
            .into_iter()
            .find(|suffix| lower.strip_suffix(suffix).is_some_and(|stem| stem.ends_with('.')))
            .and_then(|suffix| suffix.parse().ok())
    }

    /// Detect the container from magic bytes.
    ///
    /// Zip-based formats are all reported as [`Zip`](Self::Zip) and
    /// compressed streams are assumed to contain a tarball. Needs
    /// [`MAGIC_BYTES_LEN`] bytes to recognise an uncompressed tarball.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&ZIP_MAGIC) || bytes.starts_with(&ZIP_EMPTY_MAGIC) {
            return Some(ArchiveFormat::Zip);
        }
        if bytes.starts_with(&GZIP_MAGIC) {
            return Some(ArchiveFormat::TarGz);
        }
        if bytes.starts_with(&BZIP2_MAGIC) {
            return Some(ArchiveFormat::TarBz2);
        }
        if bytes.starts_with(&XZ_MAGIC) {
            return Some(ArchiveFormat::TarXz);
        }
        if bytes.get(USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len()) == Some(USTAR_MAGIC) {
            return Some(ArchiveFormat::Tar);
        }
        None
    }

    /// Verify that `bytes` start with the expected magic bytes for this format.
    ///
    /// Used to cross-check the format claimed by a filename against the
    /// downloaded contents. Pre-POSIX tarballs carry no magic at all, so a
    /// plain [`Tar`](Self::Tar) is accepted unless the bytes are positively
    /// identified as something else.
    #[must_use]
    pub fn check_magic_bytes(&self, bytes: &[u8]) -> bool {
        match (self, Self::from_magic_bytes(bytes)) {
            (ArchiveFormat::Tar, None) => true,
            (format, Some(ArchiveFormat::Zip)) => format.is_zip(),
            (format, Some(detected)) => *format == detected,
            (_, None) => false,
        }
    }
}
