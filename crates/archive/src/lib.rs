//! Streaming enumeration of package archives.
//!
//! This crate wraps the zip and tar readers behind a unified
//! [`ArchiveFormat`] enum, providing:
//!
//! - **Format detection** from artifact filenames ([`ArchiveFormat::from_filename`])
//!   cross-checked against magic bytes ([`ArchiveFormat::check_magic_bytes`])
//! - **Member listing** with SHA-256 and SHA-1 computed for every file while it is
//!   streamed out of the archive ([`ArchiveFormat::list_members`])
//! - **Single member reads** for small metadata files such as a wheel's
//!   `RECORD` ([`ArchiveFormat::read_member`])
//!
//! Archives are untrusted. Nothing is extracted to disk, no member is ever
//! held in memory in full (except by [`read_member`](ArchiveFormat::read_member),
//! which is size-capped), and both the member count and the total number of
//! decompressed bytes are bounded by [`Limits`].

mod construct;
pub mod error;
mod list;
mod util;

pub use crate::construct::MAGIC_BYTES_LEN;

/// A supported package archive format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// Python wheel (.whl), a zip with a `*.dist-info/RECORD`
    Wheel,
    /// Python egg (.egg), a zip
    Egg,
    /// Plain zip source distribution (.zip)
    Zip,
    /// Gzip-compressed tarball (.tar.gz, .tgz)
    TarGz,
    /// Bzip2-compressed tarball (.tar.bz2)
    TarBz2,
    /// XZ-compressed tarball (.tar.xz)
    TarXz,
    /// Uncompressed tarball (.tar)
    Tar,
}

/// Resource bounds applied while reading an archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of members (directories included).
    pub max_entries: usize,
    /// Maximum number of decompressed bytes read across all members.
    pub max_total_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_entries: 100_000, max_total_bytes: 4 * 1024 * 1024 * 1024 }
    }
}

#[cfg(test)]
mod tests {
    use crate::Limits;

    #[test]
    fn limits_default_are_nonzero() {
        let limits = Limits::default();
        assert!(limits.max_entries > 0);
        assert!(limits.max_total_bytes > 0);
    }
}
