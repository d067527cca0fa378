use crate::ArchiveFormat;
use std::fmt::{Display, Formatter, Result as FmtResult};

impl Display for ArchiveFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl ArchiveFormat {
    /// Returns the short name (for logging and displaying to user).
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveFormat::Wheel => "wheel",
            ArchiveFormat::Egg => "egg",
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarBz2 => "tar.bz2",
            ArchiveFormat::TarXz => "tar.xz",
            ArchiveFormat::Tar => "tar",
        }
    }

    /// Whether the format is a zip container (random access, central directory).
    #[inline]
    #[must_use]
    pub fn is_zip(&self) -> bool {
        matches!(self, ArchiveFormat::Wheel | ArchiveFormat::Egg | ArchiveFormat::Zip)
    }

    /// Whether members are conventionally wrapped in a `name-version/`
    /// directory. Built distributions (wheels, eggs) are laid out exactly as
    /// they install.
    #[inline]
    #[must_use]
    pub fn has_wrapper_dir(&self) -> bool {
        !matches!(self, ArchiveFormat::Wheel | ArchiveFormat::Egg)
    }
}
