mod file;
mod package;
mod summary;

pub(crate) use self::file::{FileRow, MatchRow};
pub(crate) use self::package::{NewPackageRow, PackageRow, timestamp};
pub use self::summary::{PrefixCursor, Stats, WriteSummary};
