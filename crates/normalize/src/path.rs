//! Archive path canonicalization.

use crate::SkipReason;

/// Canonicalize an archive-internal path.
///
/// Backslashes are treated as separators, redundant separators and `.`
/// segments are collapsed, leading `/` is dropped, and `..` pops the previous
/// segment. Case is preserved: Python module paths are case sensitive.
///
/// The function is total (every input maps to a path or a [`SkipReason`]),
/// deterministic and idempotent: the output never contains separators,
/// `.`/`..` segments or NUL bytes that a second pass could act on.
///
/// # Examples
///
/// ```
/// use filedex_normalize::{normalize_path, SkipReason};
///
/// assert_eq!(normalize_path("demo//sub/./mod.py").unwrap(), "demo/sub/mod.py");
/// assert_eq!(normalize_path(r"demo\sub\mod.py").unwrap(), "demo/sub/mod.py");
/// assert_eq!(normalize_path("demo/../other.py").unwrap(), "other.py");
/// assert_eq!(normalize_path("../etc/passwd"), Err(SkipReason::Traversal));
/// assert_eq!(normalize_path("./"), Err(SkipReason::Empty));
/// ```
pub fn normalize_path(raw: &str) -> Result<String, SkipReason> {
    // U+FFFD shows up when a non-UTF-8 member name was decoded lossily.
    if raw.contains(['\0', '\u{FFFD}']) {
        return Err(SkipReason::InvalidBytes);
    }
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split(['/', '\\']) {
        match segment {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    return Err(SkipReason::Traversal);
                }
            },
            segment => segments.push(segment),
        }
    }
    match segments.is_empty() {
        true => Err(SkipReason::Empty),
        false => Ok(segments.join("/")),
    }
}

/// Strip an archive-root wrapper directory from a normalized path.
///
/// Paths outside the wrapper are returned unchanged; the wrapper directory
/// itself normalizes to nothing and is reported as a directory.
pub fn strip_archive_root(path: &str, root: &str) -> Result<String, SkipReason> {
    if path == root {
        return Err(SkipReason::Directory);
    }
    match path.strip_prefix(root).and_then(|rest| rest.strip_prefix('/')) {
        Some(rest) => Ok(rest.to_string()),
        None => Ok(path.to_string()),
    }
}

/// Detect a single top-level directory that wraps every member.
///
/// Returns `None` if the members do not share a first segment, if any member
/// sits directly at the top level, or if there are no valid members at all.
pub fn common_root<'a>(paths: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut root: Option<String> = None;
    let mut nested = false;
    for raw in paths {
        let Ok(path) = normalize_path(raw) else {
            continue;
        };
        let (first, rest) = match path.split_once('/') {
            Some((first, rest)) => (first, Some(rest)),
            None => (path.as_str(), None),
        };
        match &root {
            Some(existing) if existing != first => return None,
            Some(_) => {},
            None => root = Some(first.to_string()),
        }
        // A bare top-level file (not the wrapper directory entry itself)
        // means there is no wrapper.
        if rest.is_none() && !raw.ends_with(['/', '\\']) {
            return None;
        }
        nested |= rest.is_some();
    }
    root.filter(|_| nested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("demo/__init__.py", "demo/__init__.py")]
    #[case("/demo/__init__.py", "demo/__init__.py")]
    #[case("demo//util.py", "demo/util.py")]
    #[case("./demo/./util.py", "demo/util.py")]
    #[case(r"demo\sub\util.py", "demo/sub/util.py")]
    #[case("demo/sub/../util.py", "demo/util.py")]
    #[case("demo/", "demo")]
    #[case("Demo/README.rst", "Demo/README.rst")]
    fn test_valid_paths(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_path(raw).unwrap(), expected);
    }

    #[rstest]
    #[case("../evil.py", SkipReason::Traversal)]
    #[case("demo/../../evil.py", SkipReason::Traversal)]
    #[case(r"..\evil.py", SkipReason::Traversal)]
    #[case("..", SkipReason::Traversal)]
    #[case("", SkipReason::Empty)]
    #[case(".", SkipReason::Empty)]
    #[case("//", SkipReason::Empty)]
    #[case("demo/..", SkipReason::Empty)]
    #[case("demo/a\0b.py", SkipReason::InvalidBytes)]
    #[case("demo/caf\u{FFFD}.py", SkipReason::InvalidBytes)]
    fn test_rejected_paths(#[case] raw: &str, #[case] reason: SkipReason) {
        assert_eq!(normalize_path(raw), Err(reason));
    }

    #[rstest]
    #[case("demo//sub/./mod.py")]
    #[case(r"\\server\share\..\x")]
    #[case("a/b/c/../../d/")]
    #[case("./././x")]
    #[case("x/./y/../../z/./")]
    #[case("é/ü\\ø")]
    fn test_normalization_is_idempotent(#[case] raw: &str) {
        let once = normalize_path(raw).unwrap();
        assert_eq!(normalize_path(&once).unwrap(), once);
    }

    #[test]
    fn test_strip_archive_root() {
        assert_eq!(strip_archive_root("demo-1.0/demo/x.py", "demo-1.0").unwrap(), "demo/x.py");
        assert_eq!(strip_archive_root("demo-1.0", "demo-1.0"), Err(SkipReason::Directory));
        assert_eq!(strip_archive_root("pax_global_header", "demo-1.0").unwrap(), "pax_global_header");
        // Prefix match must be on a segment boundary.
        assert_eq!(strip_archive_root("demo-1.0.1/x.py", "demo-1.0").unwrap(), "demo-1.0.1/x.py");
    }

    #[test]
    fn test_common_root() {
        assert_eq!(
            common_root(["demo-1.0/", "demo-1.0/setup.py", "demo-1.0/demo/__init__.py"]),
            Some("demo-1.0".to_string())
        );
        assert_eq!(common_root(["demo-1.0/setup.py", "other/x.py"]), None);
        assert_eq!(common_root(["demo-1.0/setup.py", "README"]), None);
        assert_eq!(common_root(["demo-1.0/"]), None);
        assert_eq!(common_root([]), None);
    }
}
