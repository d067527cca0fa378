//! Package and import name derivation.

use filedex_model::Ecosystem;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static NAME_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[-_.]+").unwrap());
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Top-level modules that are build or test scaffolding, not importable API.
const SCAFFOLDING: [&str; 4] = ["setup", "test", "tests", "conftest"];
/// Identifiers that are valid but never a distribution's import name.
const RESERVED: [&str; 2] = ["__init__", "__pycache__"];

/// Canonical form of a package name within its ecosystem.
///
/// For PyPI this is the PEP 503 normalization: lowercase, with runs of `-`,
/// `_` and `.` collapsed to a single `-`.
pub fn canonical_name(ecosystem: Ecosystem, name: &str) -> String {
    match ecosystem {
        Ecosystem::Pypi => NAME_SEPARATORS.replace_all(name.trim(), "-").to_lowercase(),
    }
}

/// Guess the top-level import names a set of normalized paths provides.
///
/// - `pkg/mod.py` and `pkg/_native.so` provide `pkg`;
/// - a top-level `mod.py` provides `mod`, unless it is build or test
///   scaffolding (`setup.py`, `tests.py`, ...);
/// - a top-level `_speedups.cpython-312-x86_64-linux-gnu.so` provides
///   `_speedups`;
/// - a leading `src/` layout directory is looked through;
/// - wheel `<name>.data/purelib/` and `.../platlib/` members are taken at
///   the path they install to.
///
/// Only valid Python identifiers are kept, so other data directories such as
/// `demo-1.0.data/scripts` never show up.
pub fn derive_import_names<'a>(paths: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    paths.into_iter().filter_map(import_name).collect()
}

/// Where a member lands in `site-packages`, as far as import names care.
fn installed_path(path: &str) -> &str {
    let path = match path.split_once('/') {
        Some((data, rest)) if data.ends_with(".data") => match rest.split_once('/') {
            Some(("purelib" | "platlib", installed)) => installed,
            _ => path,
        },
        _ => path,
    };
    // `src/__init__.py` is a package that really is called `src`.
    match path.strip_prefix("src/") {
        Some(rest) if !rest.is_empty() && rest != "__init__.py" => rest,
        _ => path,
    }
}

fn import_name(path: &str) -> Option<String> {
    let path = installed_path(path);
    let is_python = path.ends_with(".py");
    let is_native = path.ends_with(".so") || path.ends_with(".pyd");
    if !is_python && !is_native {
        return None;
    }
    let name = match path.split_once('/') {
        Some((first, _)) => first,
        None if is_python => {
            let stem = path.strip_suffix(".py").unwrap_or(path);
            if SCAFFOLDING.contains(&stem) {
                return None;
            }
            stem
        },
        None => path.split('.').next()?,
    };
    match IDENTIFIER.is_match(name) && !RESERVED.contains(&name) {
        true => Some(name.to_string()),
        false => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Django", "django")]
    #[case("zope.interface", "zope-interface")]
    #[case("Foo__Bar--baz..Qux", "foo-bar-baz-qux")]
    #[case("  requests ", "requests")]
    fn test_canonical_name(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(canonical_name(Ecosystem::Pypi, raw), expected);
    }

    #[rstest]
    #[case("demo/__init__.py", Some("demo"))]
    #[case("demo/sub/util.py", Some("demo"))]
    #[case("six.py", Some("six"))]
    #[case("src/demo/__init__.py", Some("demo"))]
    #[case("src/demo.py", Some("demo"))]
    #[case("src/_speedups.cpython-312-x86_64-linux-gnu.so", Some("_speedups"))]
    #[case("src/__init__.py", Some("src"))]
    #[case("demo-1.0.data/purelib/demo/__init__.py", Some("demo"))]
    #[case("demo-1.0.data/platlib/demo_native.cpython-312-x86_64-linux-gnu.so", Some("demo_native"))]
    #[case("demo-1.0.data/purelib/six.py", Some("six"))]
    #[case("demo-1.0.data/headers/demo.py", None)]
    #[case("_cffi_backend.cpython-312-x86_64-linux-gnu.so", Some("_cffi_backend"))]
    #[case("numpy/core/_multiarray.pyd", Some("numpy"))]
    #[case("setup.py", None)]
    #[case("tests.py", None)]
    #[case("conftest.py", None)]
    #[case("demo-1.0.data/scripts/run.py", None)]
    #[case("README.rst", None)]
    #[case("demo/data.json", None)]
    #[case("__init__.py", None)]
    fn test_import_name(#[case] path: &str, #[case] expected: Option<&str>) {
        assert_eq!(import_name(path).as_deref(), expected);
    }

    #[test]
    fn test_derive_import_names_dedupes() {
        let names = derive_import_names(["demo/__init__.py", "demo/util.py", "demo_cli.py", "setup.py"]);
        assert_eq!(names.into_iter().collect::<Vec<_>>(), ["demo", "demo_cli"]);
    }

    #[test]
    fn test_derive_import_names_wheel_data() {
        let names = derive_import_names([
            "demo-1.0.data/purelib/demo_extra/__init__.py",
            "demo-1.0.data/scripts/demo-cli",
            "demo-1.0.dist-info/RECORD",
            "src/demo_compat.py",
        ]);
        assert_eq!(names.into_iter().collect::<Vec<_>>(), ["demo_compat", "demo_extra"]);
    }
}
