//! PyPI wire formats and artifact selection.
//!
//! Only the fields we use are modelled; everything else in the responses is
//! ignored by serde.

use filedex_archive::ArchiveFormat;
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Accept header for the PEP 691 JSON flavour of the simple index.
pub(crate) const SIMPLE_JSON: &str = "application/vnd.pypi.simple.v1+json";

/// `GET /simple/` (PEP 691).
#[derive(Debug, Deserialize)]
pub(crate) struct SimpleIndex {
    pub(crate) projects: Vec<SimpleProject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SimpleProject {
    pub(crate) name: String,
}

/// `GET /pypi/<project>/json`, describing the latest release.
#[derive(Debug, Deserialize)]
pub(crate) struct ProjectJson {
    pub(crate) info: ProjectInfo,
    /// Files of the latest release.
    #[serde(default)]
    pub(crate) urls: Vec<ReleaseFile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectInfo {
    pub(crate) name: String,
    pub(crate) version: String,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct ReleaseFile {
    pub(crate) filename: String,
    pub(crate) packagetype: String,
    #[serde(default)]
    pub(crate) python_version: Option<String>,
    #[serde(default)]
    pub(crate) digests: Digests,
    #[serde(default)]
    pub(crate) size: Option<u64>,
    pub(crate) url: String,
    #[serde(default)]
    pub(crate) upload_time_iso_8601: Option<String>,
    #[serde(default)]
    pub(crate) yanked: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct Digests {
    pub(crate) sha256: Option<String>,
}

impl ReleaseFile {
    /// How desirable this file is as the one artifact we index for a release.
    ///
    /// Pure-Python wheels list exactly what gets installed, so they win;
    /// CPython-specific wheels are a last resort because their contents
    /// depend on the build. Sdists rank below eggs.
    pub(crate) fn priority(&self) -> u8 {
        match self.packagetype.as_str() {
            "bdist_wheel" => match self.python_version.as_deref() {
                None => 5,
                Some(v) if v.contains("py2") => 6,
                Some(v) if v.contains("py3") => 7,
                Some(v) if v.contains("cp") => 1,
                Some(_) => 4,
            },
            "bdist_egg" => 3,
            "sdist" => 2,
            _ => 0,
        }
    }

    pub(crate) fn uploaded_at(&self) -> Option<OffsetDateTime> {
        self.upload_time_iso_8601.as_deref().and_then(|t| OffsetDateTime::parse(t, &Rfc3339).ok())
    }
}

/// Pick the highest-priority file we can actually read. Ties go to the file
/// listed first.
pub(crate) fn select_artifact(files: &[ReleaseFile]) -> Option<&ReleaseFile> {
    files
        .iter()
        .filter(|f| ArchiveFormat::from_filename(&f.filename).is_some())
        .fold(None, |best: Option<&ReleaseFile>, file| match best {
            Some(best) if best.priority() >= file.priority() => Some(best),
            _ => Some(file),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn file(filename: &str, packagetype: &str, python_version: Option<&str>) -> ReleaseFile {
        ReleaseFile {
            filename: filename.to_string(),
            packagetype: packagetype.to_string(),
            python_version: python_version.map(str::to_string),
            digests: Digests::default(),
            size: None,
            url: format!("https://files.example/{filename}"),
            upload_time_iso_8601: None,
            yanked: false,
        }
    }

    #[rstest]
    #[case("bdist_wheel", Some("py3"), 7)]
    #[case("bdist_wheel", Some("py2.py3"), 6)]
    #[case("bdist_wheel", None, 5)]
    #[case("bdist_wheel", Some("any"), 4)]
    #[case("bdist_wheel", Some("cp312"), 1)]
    #[case("bdist_egg", Some("2.7"), 3)]
    #[case("sdist", Some("source"), 2)]
    #[case("bdist_wininst", Some("any"), 0)]
    fn test_priority(#[case] packagetype: &str, #[case] python_version: Option<&str>, #[case] expected: u8) {
        assert_eq!(file("x", packagetype, python_version).priority(), expected);
    }

    #[test]
    fn test_select_prefers_pure_wheel() {
        let files = [
            file("demo-1.0.tar.gz", "sdist", Some("source")),
            file("demo-1.0-cp312-cp312-manylinux.whl", "bdist_wheel", Some("cp312")),
            file("demo-1.0-py3-none-any.whl", "bdist_wheel", Some("py3")),
        ];
        assert_eq!(select_artifact(&files).unwrap().filename, "demo-1.0-py3-none-any.whl");
    }

    #[test]
    fn test_select_ties_keep_first() {
        let files = [
            file("demo-1.0.tar.gz", "sdist", Some("source")),
            file("demo-1.0.zip", "sdist", Some("source")),
        ];
        assert_eq!(select_artifact(&files).unwrap().filename, "demo-1.0.tar.gz");
    }

    #[test]
    fn test_select_skips_unreadable() {
        let files = [file("demo-1.0.win32.exe", "bdist_wininst", Some("any"))];
        assert!(select_artifact(&files).is_none());
        assert!(select_artifact(&[]).is_none());
    }

    #[test]
    fn test_parse_project_json() {
        let json = r#"{
            "info": {"name": "Demo", "version": "1.0", "summary": "ignored"},
            "urls": [{
                "filename": "demo-1.0-py3-none-any.whl",
                "packagetype": "bdist_wheel",
                "python_version": "py3",
                "digests": {"md5": "x", "sha256": "abc"},
                "size": 1234,
                "url": "https://files.example/demo-1.0-py3-none-any.whl",
                "upload_time_iso_8601": "2024-01-02T03:04:05.123456Z",
                "yanked": false
            }]
        }"#;
        let project: ProjectJson = serde_json::from_str(json).unwrap();
        assert_eq!(project.info.version, "1.0");
        assert_eq!(project.urls[0].digests.sha256.as_deref(), Some("abc"));
        assert_eq!(project.urls[0].uploaded_at().unwrap().year(), 2024);
    }
}
