//! Python Package Index adapter.
//!
//! Discovery walks the (sorted) project list from the PEP 691 JSON simple
//! index in batches, looking up the latest release of each project through
//! the JSON API. Once the list is exhausted the next call starts a new pass,
//! which is how new releases of already-seen projects get picked up.
//!
//! Only one artifact per release is indexed: the one [`api::select_artifact`]
//! ranks highest.

mod api;
mod manifest;

use crate::adapter::{Discovered, ReleaseStream, SourceAdapter};
use crate::error::{ErrorKind, HttpResultExt, Result};
use crate::pypi::api::{ProjectJson, SIMPLE_JSON, SimpleIndex, select_artifact};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use filedex_archive::{ArchiveFormat, Limits};
use filedex_model::{Artifact, Cursor, Ecosystem, Manifest, PackageKey, ReleaseRef};
use filedex_normalize::canonical_name;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use sha2::{Digest, Sha256};
use std::io::{Seek, SeekFrom};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use url::Url;

/// Settings for [`PypiSource`].
#[derive(Clone, Debug)]
pub struct PypiSettings {
    /// Base URL serving `/simple/` and `/pypi/<project>/json`.
    pub index_url: String,
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// Whole-request timeout, including the artifact body.
    pub timeout: Duration,
    /// Projects looked at per [`discover()`](SourceAdapter::discover) call.
    pub discovery_batch: usize,
    /// Artifacts larger than this are refused before (or while) downloading.
    pub max_artifact_bytes: u64,
    /// Cap on the wheel `RECORD` file.
    pub max_record_bytes: u64,
    pub limits: Limits,
}

impl Default for PypiSettings {
    fn default() -> Self {
        Self {
            index_url: "https://pypi.org/".to_string(),
            user_agent: concat!("filedex/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout: Duration::from_secs(15),
            timeout: Duration::from_secs(900),
            discovery_batch: 500,
            max_artifact_bytes: 512 * 1024 * 1024,
            max_record_bytes: 16 * 1024 * 1024,
            limits: Limits::default(),
        }
    }
}

/// Where discovery stopped: which pass over the project list, and the last
/// project looked at in it. Serialized as `<pass>:<project>`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
struct Position {
    pass: u64,
    last: Option<String>,
}

impl Position {
    fn parse(cursor: Option<&Cursor>) -> Self {
        let Some(cursor) = cursor else {
            return Self::default();
        };
        match cursor.as_str().split_once(':').and_then(|(pass, last)| Some((pass.parse().ok()?, last))) {
            Some((pass, last)) => Self { pass, last: Some(last.to_string()).filter(|l| !l.is_empty()) },
            None => {
                tracing::warn!(%cursor, "Unrecognised PyPI cursor; starting a new pass");
                Self::default()
            },
        }
    }

    fn cursor(&self) -> Cursor {
        Cursor(format!("{}:{}", self.pass, self.last.as_deref().unwrap_or_default()))
    }

    /// Index of the first project still to look at in this pass, rolling
    /// over to a fresh pass once the list is exhausted.
    fn resume(&self, projects: &[String]) -> (u64, usize) {
        let start = match &self.last {
            Some(last) => projects.partition_point(|p| p.as_str() <= last.as_str()),
            None => 0,
        };
        match start >= projects.len() && self.last.is_some() {
            true => (self.pass + 1, 0),
            false => (self.pass, start),
        }
    }
}

/// Adapter for the Python Package Index (or any mirror speaking the same
/// JSON APIs).
pub struct PypiSource {
    client: reqwest::Client,
    base: Url,
    settings: PypiSettings,
}

impl PypiSource {
    pub fn new(settings: PypiSettings) -> Result<Self> {
        let mut base = Url::parse(&settings.index_url).or_raise(|| ErrorKind::Configuration)?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let client = reqwest::Client::builder()
            .user_agent(&settings.user_agent)
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.timeout)
            .build()
            .or_raise(|| ErrorKind::Configuration)?;
        Ok(Self { client, base, settings })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base.join(path).or_raise(|| ErrorKind::Configuration)
    }

    /// Every project on the index, canonicalized and sorted.
    #[instrument(skip(self))]
    async fn list_projects(&self) -> Result<Vec<String>> {
        let index: SimpleIndex = self
            .client
            .get(self.url("simple/")?)
            .header(ACCEPT, SIMPLE_JSON)
            .send()
            .await
            .or_raise_http()?
            .error_for_status()
            .or_raise_http()?
            .json()
            .await
            .or_raise_http()?;
        let mut projects: Vec<String> =
            index.projects.into_iter().map(|p| canonical_name(Ecosystem::Pypi, &p.name)).collect();
        projects.sort_unstable();
        projects.dedup();
        tracing::debug!(projects = projects.len(), "Fetched PyPI project list");
        Ok(projects)
    }

    /// The latest release of a project, if it has a readable artifact.
    ///
    /// A project that disappeared between listing and lookup is `Ok(None)`.
    #[instrument(skip(self))]
    async fn latest_release(&self, project: &str) -> Result<Option<ReleaseRef>> {
        let response = self.client.get(self.url(&format!("pypi/{project}/json"))?).send().await.or_raise_http()?;
        let project_json: ProjectJson = match response.error_for_status() {
            Ok(response) => response.json().await.or_raise_http()?,
            Err(err) if err.status().is_some_and(|s| s.as_u16() == 404) => {
                tracing::warn!(project, "Project has been removed from PyPI");
                return Ok(None);
            },
            Err(err) => return Err(err).or_raise_http(),
        };
        let Some(file) = select_artifact(&project_json.urls) else {
            tracing::debug!(project, version = %project_json.info.version, "No readable artifact in latest release");
            return Ok(None);
        };
        let name = canonical_name(Ecosystem::Pypi, &project_json.info.name);
        Ok(Some(ReleaseRef {
            key: PackageKey::new(Ecosystem::Pypi, name, project_json.info.version.clone()),
            url: file.url.clone(),
            artifact: Artifact {
                filename: file.filename.clone(),
                sha256: file.digests.sha256.as_ref().map(|d| d.to_ascii_lowercase()),
                size: file.size,
            },
            released_at: file.uploaded_at(),
            yanked: file.yanked,
        }))
    }

    /// Stream the artifact into an anonymous temporary file, hashing as it
    /// arrives. The returned file is rewound and ready to read.
    #[instrument(skip(self, release), fields(package = %release.key, artifact = %release.artifact.filename))]
    async fn download(&self, release: &ReleaseRef) -> Result<std::fs::File> {
        let max = self.settings.max_artifact_bytes;
        let response = self.client.get(&release.url).send().await.or_raise_http()?.error_for_status().or_raise_http()?;
        if let Some(length) = response.content_length()
            && length > max
        {
            exn::bail!(ErrorKind::TooLarge);
        }
        let mut file = tokio::fs::File::from_std(tempfile::tempfile().or_raise(|| ErrorKind::Io)?);
        let mut hasher = Sha256::new();
        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.or_raise_http()?;
            written += chunk.len() as u64;
            if written > max {
                exn::bail!(ErrorKind::TooLarge);
            }
            hasher.update(&chunk);
            file.write_all(&chunk).await.or_raise(|| ErrorKind::Io)?;
        }
        file.flush().await.or_raise(|| ErrorKind::Io)?;
        if let Some(expected) = &release.artifact.sha256 {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                tracing::warn!(%expected, %actual, bytes = written, "Downloaded artifact does not match upstream digest");
                exn::bail!(ErrorKind::DigestMismatch);
            }
        }
        let mut file = file.into_std().await;
        file.seek(SeekFrom::Start(0)).or_raise(|| ErrorKind::Io)?;
        tracing::debug!(bytes = written, "Downloaded artifact");
        Ok(file)
    }
}

#[async_trait]
impl SourceAdapter for PypiSource {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Pypi
    }

    fn discover<'a>(&'a self, cursor: Option<&'a Cursor>) -> ReleaseStream<'a> {
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        Box::pin(stream!({
            let projects = match self.list_projects().await {
                Ok(projects) => projects,
                Err(err) => {
                    yield Err(err);
                    return;
                },
            };
            let (pass, start) = Position::parse(cursor).resume(&projects);
            for project in projects.iter().skip(start).take(self.settings.discovery_batch) {
                let position = Position { pass, last: Some(project.clone()) };
                match self.latest_release(project).await {
                    Ok(release) => yield Ok(Discovered { release, cursor: position.cursor() }),
                    // One broken project must not wedge discovery forever.
                    Err(err) if !err.is_retryable() => {
                        tracing::warn!(project, error = %*err, "Skipping project with unusable metadata");
                        yield Ok(Discovered { release: None, cursor: position.cursor() });
                    },
                    Err(err) => {
                        yield Err(err);
                        return;
                    },
                }
            }
        }))
    }

    async fn fetch_manifest(&self, release: &ReleaseRef) -> Result<Manifest> {
        let Some(format) = ArchiveFormat::from_filename(&release.artifact.filename) else {
            exn::bail!(ErrorKind::Unsupported(release.artifact.filename.clone()));
        };
        if let Some(size) = release.artifact.size
            && size > self.settings.max_artifact_bytes
        {
            exn::bail!(ErrorKind::TooLarge);
        }
        let file = self.download(release).await?;
        let limits = self.settings.limits;
        let max_record_bytes = self.settings.max_record_bytes;
        tokio::task::spawn_blocking(move || manifest::build_manifest(file, format, limits, max_record_bytes))
            .await
            .or_raise(|| ErrorKind::Io)?
    }
}
