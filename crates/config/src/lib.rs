//! Layered configuration for the `filedex` binary.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults.
//! 2. A config file: `--config <path>`, or `config.toml` in the platform
//!    config directory if present. `.yaml`/`.yml` and `.json` files are read
//!    as such; anything else is TOML.
//! 3. Environment variables prefixed `FILEDEX_`, with `__` separating nested
//!    keys (`FILEDEX_CRAWL__CONCURRENCY=10`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use filedex_crawl::CrawlSettings;
use filedex_query::QueryLimits;
use filedex_source::{Limits, PypiSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "FILEDEX_";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file.
    pub database: PathBuf,
    pub source: SourceConfig,
    pub crawl: CrawlConfig,
    pub query: QueryLimits,
}

/// Upstream access for the PyPI adapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub index_url: String,
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub discovery_batch: usize,
    pub max_artifact_bytes: u64,
    /// Archive members (directories included) before an artifact is refused.
    pub max_entries: usize,
    /// Decompressed bytes read from one archive before it is refused.
    pub max_uncompressed_bytes: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
    pub backlog_limit: usize,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "filedex")
}

impl Default for Config {
    fn default() -> Self {
        let database = project_dirs()
            .map(|dirs| dirs.data_dir().join("index.db"))
            .unwrap_or_else(|| PathBuf::from("filedex.db"));
        Self {
            database,
            source: SourceConfig::default(),
            crawl: CrawlConfig::default(),
            query: QueryLimits::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        let pypi = PypiSettings::default();
        Self {
            index_url: pypi.index_url,
            user_agent: pypi.user_agent,
            connect_timeout_secs: pypi.connect_timeout.as_secs(),
            timeout_secs: pypi.timeout.as_secs(),
            discovery_batch: pypi.discovery_batch,
            max_artifact_bytes: pypi.max_artifact_bytes,
            max_entries: pypi.limits.max_entries,
            max_uncompressed_bytes: pypi.limits.max_total_bytes,
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        let crawl = CrawlSettings::default();
        Self {
            concurrency: crawl.concurrency,
            max_attempts: crawl.max_attempts,
            backoff_min_ms: u64::try_from(crawl.backoff_min.as_millis()).unwrap_or(u64::MAX),
            backoff_max_ms: u64::try_from(crawl.backoff_max.as_millis()).unwrap_or(u64::MAX),
            backlog_limit: crawl.backlog_limit,
        }
    }
}

impl Config {
    /// Where the config file is looked for when none is given.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load, merge and validate every configuration source.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path
            && !path.is_file()
        {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        let file = path.map(Path::to_path_buf).or_else(Self::default_path);
        Self::from_figment(Self::figment(file.as_deref()))
    }

    /// The layered sources, unextracted.
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            tracing::debug!(path = %file.display(), "Reading config file");
            figment = match file.extension().and_then(|e| e.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => figment.merge(Toml::file(file)),
            };
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |message: &str| Err(exn::Exn::from(ErrorKind::Invalid(message.to_string())));
        if self.crawl.concurrency == 0 {
            return invalid("crawl.concurrency must be at least 1");
        }
        if self.crawl.max_attempts == 0 {
            return invalid("crawl.max_attempts must be at least 1");
        }
        if self.crawl.backoff_min_ms == 0 || self.crawl.backoff_min_ms > self.crawl.backoff_max_ms {
            return invalid("crawl.backoff_min_ms must be between 1 and crawl.backoff_max_ms");
        }
        if self.query.default_limit == 0 || self.query.max_limit == 0 {
            return invalid("query limits must be greater than 0");
        }
        if self.query.default_limit > self.query.max_limit {
            return invalid("query.default_limit must not exceed query.max_limit");
        }
        if self.source.discovery_batch == 0 {
            return invalid("source.discovery_batch must be at least 1");
        }
        Ok(())
    }

    pub fn pypi_settings(&self) -> PypiSettings {
        let source = &self.source;
        PypiSettings {
            index_url: source.index_url.clone(),
            user_agent: source.user_agent.clone(),
            connect_timeout: Duration::from_secs(source.connect_timeout_secs),
            timeout: Duration::from_secs(source.timeout_secs),
            discovery_batch: source.discovery_batch,
            max_artifact_bytes: source.max_artifact_bytes,
            limits: Limits { max_entries: source.max_entries, max_total_bytes: source.max_uncompressed_bytes },
            ..PypiSettings::default()
        }
    }

    pub fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            concurrency: self.crawl.concurrency,
            max_attempts: self.crawl.max_attempts,
            backoff_min: Duration::from_millis(self.crawl.backoff_min_ms),
            backoff_max: Duration::from_millis(self.crawl.backoff_max_ms),
            backlog_limit: self.crawl.backlog_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::from_figment(Figment::from(Serialized::defaults(Config::default()))).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.crawl_settings().concurrency, CrawlSettings::default().concurrency);
        assert_eq!(config.pypi_settings().index_url, PypiSettings::default().index_url);
        assert_eq!(config.query.min_prefix_len, 3);
    }

    #[test]
    fn test_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "filedex.toml",
                r#"
                    database = "/tmp/filedex.db"
                    [crawl]
                    concurrency = 2
                    max_attempts = 7
                "#,
            )?;
            jail.set_env("FILEDEX_CRAWL__CONCURRENCY", "9");
            jail.set_env("FILEDEX_SOURCE__INDEX_URL", "https://mirror.example/");

            let config = Config::load(Some(Path::new("filedex.toml"))).unwrap();
            assert_eq!(config.database, PathBuf::from("/tmp/filedex.db"));
            assert_eq!(config.crawl.concurrency, 9);
            assert_eq!(config.crawl.max_attempts, 7);
            assert_eq!(config.crawl.backlog_limit, CrawlConfig::default().backlog_limit);
            assert_eq!(config.pypi_settings().index_url, "https://mirror.example/");
            Ok(())
        });
    }

    #[test]
    fn test_yaml_file() {
        Jail::expect_with(|jail| {
            jail.create_file("filedex.yaml", "query:\n  default_limit: 10\n  max_limit: 20\n  min_prefix_len: 1\n")?;
            let config = Config::load(Some(Path::new("filedex.yaml"))).unwrap();
            assert_eq!(config.query, QueryLimits { default_limit: 10, max_limit: 20, min_prefix_len: 1 });
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = Config::load(Some(&path)).unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound(path));
    }

    #[test]
    fn test_parse_error() {
        let figment = Config::figment(None).merge(Serialized::default("crawl.concurrency", "lots"));
        let err = Config::from_figment(figment).unwrap_err();
        assert_eq!(*err, ErrorKind::Parse);
    }

    #[rstest]
    #[case::no_concurrency("crawl.concurrency", 0)]
    #[case::no_attempts("crawl.max_attempts", 0)]
    #[case::zero_backoff("crawl.backoff_min_ms", 0)]
    #[case::inverted_backoff("crawl.backoff_min_ms", 10_000_000)]
    #[case::no_default_limit("query.default_limit", 0)]
    #[case::no_max_limit("query.max_limit", 0)]
    #[case::default_above_max("query.default_limit", 1_000_000)]
    #[case::no_batch("source.discovery_batch", 0)]
    fn test_validation(#[case] key: &str, #[case] value: u64) {
        let figment = Figment::from(Serialized::defaults(Config::default())).merge(Serialized::default(key, value));
        let err = Config::from_figment(figment).unwrap_err();
        assert!(matches!(*err, ErrorKind::Invalid(_)), "{key} = {value} should be rejected");
    }

    #[test]
    fn test_settings_conversion() {
        let mut config = Config::default();
        config.crawl.backoff_min_ms = 250;
        config.source.max_entries = 42;
        config.source.timeout_secs = 30;
        assert_eq!(config.crawl_settings().backoff_min, Duration::from_millis(250));
        let pypi = config.pypi_settings();
        assert_eq!(pypi.limits.max_entries, 42);
        assert_eq!(pypi.timeout, Duration::from_secs(30));
        assert_eq!(pypi.max_record_bytes, PypiSettings::default().max_record_bytes);
    }
}
