mod cli;
mod error;

use crate::cli::{Cli, Command};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use filedex_config::Config;
use filedex_crawl::Coordinator;
use filedex_index::{Database, IndexStore, PrefixCursor, Stats};
use filedex_model::{Cursor, Ecosystem, PackageKey, PackageStatus};
use filedex_normalize::canonical_name;
use filedex_query::QueryEngine;
use filedex_source::PypiSource;
use serde::Serialize;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[derive(Serialize)]
struct StatusReport {
    packages: u64,
    #[serde(flatten)]
    stats: Stats,
    watermark: Option<Cursor>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:?}");
            ExitCode::FAILURE
        },
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder().with_default_directive(default.into()).from_env_lossy();
    // Logs go to stderr; stdout is reserved for JSON results.
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    if let Some(parent) = config.database.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Index)?;
    }
    let db = Database::connect(&config.database).await.or_raise(|| ErrorKind::Index)?;
    let result = dispatch(cli.command, &config, &db).await;
    db.close().await;
    result
}

async fn dispatch(command: Command, config: &Config, db: &Database) -> Result<()> {
    let store = IndexStore::from(db);
    let query = QueryEngine::new(store.clone(), config.query);
    match command {
        Command::Crawl => {
            let source = PypiSource::new(config.pypi_settings()).or_raise(|| ErrorKind::Source)?;
            let coordinator = Coordinator::new(Arc::new(source), store, config.crawl_settings());
            let cancel = CancellationToken::new();
            let signal = tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("Interrupted; stopping after in-flight work is released");
                        cancel.cancel();
                    }
                }
            });
            let report = coordinator.run_crawl_cycle(&cancel).await;
            signal.abort();
            print(&report.or_raise(|| ErrorKind::Crawl)?)
        },
        Command::Status => {
            let stats = store.stats().await.or_raise(|| ErrorKind::Index)?;
            let watermark = store.watermark(Ecosystem::Pypi).await.or_raise(|| ErrorKind::Index)?;
            print(&StatusReport { packages: stats.packages(), stats, watermark })
        },
        Command::Hash { hash, limit } => print(&query.by_hash(&hash, limit).await.or_raise(|| ErrorKind::Query)?),
        Command::Prefix { prefix, limit, after } => {
            let after: Option<PrefixCursor> = after
                .map(|token| serde_json::from_str(&token))
                .transpose()
                .or_raise(|| ErrorKind::Query)?;
            print(&query.by_prefix(&prefix, after.as_ref(), limit).await.or_raise(|| ErrorKind::Query)?)
        },
        Command::Files { name, version } => {
            let key = PackageKey::new(Ecosystem::Pypi, name, version);
            print(&query.package_files(&key).await.or_raise(|| ErrorKind::Query)?)
        },
        Command::Import { name, limit } => print(&query.by_import_name(&name, limit).await.or_raise(|| ErrorKind::Query)?),
        Command::Requeue { name, version } => {
            let key = PackageKey::new(Ecosystem::Pypi, canonical_name(Ecosystem::Pypi, &name), version);
            let Some(package) = store.get_package(&key).await.or_raise(|| ErrorKind::Index)? else {
                exn::bail!(ErrorKind::NotFound(key.to_string()));
            };
            store.mark_status(package.id, PackageStatus::Pending, None).await.or_raise(|| ErrorKind::Index)?;
            tracing::info!(package = %key, previous = package.status.as_str(), "Requeued package");
            Ok(())
        },
        Command::RebuildImports => {
            let rows = store.rebuild_import_names().await.or_raise(|| ErrorKind::Index)?;
            tracing::info!(rows, "Rebuilt import names");
            Ok(())
        },
        Command::Checkpoint => {
            let frames = db.checkpoint().await.or_raise(|| ErrorKind::Index)?;
            tracing::info!(frames, "Checkpointed write-ahead log");
            Ok(())
        },
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).or_raise(|| ErrorKind::Output)?;
    writeln!(stdout).or_raise(|| ErrorKind::Output)
}
