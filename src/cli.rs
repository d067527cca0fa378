use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Reverse file index for PyPI: which package ships this file?
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: `config.toml` in the platform config directory).
    #[arg(short, long, global = true, env = "FILEDEX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Raise log verbosity (`-v` debug, `-vv` trace). `RUST_LOG` wins.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover new releases and ingest the backlog once. Ctrl-C stops
    /// cleanly, leaving unfinished packages for the next run.
    Crawl,
    /// Backlog size, failure counts and the discovery watermark.
    Status,
    /// Files with this content (`sha256:<hex>` or bare hex).
    Hash {
        hash: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Files whose path starts with a prefix.
    Prefix {
        prefix: String,
        #[arg(short, long)]
        limit: Option<usize>,
        /// Resume token printed as `next` by the previous page.
        #[arg(long)]
        after: Option<String>,
    },
    /// Every file of one release.
    Files { name: String, version: String },
    /// Packages providing a top-level import name.
    Import {
        name: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Put a release back in the backlog, whatever its current status.
    Requeue { name: String, version: String },
    /// Recompute import names from the stored file paths.
    RebuildImports,
    /// Fold the write-ahead log into the database file so it can be copied.
    Checkpoint,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case(&["filedex", "crawl"])]
    #[case(&["filedex", "-vv", "status"])]
    #[case(&["filedex", "hash", "sha256:abc", "--limit", "5"])]
    #[case(&["filedex", "prefix", "demo/", "--after", "{}"])]
    #[case(&["filedex", "files", "demo", "1.0"])]
    #[case(&["filedex", "import", "demo"])]
    #[case(&["filedex", "requeue", "demo", "1.0", "--config", "x.toml"])]
    #[case(&["filedex", "rebuild-imports"])]
    #[case(&["filedex", "checkpoint"])]
    fn test_parse(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_ok());
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::try_parse_from(["filedex", "-vv", "status"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Status));
    }
}
