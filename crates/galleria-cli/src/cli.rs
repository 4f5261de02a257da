//! Command-line arguments.

use clap::{Args, Parser, Subcommand, ValueEnum};
use galleria_core::config::{EngineConfig, PathsConfig};
use galleria_core::{ExecutionMode, LayoutConvention};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "galleria", version)]
#[command(about = "Reconcile and migrate a downloaded artwork catalog")]
pub struct Cli {
    /// SQLite catalog
    #[arg(long, global = true, default_value = "db.sqlite")]
    pub database: PathBuf,

    /// Storage root holding the downloaded files
    #[arg(long, global = true, default_value = "/workdir/downloads")]
    pub root_dir: PathBuf,

    /// Prefix of artifact directories in the flat layout (e.g. "pixiv_")
    #[arg(long, global = true, default_value = "")]
    pub artifact_dir_prefix: String,

    /// Log file (default: galleria_<command>_<timestamp>.log)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile the catalog with the storage root and write a report
    Validate {
        #[arg(long, default_value = PathsConfig::REPORT_FILENAME)]
        report: PathBuf,

        /// Match empty directories by name substring instead of by path
        #[arg(long)]
        substring_dir_match: bool,

        /// Do not open archives; archived pages are assumed present
        #[arg(long)]
        skip_archive_listing: bool,
    },

    /// Remove orphans and incomplete downloads listed in a report
    Cleanup {
        #[arg(long, default_value = PathsConfig::REPORT_FILENAME)]
        report: PathBuf,

        #[command(flatten)]
        commit: CommitArgs,
    },

    /// Move every artifact from one storage layout to another
    Migrate {
        #[arg(long, value_enum)]
        from: Layout,

        #[arg(long, value_enum)]
        to: Layout,

        #[command(flatten)]
        commit: CommitArgs,
    },

    /// Point catalog paths recorded with a legacy extension at the current file
    RewriteExtensions {
        #[command(flatten)]
        commit: CommitArgs,
    },

    /// Remove empty directories under the storage root
    RemoveEmptyDirs {
        #[command(flatten)]
        commit: CommitArgs,
    },

    /// Check every recorded path and archive member
    Verify,
}

impl Command {
    /// Short name used in the default log file name.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Validate { .. } => "validate",
            Command::Cleanup { .. } => "cleanup",
            Command::Migrate { .. } => "migrate",
            Command::RewriteExtensions { .. } => "rewrite_extensions",
            Command::RemoveEmptyDirs { .. } => "remove_empty_dirs",
            Command::Verify => "verify",
        }
    }
}

#[derive(Args, Debug, Clone, Copy)]
pub struct CommitArgs {
    /// Actually perform the changes (MAKE SURE YOU KNOW WHAT YOU ARE DOING)
    #[arg(long)]
    pub commit: bool,

    /// Seconds to wait, cancellable with Ctrl+C, before committing
    #[arg(long, default_value_t = EngineConfig::COMMIT_COUNTDOWN.as_secs())]
    pub countdown_secs: u64,
}

impl CommitArgs {
    pub fn mode(&self) -> ExecutionMode {
        if self.commit {
            ExecutionMode::Commit
        } else {
            ExecutionMode::DryRun
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Nested,
    Flat,
    Archive,
}

impl From<Layout> for LayoutConvention {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Nested => LayoutConvention::Nested,
            Layout::Flat => LayoutConvention::Flat,
            Layout::Archive => LayoutConvention::Archive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_is_default() {
        let cli = Cli::try_parse_from(["galleria", "cleanup"]).unwrap();
        match cli.command {
            Command::Cleanup { commit, report } => {
                assert_eq!(commit.mode(), ExecutionMode::DryRun);
                assert_eq!(commit.countdown_secs, 20);
                assert_eq!(report, PathBuf::from("validation_result.json"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_migrate_arguments() {
        let cli = Cli::try_parse_from([
            "galleria",
            "--root-dir",
            "/data",
            "migrate",
            "--from",
            "flat",
            "--to",
            "archive",
            "--commit",
            "--countdown-secs",
            "0",
            "--artifact-dir-prefix",
            "pixiv_",
        ])
        .unwrap();

        assert_eq!(cli.root_dir, PathBuf::from("/data"));
        assert_eq!(cli.artifact_dir_prefix, "pixiv_");
        match cli.command {
            Command::Migrate { from, to, commit } => {
                assert_eq!(LayoutConvention::from(from), LayoutConvention::Flat);
                assert_eq!(LayoutConvention::from(to), LayoutConvention::Archive);
                assert_eq!(commit.mode(), ExecutionMode::Commit);
                assert_eq!(commit.countdown_secs, 0);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_layout_rejected() {
        let result =
            Cli::try_parse_from(["galleria", "migrate", "--from", "tarball", "--to", "archive"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_command_names() {
        let cli = Cli::try_parse_from(["galleria", "remove-empty-dirs"]).unwrap();
        assert_eq!(cli.command.name(), "remove_empty_dirs");
    }
}
