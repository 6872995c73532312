use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "typetrail", version, about = "Keystroke history segmented by window and inactivity")]
pub struct Cli {
    /// Directory holding the database and settings.json
    #[arg(long, env = "TYPETRAIL_DATA_DIR", default_value = ".typetrail", global = true)]
    pub data_dir: PathBuf,

    /// Override the inactivity timeout (seconds) and save it to settings
    #[arg(long, global = true)]
    pub inactivity_timeout: Option<u64>,

    /// Override the retention period (seconds) and save it to settings
    #[arg(long, global = true)]
    pub retention_period: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Capture JSON-line events from stdin until EOF or Ctrl-C
    Run,
    /// Print the stored history as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Summarize stored buckets
    Stats {
        /// Sort buckets by name instead of recent activity
        #[arg(long)]
        by_name: bool,

        /// Also list every segment, newest first
        #[arg(long)]
        segments: bool,
    },
    /// Delete stored history
    Clear {
        /// Only clear this bucket id
        #[arg(long)]
        bucket: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_overrides_after_subcommand() {
        let cli = Cli::parse_from([
            "typetrail",
            "stats",
            "--by-name",
            "--inactivity-timeout",
            "60",
            "--data-dir",
            "/tmp/tt",
        ]);
        assert_eq!(cli.inactivity_timeout, Some(60));
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/tt"));
        assert!(matches!(
            cli.command,
            Command::Stats {
                by_name: true,
                segments: false
            }
        ));
    }
}
