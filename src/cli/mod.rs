//! CLI module - Command-line interface for Subtitlarr
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Subtitlarr - Subtitle Acquisition Daemon
/// Finds videos without subtitles in the configured languages and fetches them
#[derive(Parser)]
#[command(name = "subtitlarr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run web server and scheduler (default)
    #[command(alias = "d")]
    Daemon,

    /// Run a single scan and download in the foreground
    #[command(alias = "r")]
    Run(LibraryOverrides),

    /// Show per-path counts of videos and missing subtitles
    #[command(alias = "s")]
    Scan(LibraryOverrides),

    /// Create default config file
    #[command(alias = "--init")]
    Init,
}

/// Replace the configured library for a single invocation.
#[derive(Args, Debug, Default, Clone)]
pub struct LibraryOverrides {
    /// Directory to search (repeatable)
    #[arg(long = "path", short = 'p')]
    pub paths: Vec<String>,

    /// Language code to look for (repeatable)
    #[arg(long = "lang", short = 'l')]
    pub languages: Vec<String>,
}

impl LibraryOverrides {
    pub fn apply(&self, config: &mut crate::config::Config) {
        if !self.paths.is_empty() {
            config.library.search_paths.clone_from(&self.paths);
        }
        if !self.languages.is_empty() {
            config.library.languages.clone_from(&self.languages);
        }
    }
}

pub use commands::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn no_subcommand_means_daemon() {
        let cli = Cli::try_parse_from(["subtitlarr"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn run_with_overrides() {
        let cli = Cli::try_parse_from([
            "subtitlarr",
            "run",
            "--path",
            "/media/tv",
            "--path",
            "/media/movies",
            "-l",
            "en",
            "--config",
            "/etc/subtitlarr.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/etc/subtitlarr.toml")));
        let Some(Commands::Run(overrides)) = cli.command else {
            panic!("expected run command");
        };

        let mut config = Config::default();
        config.library.languages = vec!["es".to_string()];
        overrides.apply(&mut config);
        assert_eq!(config.library.search_paths, vec!["/media/tv", "/media/movies"]);
        assert_eq!(config.library.languages, vec!["en"]);
    }

    #[test]
    fn empty_overrides_keep_config() {
        let mut config = Config::default();
        config.library.search_paths = vec!["/media".to_string()];
        LibraryOverrides::default().apply(&mut config);
        assert_eq!(config.library.search_paths, vec!["/media"]);
    }
}
