//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::infrastructure::config::loader::PROJECT_DIR;

#[derive(Parser, Debug)]
#[command(name = "prismatic")]
#[command(about = "Prismatic - perspective gradient pipeline", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Project configuration directory
    #[arg(short, long, global = true, default_value = PROJECT_DIR)]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the run-control HTTP server
    Serve(ServeArgs),

    /// Run the pipeline once in this process and print the buckets
    Run(RunArgs),

    /// Child entry point: read a job on stdin, report events on stdout
    #[command(hide = true)]
    Pipeline,

    /// Check that the generation backend is reachable
    Probe,

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Host to bind (overrides server.host)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Topic to generate perspectives for (defaults to pipeline.topic)
    pub topic: Option<String>,

    /// Size of the representative subset (overrides pipeline.cluster_count)
    #[arg(short = 'k', long)]
    pub clusters: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Persist one value, e.g. `pipeline.cluster_count 10`
    Set {
        /// Dotted key path
        key: String,

        /// Value, parsed as JSON when possible, otherwise taken as a string
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from(["prismatic", "--json", "run", "tariffs", "-k", "10"])
            .unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, PathBuf::from(PROJECT_DIR));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.topic.as_deref(), Some("tariffs"));
                assert_eq!(args.clusters, Some(10));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_config_set_and_global_dir() {
        let cli = Cli::try_parse_from([
            "prismatic",
            "config",
            "set",
            "server.port",
            "9000",
            "--config",
            "/tmp/project",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/tmp/project"));
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigCommands::Set { ref key, ref value })
                if key == "server.port" && value == "9000"
        ));
    }

    #[test]
    fn test_pipeline_is_hidden_but_parses() {
        let cli = Cli::try_parse_from(["prismatic", "--config", "dir", "pipeline"]).unwrap();
        assert!(matches!(cli.command, Commands::Pipeline));
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["prismatic", "launch"]).is_err());
    }
}
