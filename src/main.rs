//! Prismatic CLI entry point.

use clap::Parser;

use prismatic::cli::{commands, handle_error, Cli, Commands};
use prismatic::infrastructure::config::ConfigLoader;
use prismatic::infrastructure::logging::{LogConfig, LoggerImpl};

/// Install the global subscriber from the project configuration
///
/// Falls back to defaults when the configuration cannot be loaded, so
/// that the command itself can report the problem.
fn init_logging(cli: &Cli) -> Option<LoggerImpl> {
    let log_config = ConfigLoader::load_from_dir(&cli.config)
        .ok()
        .and_then(|config| LogConfig::try_from(&config.logging).ok())
        .unwrap_or_default();

    match LoggerImpl::init(&log_config) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {err:#}");
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let logger = init_logging(&cli);

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::execute(args, &cli.config).await,
        Commands::Run(args) => commands::run::execute(args, &cli.config, cli.json).await,
        Commands::Pipeline => commands::pipeline::execute().await,
        Commands::Probe => commands::probe::execute(&cli.config, cli.json).await,
        Commands::Config(command) => {
            commands::config::execute(command, &cli.config, cli.json).await
        }
    };

    if let Err(err) = result {
        handle_error(&err, cli.json);
        drop(logger);
        std::process::exit(1);
    }
}
