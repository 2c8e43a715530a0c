//! `prismatic serve`

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::adapters::http::{RunControlConfig, RunControlServer};
use crate::application::{ConfiguredRunner, InProcessRunner, StageOrchestrator, SubprocessRunner};
use crate::cli::types::ServeArgs;
use crate::domain::ports::{ConfigStore, TokioSleeper};
use crate::infrastructure::config::YamlConfigStore;
use crate::infrastructure::llama::LlamaBackendProvider;
use crate::infrastructure::sink::JsonSinkProvider;

/// Wire the orchestrator to its adapters
pub fn build_orchestrator(
    config_store: Arc<dyn ConfigStore>,
    config_dir: &Path,
) -> Result<StageOrchestrator> {
    let in_process = Arc::new(InProcessRunner::new(
        Arc::new(LlamaBackendProvider),
        Arc::new(TokioSleeper),
    ));
    let subprocess = Arc::new(SubprocessRunner::current_exe(config_dir)?);
    let runner = Arc::new(ConfiguredRunner::new(in_process, subprocess));

    Ok(StageOrchestrator::new(
        config_store,
        runner,
        Arc::new(JsonSinkProvider),
    ))
}

pub async fn execute(args: ServeArgs, config_dir: &Path) -> Result<()> {
    let store: Arc<dyn ConfigStore> = Arc::new(YamlConfigStore::new(config_dir));
    let config = store
        .get()
        .await
        .context("Failed to load configuration")?;

    let mut server_config = RunControlConfig::from(&config.server);
    if let Some(host) = args.host {
        server_config.host = host;
    }
    if let Some(port) = args.port {
        server_config.port = port;
    }

    let orchestrator = build_orchestrator(Arc::clone(&store), config_dir)?;
    let server = RunControlServer::new(orchestrator, store, server_config);

    server
        .serve_with_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
        })
        .await
}
