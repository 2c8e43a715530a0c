//! `prismatic probe`

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::cli::output::{output, CommandOutput};
use crate::domain::ports::TokioSleeper;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::llama::LlamaServerBackend;
use crate::services::ResilientGenerationClient;

#[derive(Debug, Serialize)]
pub struct ProbeOutput {
    pub base_url: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandOutput for ProbeOutput {
    fn to_human(&self) -> String {
        match &self.error {
            None => format!("Backend at {} is reachable", self.base_url),
            Some(error) => format!("Backend at {} is not reachable: {error}", self.base_url),
        }
    }
}

pub async fn execute(config_dir: &Path, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load_from_dir(config_dir)?;
    let backend = LlamaServerBackend::from_config(&config.backend)?;
    let base_url = backend.base_url().to_string();

    let client = ResilientGenerationClient::from_config(
        Arc::new(backend),
        Arc::new(TokioSleeper),
        &config,
    );
    let result = client.ensure_ready().await;

    output(
        &ProbeOutput {
            base_url,
            reachable: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
        },
        json_mode,
    );

    result.map_err(Into::into)
}
