//! `prismatic config show|set`

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

use crate::cli::output::{output, CommandOutput};
use crate::cli::types::ConfigCommands;
use crate::domain::models::Config;
use crate::domain::ports::ConfigStore;
use crate::infrastructure::config::YamlConfigStore;

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    pub path: String,
    pub config: Config,
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        let yaml = serde_yaml::to_string(&self.config)
            .unwrap_or_else(|e| format!("<failed to render configuration: {e}>"));
        format!("# {}\n{yaml}", self.path)
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

/// Turn `a.b.c` and a raw value into `{"a": {"b": {"c": value}}}`
///
/// The value is parsed as JSON when it is valid JSON (numbers, booleans,
/// arrays, quoted strings) and kept as a plain string otherwise.
pub fn partial_update(key: &str, raw: &str) -> Result<Value> {
    let segments: Vec<&str> = key.split('.').map(str::trim).collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        bail!("Invalid configuration key '{key}'");
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok(segments.iter().rev().fold(value, |acc, segment| {
        let mut object = serde_json::Map::new();
        object.insert((*segment).to_string(), acc);
        Value::Object(object)
    }))
}

pub async fn execute(command: ConfigCommands, config_dir: &Path, json_mode: bool) -> Result<()> {
    let store = YamlConfigStore::new(config_dir);
    let config = match command {
        ConfigCommands::Show => store.get().await?,
        ConfigCommands::Set { key, value } => store.set(partial_update(&key, &value)?).await?,
    };

    output(
        &ConfigOutput {
            path: store.config_path().display().to_string(),
            config,
        },
        json_mode,
    );
    Ok(())
}
