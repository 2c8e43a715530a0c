//! YAML-file backed [`ConfigStore`]

use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::loader::{ConfigLoader, CONFIG_FILE};
use crate::domain::errors::ConfigError;
use crate::domain::models::Config;
use crate::domain::ports::ConfigStore;

/// Configuration store rooted at a project directory
///
/// Reads go through the full figment layering; writes deep-merge the
/// partial update into `config.yaml` and replace that file atomically.
pub struct YamlConfigStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl YamlConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    async fn read_document(&self) -> Result<Value, ConfigError> {
        let path = self.config_path();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Value::Object(serde_json::Map::new()))
            }
            Err(e) => {
                return Err(ConfigError::Load(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        if content.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Load(format!("Failed to parse {}: {e}", path.display())))
    }
}

/// Recursively merge `patch` into `target`; objects merge, everything else replaces
pub fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if let Some(existing) = target.get_mut(&key) {
                    if existing.is_object() && value.is_object() {
                        deep_merge(existing, value);
                        continue;
                    }
                }
                target.insert(key, value);
            }
        }
        (target, patch) => *target = patch,
    }
}

/// Write `content` to `path` through a temp file in the same directory
fn replace_atomically(path: &Path, content: &str) -> Result<(), ConfigError> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .map_err(|e| ConfigError::Persist(format!("Failed to create {}: {e}", dir.display())))?;

    let mut file = NamedTempFile::new_in(dir)
        .map_err(|e| ConfigError::Persist(format!("Failed to create temp file: {e}")))?;
    file.write_all(content.as_bytes())
        .and_then(|()| file.as_file().sync_all())
        .map_err(|e| ConfigError::Persist(format!("Failed to write temp file: {e}")))?;
    file.persist(path)
        .map_err(|e| ConfigError::Persist(format!("Failed to replace {}: {e}", path.display())))?;
    Ok(())
}

#[async_trait]
impl ConfigStore for YamlConfigStore {
    async fn get(&self) -> Result<Config, ConfigError> {
        ConfigLoader::load_from_dir(&self.dir)
    }

    async fn set(&self, partial: Value) -> Result<Config, ConfigError> {
        if !partial.is_object() {
            return Err(ConfigError::InvalidUpdate(
                "expected an object of configuration sections".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;

        let mut document = self.read_document().await?;
        deep_merge(&mut document, partial);

        // Reject the update before anything touches disk
        let config = ConfigLoader::load_with_document(&self.dir, &document)?;

        let yaml = serde_yaml::to_string(&document)
            .map_err(|e| ConfigError::Persist(format!("Failed to serialize config: {e}")))?;
        let path = self.config_path();
        let target = path.clone();
        tokio::task::spawn_blocking(move || replace_atomically(&target, &yaml))
            .await
            .map_err(|e| ConfigError::Persist(format!("Config writer task failed: {e}")))??;

        info!(path = %path.display(), "Configuration updated");
        debug!(?config, "Effective configuration");
        Ok(config)
    }
}
