use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::ConfigError;
use crate::domain::models::Config;

/// Durable key-value configuration.
///
/// `set` applies a partial document (a nested JSON object whose keys
/// mirror [`Config`]) on top of what is stored and must replace the
/// persisted state atomically: a crash mid-write leaves the previous
/// configuration intact.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Current effective configuration
    async fn get(&self) -> Result<Config, ConfigError>;

    /// Merge `partial` into the stored configuration and return the result
    async fn set(&self, partial: Value) -> Result<Config, ConfigError>;
}
