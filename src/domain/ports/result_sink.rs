use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::errors::SinkError;
use crate::domain::models::{Buckets, Config, PersistedResults};

/// Destination for partitioned results.
///
/// Whatever `persist` writes, `load` must return unchanged.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persist the three buckets together with the originating topic
    async fn persist(&self, buckets: &Buckets, topic: &str) -> Result<(), SinkError>;

    /// Read back the last persisted results
    async fn load(&self) -> Result<PersistedResults, SinkError>;

    /// Human-readable location, for logs
    fn location(&self) -> String;
}

/// Resolves the sink a run should write to from the configuration
/// snapshot taken when the run started.
pub trait SinkProvider: Send + Sync {
    fn sink_for(&self, config: &Config) -> Arc<dyn ResultSink>;
}
