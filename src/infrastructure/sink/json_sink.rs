//! JSON-file result sink
//!
//! Layout of the results directory:
//!
//! - `low.json`, `mid.json`, `high.json`: one bucket each, a JSON array of points
//! - `results.json`: topic, all three buckets and the write timestamp
//!
//! Bucket files depend only on their points, so rerunning with the same
//! input reproduces them byte for byte.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::domain::errors::SinkError;
use crate::domain::models::{BucketLabel, Buckets, Config, PersistedResults};
use crate::domain::ports::{ResultSink, SinkProvider};

/// Combined results document
pub const RESULTS_FILE: &str = "results.json";

/// Result sink writing JSON files into one directory
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of one bucket file
    pub fn bucket_path(&self, label: BucketLabel) -> PathBuf {
        self.dir.join(format!("{label}.json"))
    }

    pub fn results_path(&self) -> PathBuf {
        self.dir.join(RESULTS_FILE)
    }

    fn write_all(&self, results: &PersistedResults) -> Result<(), SinkError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            SinkError::Io(format!("failed to create {}: {e}", self.dir.display()))
        })?;

        for label in BucketLabel::ALL {
            let content = serde_json::to_string_pretty(results.buckets.get(label))
                .map_err(|e| SinkError::Io(format!("failed to encode {label} bucket: {e}")))?;
            write_atomically(&self.dir, &self.bucket_path(label), &content)?;
        }

        // Written last: its presence means the bucket files are complete
        let content = serde_json::to_string_pretty(results)
            .map_err(|e| SinkError::Io(format!("failed to encode results: {e}")))?;
        write_atomically(&self.dir, &self.results_path(), &content)
    }
}

fn write_atomically(dir: &Path, path: &Path, content: &str) -> Result<(), SinkError> {
    let mut file = NamedTempFile::new_in(dir)
        .map_err(|e| SinkError::Io(format!("failed to create temp file: {e}")))?;
    file.write_all(content.as_bytes())
        .and_then(|()| file.write_all(b"\n"))
        .and_then(|()| file.as_file().sync_all())
        .map_err(|e| SinkError::Io(format!("failed to write temp file: {e}")))?;
    file.persist(path)
        .map_err(|e| SinkError::Io(format!("failed to replace {}: {e}", path.display())))?;
    debug!(path = %path.display(), "Wrote result file");
    Ok(())
}

#[async_trait]
impl ResultSink for JsonFileSink {
    async fn persist(&self, buckets: &Buckets, topic: &str) -> Result<(), SinkError> {
        let results = PersistedResults {
            topic: topic.to_string(),
            buckets: buckets.clone(),
            generated_at: chrono::Utc::now(),
        };

        let sink = self.clone();
        tokio::task::spawn_blocking(move || sink.write_all(&results))
            .await
            .map_err(|e| SinkError::Io(format!("writer task failed: {e}")))??;

        info!(
            dir = %self.dir.display(),
            low = buckets.low.len(),
            mid = buckets.mid.len(),
            high = buckets.high.len(),
            "Results persisted"
        );
        Ok(())
    }

    async fn load(&self) -> Result<PersistedResults, SinkError> {
        let path = self.results_path();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SinkError::Missing(path.display().to_string()))
            }
            Err(e) => {
                return Err(SinkError::Io(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        serde_json::from_str(&content)
            .map_err(|e| SinkError::Corrupt(format!("{}: {e}", path.display())))
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}

/// Builds a [`JsonFileSink`] from each run's `results.dir`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSinkProvider;

impl SinkProvider for JsonSinkProvider {
    fn sink_for(&self, config: &Config) -> Arc<dyn ResultSink> {
        Arc::new(JsonFileSink::new(config.results.dir.clone()))
    }
}
