//! Resilient generation client
//!
//! Wraps a [`GenerationBackend`] with:
//! - a liveness probe checked before first use, with bounded retries
//! - exponential backoff on rate limiting, fail-fast on anything else
//! - concatenation of streamed fragments, skipping malformed ones
//! - a fixed self-throttling pause after each successful call

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use super::retry_policy::RetryPolicy;
use crate::domain::errors::{BackendError, GenerationError};
use crate::domain::models::Config;
use crate::domain::ports::{GenerationBackend, GenerationRequest, Sleeper, StreamFragment};

/// Liveness probe settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_millis(500),
        }
    }
}

/// Generation client with probing, retry and throttling
pub struct ResilientGenerationClient {
    backend: Arc<dyn GenerationBackend>,
    sleeper: Arc<dyn Sleeper>,
    retry_policy: RetryPolicy,
    probe: ProbeSettings,
    post_success_delay: Duration,
    ready: OnceCell<()>,
}

impl ResilientGenerationClient {
    /// Create a client with default policy: 5 attempts, 1s base delay,
    /// 30 probes every 500ms, 2s pause after success.
    pub fn new(backend: Arc<dyn GenerationBackend>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            backend,
            sleeper,
            retry_policy: RetryPolicy::default(),
            probe: ProbeSettings::default(),
            post_success_delay: Duration::from_secs(2),
            ready: OnceCell::new(),
        }
    }

    /// Create a client configured from the `retry`, `backend` and
    /// `generation` sections
    pub fn from_config(
        backend: Arc<dyn GenerationBackend>,
        sleeper: Arc<dyn Sleeper>,
        config: &Config,
    ) -> Self {
        Self::new(backend, sleeper)
            .with_retry_policy(RetryPolicy::from_config(&config.retry))
            .with_probe(ProbeSettings {
                attempts: config.backend.probe_attempts,
                interval: Duration::from_millis(config.backend.probe_interval_ms),
            })
            .with_post_success_delay(Duration::from_millis(
                config.generation.post_success_delay_ms,
            ))
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_probe(mut self, probe: ProbeSettings) -> Self {
        self.probe = ProbeSettings {
            attempts: probe.attempts.max(1),
            interval: probe.interval,
        };
        self
    }

    pub fn with_post_success_delay(mut self, delay: Duration) -> Self {
        self.post_success_delay = delay;
        self
    }

    /// Probe the backend until it answers, at most `probe.attempts` times
    ///
    /// A successful probe is remembered; a failed one is retried on the
    /// next call.
    pub async fn ensure_ready(&self) -> Result<(), GenerationError> {
        self.ready
            .get_or_try_init(|| self.probe_backend())
            .await
            .map(|_| ())
    }

    async fn probe_backend(&self) -> Result<(), GenerationError> {
        let attempts = self.probe.attempts;

        for attempt in 1..=attempts {
            match self.backend.probe().await {
                Ok(()) => {
                    info!(backend = self.backend.name(), attempt, "Generation backend is ready");
                    return Ok(());
                }
                Err(err) => {
                    debug!(
                        backend = self.backend.name(),
                        attempt,
                        max_attempts = attempts,
                        error = %err,
                        "Waiting for generation backend"
                    );
                    if attempt < attempts {
                        self.sleeper.sleep(self.probe.interval).await;
                    }
                }
            }
        }

        warn!(
            backend = self.backend.name(),
            attempts, "Generation backend did not respond to liveness probe"
        );
        Err(GenerationError::Unreachable { attempts })
    }

    /// Generate text for `prompt`
    ///
    /// # Arguments
    /// * `prompt` - Non-empty prompt text
    /// * `temperature` - Sampling temperature, finite and >= 0
    /// * `max_output` - Maximum number of generated tokens, > 0
    ///
    /// # Returns
    /// * `Ok(String)` - All streamed fragments concatenated in arrival order
    /// * `Err(GenerationError)` - Invalid input, unreachable backend,
    ///   exhausted retries or a fatal backend error
    #[instrument(skip(self, prompt), fields(backend = self.backend.name(), prompt_len = prompt.len()))]
    pub async fn generate(
        &self,
        prompt: &str,
        temperature: f64,
        max_output: u32,
    ) -> Result<String, GenerationError> {
        if prompt.trim().is_empty() {
            return Err(GenerationError::InvalidRequest(
                "prompt must not be empty".to_string(),
            ));
        }
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(GenerationError::InvalidRequest(format!(
                "temperature must be >= 0, got {temperature}"
            )));
        }
        if max_output == 0 {
            return Err(GenerationError::InvalidRequest(
                "max_output must be positive".to_string(),
            ));
        }

        self.ensure_ready().await?;

        let request = GenerationRequest {
            prompt: prompt.to_string(),
            temperature,
            max_output,
        };

        info!("Generating batch");
        let text = self
            .retry_policy
            .execute(self.sleeper.as_ref(), || self.attempt(&request))
            .await?;

        if !self.post_success_delay.is_zero() {
            self.sleeper.sleep(self.post_success_delay).await;
        }

        Ok(text)
    }

    /// One streaming attempt
    async fn attempt(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        let mut stream = self.backend.stream(request).await?;
        let mut output = String::new();
        let mut fragments = 0usize;
        let mut skipped = 0usize;

        while let Some(item) = stream.next().await {
            match item? {
                StreamFragment::Text(text) => {
                    fragments += 1;
                    output.push_str(&text);
                }
                StreamFragment::Malformed(raw) => {
                    skipped += 1;
                    debug!(fragment = %raw, "Skipping malformed stream fragment");
                }
                StreamFragment::End => break,
            }
        }

        if skipped > 0 {
            warn!(skipped, "Skipped malformed stream fragments");
        }
        debug!(fragments, chars = output.len(), "Stream complete");

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::FragmentStream;
    use async_trait::async_trait;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    type Attempt = Result<Vec<Result<StreamFragment, BackendError>>, BackendError>;

    /// Backend replaying a script of attempts
    struct ScriptedBackend {
        probes_failing: AtomicU32,
        probe_calls: AtomicU32,
        attempts: Mutex<VecDeque<Attempt>>,
        stream_calls: AtomicU32,
    }

    impl ScriptedBackend {
        fn new(attempts: Vec<Attempt>) -> Self {
            Self {
                probes_failing: AtomicU32::new(0),
                probe_calls: AtomicU32::new(0),
                attempts: Mutex::new(attempts.into()),
                stream_calls: AtomicU32::new(0),
            }
        }

        fn with_failing_probes(self, count: u32) -> Self {
            self.probes_failing.store(count, Ordering::SeqCst);
            self
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn probe(&self) -> Result<(), BackendError> {
            let call = self.probe_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.probes_failing.load(Ordering::SeqCst) {
                Err(BackendError::Probe("connection refused".to_string()))
            } else {
                Ok(())
            }
        }

        async fn stream(
            &self,
            _request: &GenerationRequest,
        ) -> Result<FragmentStream, BackendError> {
            self.stream_calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .attempts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BackendError::Network("script exhausted".to_string())));
            next.map(|items| Box::pin(stream::iter(items)) as FragmentStream)
        }
    }

    fn text(s: &str) -> Result<StreamFragment, BackendError> {
        Ok(StreamFragment::Text(s.to_string()))
    }

    fn client(backend: Arc<ScriptedBackend>, sleeper: Arc<RecordingSleeper>) -> ResilientGenerationClient {
        ResilientGenerationClient::new(backend, sleeper)
            .with_retry_policy(RetryPolicy::new(5, Duration::from_secs(1)))
            .with_post_success_delay(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_concatenates_fragments_and_skips_malformed() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(vec![
            text("{\"perspectives\""),
            Ok(StreamFragment::Malformed("data: {oops".to_string())),
            text(": []}"),
            Ok(StreamFragment::End),
            text("ignored after end"),
        ])]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let output = client(backend, sleeper.clone())
            .generate("topic", 0.6, 128)
            .await
            .unwrap();

        assert_eq!(output, "{\"perspectives\": []}");
        // Only the post-success pause
        assert_eq!(*sleeper.slept.lock().unwrap(), vec![Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn test_retries_rate_limits_with_backoff() {
        let limited = || Err(BackendError::RateLimited("HTTP 429".to_string()));
        let backend = Arc::new(ScriptedBackend::new(vec![
            limited(),
            limited(),
            limited(),
            Ok(vec![text("ok")]),
        ]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let output = client(backend.clone(), sleeper.clone())
            .generate("topic", 0.6, 128)
            .await
            .unwrap();

        assert_eq!(output, "ok");
        assert_eq!(backend.stream_calls.load(Ordering::SeqCst), 4);
        let slept = sleeper.slept.lock().unwrap().clone();
        assert_eq!(
            slept,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(2),
            ]
        );
    }

    #[tokio::test]
    async fn test_rate_limit_inside_stream_is_transient() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(vec![
                text("partial"),
                Err(BackendError::RateLimited("code 429".to_string())),
            ]),
            Ok(vec![text("complete")]),
        ]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let output = client(backend, sleeper)
            .generate("topic", 0.6, 128)
            .await
            .unwrap();

        assert_eq!(output, "complete");
    }

    #[tokio::test]
    async fn test_fatal_error_aborts() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(BackendError::Http {
                status: 400,
                body: "bad".to_string(),
            }),
            Ok(vec![text("never")]),
        ]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let err = client(backend.clone(), sleeper.clone())
            .generate("topic", 0.6, 128)
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Backend(_)));
        assert_eq!(backend.stream_calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_after_all_attempts() {
        let attempts = (0..5)
            .map(|_| Err(BackendError::RateLimited("RESOURCE_EXHAUSTED".to_string())))
            .collect();
        let backend = Arc::new(ScriptedBackend::new(attempts));
        let sleeper = Arc::new(RecordingSleeper::default());

        let err = client(backend, sleeper.clone())
            .generate("topic", 0.6, 128)
            .await
            .unwrap_err();

        assert_eq!(err, GenerationError::RateLimited { attempts: 5 });
        let total: Duration = sleeper.slept.lock().unwrap().iter().sum();
        assert_eq!(total, Duration::from_secs(1 + 2 + 4 + 8));
    }

    #[tokio::test]
    async fn test_rejects_invalid_input_without_calling_backend() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(backend.clone(), sleeper);

        for (prompt, temperature, max_output) in
            [("", 0.5, 10), ("  ", 0.5, 10), ("p", -0.1, 10), ("p", f64::NAN, 10), ("p", 0.5, 0)]
        {
            let err = client
                .generate(prompt, temperature, max_output)
                .await
                .unwrap_err();
            assert!(matches!(err, GenerationError::InvalidRequest(_)));
        }
        assert_eq!(backend.probe_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.stream_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_probe_retries_then_succeeds_once() {
        let backend = Arc::new(
            ScriptedBackend::new(vec![Ok(vec![text("a")]), Ok(vec![text("b")])])
                .with_failing_probes(3),
        );
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(backend.clone(), sleeper.clone()).with_probe(ProbeSettings {
            attempts: 5,
            interval: Duration::from_millis(500),
        });

        assert_eq!(client.generate("p", 0.5, 10).await.unwrap(), "a");
        assert_eq!(client.generate("p", 0.5, 10).await.unwrap(), "b");

        // Probed until the fourth call succeeded, never again afterwards
        assert_eq!(backend.probe_calls.load(Ordering::SeqCst), 4);
        let probe_sleeps = sleeper
            .slept
            .lock()
            .unwrap()
            .iter()
            .filter(|d| **d == Duration::from_millis(500))
            .count();
        assert_eq!(probe_sleeps, 3);
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let backend = Arc::new(ScriptedBackend::new(vec![]).with_failing_probes(u32::MAX));
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(backend.clone(), sleeper).with_probe(ProbeSettings {
            attempts: 3,
            interval: Duration::from_millis(1),
        });

        let err = client.generate("p", 0.5, 10).await.unwrap_err();
        assert_eq!(err, GenerationError::Unreachable { attempts: 3 });
        assert_eq!(backend.stream_calls.load(Ordering::SeqCst), 0);
    }
}
