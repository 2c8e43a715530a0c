//! End-to-end pipeline tests: scripted backend through to JSON result files.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{
    banded_reply, scored_reply, test_config, temp_dir, FixedBackendProvider, RecordingSleeper,
    Reply, ScriptedBackend,
};
use prismatic::application::{drive, PipelineJob};
use prismatic::domain::errors::{BackendError, GenerationError, ParseError, PipelineError};
use prismatic::domain::models::{BucketLabel, Config, Point};
use prismatic::domain::ports::ResultSink;
use prismatic::infrastructure::config::ConfigLoader;
use prismatic::infrastructure::sink::JsonFileSink;
use prismatic::services::output_parser::OutputParser;
use prismatic::services::{
    partition, reduce, NoProgress, PipelineDriver, PipelineSettings, PipelineStep,
    ResilientGenerationClient,
};

fn driver(backend: ScriptedBackend, config: &Config, sink: Arc<dyn ResultSink>) -> PipelineDriver {
    let client = ResilientGenerationClient::from_config(
        Arc::new(backend),
        Arc::new(RecordingSleeper::default()),
        config,
    );
    PipelineDriver::new(Arc::new(client), PipelineSettings::from_config(config), sink)
}

fn input_points() -> Vec<Point> {
    OutputParser::new(28, Config::default().pipeline.bands)
        .parse(&scored_reply())
        .unwrap()
}

#[tokio::test]
async fn test_k_equal_to_input_returns_every_point() {
    let dir = temp_dir();
    let config = test_config(28);
    let sink = Arc::new(JsonFileSink::new(dir.path()));
    let summary = driver(ScriptedBackend::replying(scored_reply()), &config, sink.clone())
        .run("transit", &NoProgress)
        .await
        .unwrap();

    assert_eq!(summary.generated, 28);
    assert_eq!(summary.reduced, 28);

    let kept: HashSet<String> = BucketLabel::ALL
        .iter()
        .flat_map(|label| summary.buckets.get(*label).iter().map(|p| p.text.clone()))
        .collect();
    let expected: HashSet<String> = input_points().into_iter().map(|p| p.text).collect();
    assert_eq!(kept, expected);

    // Bands 0-2 sit below 3/7, band 3 at 1/2, bands 4-6 above 4/7
    assert_eq!(summary.buckets.low.len(), 12);
    assert_eq!(summary.buckets.mid.len(), 4);
    assert_eq!(summary.buckets.high.len(), 12);

    let persisted = sink.load().await.unwrap();
    assert_eq!(persisted.topic, "transit");
    assert_eq!(persisted.buckets, summary.buckets);
}

#[tokio::test]
async fn test_k_ten_returns_ten_members_of_input() {
    let dir = temp_dir();
    let config = test_config(10);
    let summary = driver(
        ScriptedBackend::replying(scored_reply()),
        &config,
        Arc::new(JsonFileSink::new(dir.path())),
    )
    .run("transit", &NoProgress)
    .await
    .unwrap();

    assert_eq!(summary.reduced, 10);
    assert_eq!(summary.buckets.len(), 10);

    let input = input_points();
    let mut seen = HashSet::new();
    for label in BucketLabel::ALL {
        for point in summary.buckets.get(label) {
            assert!(input.contains(point), "{point:?} is not an input point");
            assert!(seen.insert(point.text.clone()), "{} selected twice", point.text);
        }
    }
}

#[tokio::test]
async fn test_repeated_runs_write_identical_bucket_files() {
    let config = test_config(10);
    let mut contents = Vec::new();

    for _ in 0..2 {
        let dir = temp_dir();
        let sink = Arc::new(JsonFileSink::new(dir.path()));
        driver(ScriptedBackend::replying(scored_reply()), &config, sink.clone())
            .run("transit", &NoProgress)
            .await
            .unwrap();

        let files: Vec<Vec<u8>> = BucketLabel::ALL
            .iter()
            .map(|label| std::fs::read(sink.bucket_path(*label)).unwrap())
            .collect();
        assert!(sink.results_path().exists());
        contents.push(files);
    }

    assert_eq!(contents[0], contents[1]);
}

#[tokio::test]
async fn test_banded_reply_normalized_across_gradient() {
    let dir = temp_dir();
    let mut config = test_config(28);
    config.pipeline.perspective_count = 70;
    let summary = driver(
        ScriptedBackend::replying(banded_reply(70)),
        &config,
        Arc::new(JsonFileSink::new(dir.path())),
    )
    .run("school choice", &NoProgress)
    .await
    .unwrap();

    assert_eq!(summary.generated, 70);
    assert_eq!(summary.reduced, 28);
    assert!(summary.buckets.mid.iter().all(|p| p.label == "green"));
    assert!(summary.buckets.low.iter().all(|p| p.x() < 3.0 / 7.0));
    assert!(summary.buckets.high.iter().all(|p| p.x() > 4.0 / 7.0));
}

#[tokio::test]
async fn test_progress_reported_in_order() {
    let dir = temp_dir();
    let config = test_config(10);
    let steps = std::sync::Mutex::new(Vec::new());
    let progress = |step: PipelineStep| steps.lock().unwrap().push(step);

    driver(
        ScriptedBackend::replying(scored_reply()),
        &config,
        Arc::new(JsonFileSink::new(dir.path())),
    )
    .run("transit", &progress)
    .await
    .unwrap();

    let steps = steps.into_inner().unwrap();
    assert_eq!(
        steps,
        vec![
            PipelineStep::Generating,
            PipelineStep::Generated,
            PipelineStep::Parsed,
            PipelineStep::Reduced,
            PipelineStep::Partitioned,
            PipelineStep::Persisted,
        ]
    );
    let values: Vec<u8> = steps.iter().map(|step| step.progress()).collect();
    assert!(values.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn test_rate_limits_retried_then_succeed() {
    let dir = temp_dir();
    let config = test_config(28);
    let backend = ScriptedBackend::new(vec![
        Reply::Fail(BackendError::RateLimited("busy".to_string())),
        Reply::Fail(BackendError::RateLimited("busy".to_string())),
        Reply::Text(scored_reply()),
    ]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = ResilientGenerationClient::from_config(Arc::new(backend), sleeper.clone(), &config);
    let driver = PipelineDriver::new(
        Arc::new(client),
        PipelineSettings::from_config(&config),
        Arc::new(JsonFileSink::new(dir.path())),
    );

    let summary = driver.run("transit", &NoProgress).await.unwrap();
    assert_eq!(summary.reduced, 28);

    // base 1ms doubling, no pause after success in the test config
    assert_eq!(
        sleeper.delays(),
        vec![
            std::time::Duration::from_millis(1),
            std::time::Duration::from_millis(2)
        ]
    );
}

#[tokio::test]
async fn test_stage_errors_keep_their_message() {
    let dir = temp_dir();
    let config = test_config(10);

    let err = driver(
        ScriptedBackend::replying(""),
        &config,
        Arc::new(JsonFileSink::new(dir.path())),
    )
    .run("transit", &NoProgress)
    .await
    .unwrap_err();
    assert_eq!(err, PipelineError::Parse(ParseError::Empty));

    let err = driver(
        ScriptedBackend::unreachable(),
        &config,
        Arc::new(JsonFileSink::new(dir.path())),
    )
    .run("transit", &NoProgress)
    .await
    .unwrap_err();
    assert_eq!(
        err,
        PipelineError::Generation(GenerationError::Unreachable {
            attempts: config.backend.probe_attempts
        })
    );

    // Nothing was persisted by the failed runs
    assert!(!dir.path().join("results.json").exists());
}

#[tokio::test]
async fn test_drive_builds_everything_from_job_config() {
    let dir = temp_dir();
    let mut config = test_config(10);
    config.results.dir = dir.path().to_path_buf();
    ConfigLoader::validate(&config).unwrap();

    let backend = Arc::new(ScriptedBackend::replying(scored_reply()));
    let job = PipelineJob {
        run_id: uuid::Uuid::new_v4(),
        topic: "transit".to_string(),
        config,
    };
    let sink = Arc::new(JsonFileSink::new(job.config.results.dir.clone()));

    let summary = drive(
        &job,
        &FixedBackendProvider(backend.clone()),
        Arc::new(RecordingSleeper::default()),
        sink,
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(summary.reduced, 10);
    assert_eq!(summary.location, dir.path().display().to_string());

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].prompt.contains("transit"));
    assert!((calls[0].temperature - 0.6).abs() < f64::EPSILON);
}

#[test]
fn test_reduce_and_partition_are_pure() {
    let points = input_points();
    let first = partition(&reduce(&points, 10).unwrap());
    let second = partition(&reduce(&points, 10).unwrap());
    assert_eq!(first, second);
    assert_eq!(points, input_points());
}
