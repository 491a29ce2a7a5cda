//! Submission surface driven end-to-end against an in-memory store: a
//! worker picks up the submitted job, and status reflects each phase.

mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use shelfmark_core::domains::convert::ConversionJobPayload;
use shelfmark_core::domains::{SubmitApi, SubmitRequest};
use shelfmark_core::kernel::jobs::{ActiveJob, JobHandler, JobState, Worker, WorkerConfig};

use common::{memory_store, test_queue};

/// Stand-in conversion handler: reports progress and returns a path.
struct StubConvert;

#[async_trait]
impl JobHandler for StubConvert {
    async fn run(&self, job: &ActiveJob) -> Result<Value> {
        let payload: ConversionJobPayload = job.payload()?;
        job.progress(50).await;
        Ok(serde_json::json!({
            "pdf_path": "/data/media/2024-W06/pdfs/stub.pdf",
            "url": payload.url,
        }))
    }
}

#[tokio::test]
async fn submitted_job_completes_and_reports_status() {
    let store = memory_store();
    let convert_queue = test_queue("convert", store.clone());
    let podcast_queue = test_queue("podcast", store.clone());
    let media_queue = test_queue("media", store.clone());
    let api = SubmitApi::new(convert_queue.clone(), podcast_queue, media_queue);

    let job_id = api
        .submit_conversion(SubmitRequest {
            url: "https://example.com/a".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let status = api.get_status(&job_id).await.unwrap().unwrap();
    assert_eq!(status.state, JobState::Queued);

    let shutdown = CancellationToken::new();
    let worker = Worker::new(
        convert_queue.clone(),
        Arc::new(StubConvert),
        WorkerConfig {
            concurrency: 1,
            poll_interval: Duration::from_millis(5),
        },
    );
    let handle = tokio::spawn(worker.run(shutdown.clone()));

    let mut final_state = JobState::Queued;
    for _ in 0..200 {
        let status = api.get_status(&job_id).await.unwrap().unwrap();
        final_state = status.state;
        if final_state == JobState::Complete {
            assert_eq!(status.progress, 100);
            let result = status.result.unwrap();
            assert_eq!(result["url"], "https://example.com/a");
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(final_state, JobState::Complete);
    assert_eq!(convert_queue.get_completed().await.unwrap().len(), 1);
}

/// Failing handler: the wire format reaches status and the failed set.
struct AlwaysPaywalled;

#[async_trait]
impl JobHandler for AlwaysPaywalled {
    async fn run(&self, _job: &ActiveJob) -> Result<Value> {
        anyhow::bail!("paywall: matched paywall pattern \"subscribe to continue reading\"")
    }
}

#[tokio::test]
async fn terminal_failure_surfaces_kind_prefixed_reason() {
    let store = memory_store();
    let convert_queue = test_queue("convert", store.clone());
    let api = SubmitApi::new(
        convert_queue.clone(),
        test_queue("podcast", store.clone()),
        test_queue("media", store.clone()),
    );

    let job_id = api
        .submit_conversion(SubmitRequest {
            url: "https://paywalled.example.com/story".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(
        Worker::new(
            convert_queue.clone(),
            Arc::new(AlwaysPaywalled),
            WorkerConfig {
                concurrency: 1,
                poll_interval: Duration::from_millis(5),
            },
        )
        .run(shutdown.clone()),
    );

    let mut last = None;
    for _ in 0..400 {
        let status = api.get_status(&job_id).await.unwrap().unwrap();
        if status.state == JobState::Failed {
            last = Some(status);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    shutdown.cancel();
    handle.await.unwrap();

    let status = last.expect("job reached terminal failure");
    assert_eq!(status.attempts_made, 3);
    let error = status.error.unwrap();
    assert!(error.starts_with("paywall:"), "got: {error}");

    let failed = convert_queue.get_failed().await.unwrap();
    assert_eq!(failed.len(), 1);
}
