mod helpers;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use helpers::TestDatabase;
use serde_json::json;
use textora_backend::models::*;
use textora_backend::services::pipeline::PipelineOrchestrator;
use textora_backend::services::{
    Generation, GenerationError, Generator, Recognition, RecognitionError, Recognizer, StagedInput,
};

struct FakeRecognizer {
    text: String,
    fail: bool,
}

impl FakeRecognizer {
    fn ok(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            text: String::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl Recognizer for FakeRecognizer {
    async fn recognize(
        &self,
        _input: &Path,
        _mime_type: &str,
    ) -> Result<Recognition, RecognitionError> {
        if self.fail {
            return Err(RecognitionError::Upstream("scanner offline".to_string()));
        }
        Ok(Recognition {
            text: self.text.clone(),
            operation_id: Some("op-42".to_string()),
            meta: json!({"fake": true}),
        })
    }
}

struct FakeGenerator {
    fail: bool,
}

impl FakeGenerator {
    fn ok() -> Arc<Self> {
        Arc::new(Self { fail: false })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self { fail: true })
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self, source_text: &str) -> Result<Generation, GenerationError> {
        if self.fail {
            return Err(GenerationError::Upstream("model unavailable".to_string()));
        }
        Ok(Generation {
            text: format!("rewritten: {source_text}"),
            response_id: Some("resp-42".to_string()),
            meta: json!({"fake": true}),
        })
    }
}

fn orchestrator(
    db: &TestDatabase,
    recognizer: Arc<dyn Recognizer>,
    generator: Arc<dyn Generator>,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(Arc::clone(&db.job_repo), recognizer, generator, Duration::from_secs(5))
}

/// Write a throwaway input file and return its staging handle plus the path
/// for post-run cleanup checks.
fn staged_fixture() -> (StagedInput, PathBuf) {
    let path = std::env::temp_dir().join(format!("textora-test-{}.png", uuid::Uuid::new_v4()));
    std::fs::write(&path, b"fake image bytes").expect("Failed to write fixture");
    (StagedInput::new(path.clone(), "image/png"), path)
}

#[tokio::test]
async fn test_happy_path_settles_job_as_done() {
    let db = TestDatabase::new().await;
    let user = db.user_with_balance(5).await;
    let job = db
        .job_repo
        .create_queued(user.id, None, Tokens::ONE, None, Some("image/png"))
        .await
        .unwrap();

    let (input, path) = staged_fixture();
    orchestrator(&db, FakeRecognizer::ok("hello world"), FakeGenerator::ok())
        .run(job.id, input)
        .await;

    let job = db.job_repo.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.tokens_consumed, job.tokens_reserved);
    assert!(job.is_ok);
    assert!(job.error_message.is_none());
    assert_eq!(job.detected_text.as_deref(), Some("hello world"));
    assert_eq!(job.generated_text.as_deref(), Some("rewritten: hello world"));
    assert_eq!(job.ocr_operation_id.as_deref(), Some("op-42"));
    assert_eq!(job.gpt_response_id.as_deref(), Some("resp-42"));

    assert!(!path.exists(), "Staged input must be removed after the run");
}

#[tokio::test]
async fn test_recognition_failure_settles_job_as_failed() {
    let db = TestDatabase::new().await;
    let user = db.user_with_balance(5).await;
    let job = db
        .job_repo
        .create_queued(user.id, None, Tokens::ONE, None, None)
        .await
        .unwrap();

    let (input, path) = staged_fixture();
    orchestrator(&db, FakeRecognizer::failing(), FakeGenerator::ok())
        .run(job.id, input)
        .await;

    let job = db.job_repo.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(!job.is_ok);
    let message = job.error_message.expect("Failed jobs carry a cause");
    assert!(!message.is_empty());
    assert!(job.generated_text.is_none());

    assert!(!path.exists(), "Staged input must be removed after a failure");
}

#[tokio::test]
async fn test_empty_recognition_fails_the_job() {
    let db = TestDatabase::new().await;
    let user = db.user_with_balance(5).await;
    let job = db
        .job_repo
        .create_queued(user.id, None, Tokens::ONE, None, None)
        .await
        .unwrap();

    let (input, _) = staged_fixture();
    orchestrator(&db, FakeRecognizer::ok("   "), FakeGenerator::ok())
        .run(job.id, input)
        .await;

    let job = db.job_repo.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.is_some());
}

#[tokio::test]
async fn test_generation_failure_keeps_recognition_output() {
    let db = TestDatabase::new().await;
    let user = db.user_with_balance(5).await;
    let job = db
        .job_repo
        .create_queued(user.id, None, Tokens::ONE, None, None)
        .await
        .unwrap();

    let (input, _) = staged_fixture();
    orchestrator(&db, FakeRecognizer::ok("salvaged text"), FakeGenerator::failing())
        .run(job.id, input)
        .await;

    let job = db.job_repo.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.detected_text.as_deref(), Some("salvaged text"));
    assert!(job.generated_text.is_none());
    assert_eq!(job.tokens_consumed, Tokens::ZERO);
}

#[tokio::test]
async fn test_missing_job_is_a_quiet_no_op() {
    let db = TestDatabase::new().await;

    let (input, path) = staged_fixture();
    orchestrator(&db, FakeRecognizer::ok("x"), FakeGenerator::ok())
        .run(uuid::Uuid::new_v4(), input)
        .await;

    assert!(!path.exists());
}

#[tokio::test]
async fn test_unpaid_job_is_not_claimable() {
    let db = TestDatabase::new().await;
    let user = db.user_with_balance(0).await;
    let job = db
        .job_repo
        .create_waiting_payment(user.id, None, "order-99", Tokens::ONE, None, None)
        .await
        .unwrap();

    let (input, _) = staged_fixture();
    orchestrator(&db, FakeRecognizer::ok("x"), FakeGenerator::ok())
        .run(job.id, input)
        .await;

    let job = db.job_repo.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::WaitingPayment, "Status must not move");
}

#[tokio::test]
async fn test_stalled_job_detection() {
    let db = TestDatabase::new().await;
    let user = db.user_with_balance(5).await;
    let job = db
        .job_repo
        .create_queued(user.id, None, Tokens::ONE, None, None)
        .await
        .unwrap();
    db.job_repo
        .transition(job.id, JobStatus::Queued, JobStatus::Processing)
        .await
        .unwrap();

    // Nothing is stalled yet relative to a cutoff in the past.
    let past = chrono::Utc::now() - chrono::Duration::hours(1);
    assert!(db.job_repo.find_stalled(past).await.unwrap().is_empty());

    // Against a future cutoff the processing job shows up.
    let future = chrono::Utc::now() + chrono::Duration::hours(1);
    let stalled = db.job_repo.find_stalled(future).await.unwrap();
    assert_eq!(stalled.len(), 1);
    assert_eq!(stalled[0].id, job.id);
}
