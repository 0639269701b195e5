//! Two-stage job pipeline: text recognition followed by text generation.
//!
//! The orchestrator drives one job through `queued -> processing -> done`
//! (or `failed`), settling its status exactly once. Workers pull job ids off
//! an in-process queue; enqueueing never blocks the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::JobStatus;
use crate::repositories::JobRepository;

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("Input contains no recognizable text")]
    EmptyInput,

    #[error("Recognition timed out")]
    Timeout,

    #[error("Recognition service error: {0}")]
    Upstream(String),

    #[error("Recognition transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to read staged input: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Nothing to generate from: source text is empty")]
    EmptyInput,

    #[error("Generation timed out")]
    Timeout,

    #[error("Generation service error: {0}")]
    Upstream(String),

    #[error("Generation transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Output of the recognition stage.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub text: String,
    pub operation_id: Option<String>,
    pub meta: serde_json::Value,
}

/// Output of the generation stage.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub response_id: Option<String>,
    pub meta: serde_json::Value,
}

/// First stage: extract text from a staged input file.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, input: &Path, mime_type: &str)
        -> Result<Recognition, RecognitionError>;
}

/// Second stage: produce the final text from the recognized source.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, source_text: &str) -> Result<Generation, GenerationError>;
}

/// An uploaded input staged to a local file for the pipeline's lifetime.
/// The file is removed exactly once, when the staging handle is dropped,
/// on both the success and the failure path.
#[derive(Debug)]
pub struct StagedInput {
    path: PathBuf,
    mime_type: String,
}

impl StagedInput {
    pub fn new(path: PathBuf, mime_type: impl Into<String>) -> Self {
        Self {
            path,
            mime_type: mime_type.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

impl Drop for StagedInput {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove staged input");
            }
        }
    }
}

/// Drives one job through both stages and settles its terminal status.
pub struct PipelineOrchestrator {
    jobs: Arc<JobRepository>,
    recognizer: Arc<dyn Recognizer>,
    generator: Arc<dyn Generator>,
    stage_timeout: Duration,
}

impl PipelineOrchestrator {
    pub fn new(
        jobs: Arc<JobRepository>,
        recognizer: Arc<dyn Recognizer>,
        generator: Arc<dyn Generator>,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            jobs,
            recognizer,
            generator,
            stage_timeout,
        }
    }

    /// Process a queued job. Aborts quietly when the job row is gone or
    /// someone else already claimed it; every other outcome leaves the job
    /// in exactly one of `done` or `failed`.
    pub async fn run(&self, job_id: Uuid, input: StagedInput) {
        let job = match self.jobs.find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(%job_id, "Job vanished before processing");
                return;
            }
            Err(e) => {
                error!(%job_id, error = %e, "Failed to load job");
                return;
            }
        };

        match self
            .jobs
            .transition(job_id, JobStatus::Queued, JobStatus::Processing)
            .await
        {
            Ok(()) => {}
            Err(e) => {
                warn!(%job_id, status = job.status.as_str(), error = %e, "Job not claimable");
                return;
            }
        }

        if let Err(message) = self.run_stages(job_id, &input).await {
            if let Err(e) = self.jobs.mark_failed(job_id, &message).await {
                error!(%job_id, error = %e, "Failed to settle job as failed");
            }
            return;
        }

        match self.jobs.mark_done(job_id).await {
            Ok(()) => info!(%job_id, "Job done"),
            Err(e) => error!(%job_id, error = %e, "Failed to settle job as done"),
        }
    }

    async fn run_stages(&self, job_id: Uuid, input: &StagedInput) -> Result<(), String> {
        let recognition = match tokio::time::timeout(
            self.stage_timeout,
            self.recognizer.recognize(input.path(), input.mime_type()),
        )
        .await
        {
            Ok(Ok(recognition)) => recognition,
            Ok(Err(e)) => {
                warn!(%job_id, error = %e, "Recognition failed");
                return Err(format!("Recognition failed: {e}"));
            }
            Err(_) => {
                warn!(%job_id, "Recognition timed out");
                return Err(RecognitionError::Timeout.to_string());
            }
        };

        if recognition.text.trim().is_empty() {
            return Err(RecognitionError::EmptyInput.to_string());
        }

        self.jobs
            .record_recognition(
                job_id,
                &recognition.text,
                recognition.operation_id.as_deref(),
                &recognition.meta,
            )
            .await
            .map_err(|e| format!("Failed to record recognition: {e}"))?;

        let generation = match tokio::time::timeout(
            self.stage_timeout,
            self.generator.generate(&recognition.text),
        )
        .await
        {
            Ok(Ok(generation)) => generation,
            Ok(Err(e)) => {
                warn!(%job_id, error = %e, "Generation failed");
                return Err(format!("Generation failed: {e}"));
            }
            Err(_) => {
                warn!(%job_id, "Generation timed out");
                return Err(GenerationError::Timeout.to_string());
            }
        };

        self.jobs
            .record_generation(
                job_id,
                &generation.text,
                generation.response_id.as_deref(),
                &generation.meta,
            )
            .await
            .map_err(|e| format!("Failed to record generation: {e}"))?;

        Ok(())
    }
}

struct PipelineJob {
    job_id: Uuid,
    input: StagedInput,
}

/// Cheap cloneable handle for submitting jobs to the worker pool.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::UnboundedSender<PipelineJob>,
}

impl PipelineHandle {
    /// Hand a queued job to the workers. Returns immediately; the job is
    /// processed in the background.
    pub fn enqueue(&self, job_id: Uuid, input: StagedInput) -> AppResult<()> {
        self.tx
            .send(PipelineJob { job_id, input })
            .map_err(|_| AppError::Message("Pipeline workers are shut down".to_string()))
    }
}

/// Spawn `workers` tasks draining a shared queue through the orchestrator.
pub fn spawn_workers(orchestrator: Arc<PipelineOrchestrator>, workers: usize) -> PipelineHandle {
    let (tx, rx) = mpsc::unbounded_channel::<PipelineJob>();
    let rx = Arc::new(Mutex::new(rx));

    for worker_id in 0..workers {
        let orchestrator = Arc::clone(&orchestrator);
        let rx = Arc::clone(&rx);
        tokio::spawn(async move {
            loop {
                let next = rx.lock().await.recv().await;
                match next {
                    Some(job) => {
                        info!(worker_id, job_id = %job.job_id, "Worker picked up job");
                        orchestrator.run(job.job_id, job.input).await;
                    }
                    None => {
                        info!(worker_id, "Pipeline queue closed, worker exiting");
                        break;
                    }
                }
            }
        });
    }

    PipelineHandle { tx }
}
