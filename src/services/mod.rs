//! Business logic built on the repositories: identity resolution, billing,
//! job intake and the recognition/generation pipeline.

pub mod billing;
pub mod gpt_client;
pub mod identity;
pub mod jobs;
pub mod ocr_client;
pub mod pipeline;
pub mod profile;
pub mod tariffs;

pub use billing::BillingService;
pub use gpt_client::GptClient;
pub use identity::IdentityService;
pub use jobs::JobService;
pub use ocr_client::OcrClient;
pub use pipeline::{
    Generation, GenerationError, Generator, PipelineHandle, PipelineOrchestrator, Recognition,
    RecognitionError, Recognizer, StagedInput,
};
pub use tariffs::{get_tariff, list_tariffs, Tariff};
