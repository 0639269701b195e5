//! Recognition backed by the Yandex Vision OCR async API.
//!
//! Submission returns an operation id; the result is polled until the
//! operation completes. The operation id is kept on the job for audit.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::services::pipeline::{Recognition, RecognitionError, Recognizer};

const DEFAULT_ENDPOINT: &str = "https://ocr.api.cloud.yandex.net/ocr/v1";

pub struct OcrClient {
    http: reqwest::Client,
    api_key: String,
    folder_id: String,
    endpoint: String,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    result: Option<OperationResult>,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResult {
    #[serde(default)]
    text_annotation: Option<TextAnnotation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextAnnotation {
    #[serde(default)]
    full_text: String,
}

#[derive(Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

impl OcrClient {
    pub fn new(api_key: String, folder_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            folder_id,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            poll_interval: Duration::from_secs(2),
            max_polls: 20,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn submit(&self, content: &[u8], mime_type: &str) -> Result<String, RecognitionError> {
        let body = json!({
            "content": BASE64.encode(content),
            "mimeType": mime_type,
            "languageCodes": ["*"],
            "model": "page",
        });

        let response = self
            .http
            .post(format!("{}/recognizeTextAsync", self.endpoint))
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .header("x-folder-id", &self.folder_id)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RecognitionError::Upstream(format!(
                "submit returned {status}: {text}"
            )));
        }

        let submitted: SubmitResponse = response.json().await?;
        Ok(submitted.id)
    }

    async fn poll(&self, operation_id: &str) -> Result<String, RecognitionError> {
        for attempt in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .http
                .post(format!("{}/getRecognition", self.endpoint))
                .header("Authorization", format!("Api-Key {}", self.api_key))
                .json(&json!({ "operationId": operation_id }))
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                return Err(RecognitionError::Upstream(format!(
                    "poll returned {status}: {text}"
                )));
            }

            let operation: OperationResponse = response.json().await?;

            if let Some(error) = operation.error {
                return Err(RecognitionError::Upstream(error.message));
            }
            if operation.done {
                let text = operation
                    .result
                    .and_then(|r| r.text_annotation)
                    .map(|a| a.full_text)
                    .unwrap_or_default();
                return Ok(text);
            }

            debug!(operation_id, attempt, "Recognition still running");
        }

        Err(RecognitionError::Timeout)
    }
}

#[async_trait]
impl Recognizer for OcrClient {
    async fn recognize(
        &self,
        input: &Path,
        mime_type: &str,
    ) -> Result<Recognition, RecognitionError> {
        let content = tokio::fs::read(input).await?;
        if content.is_empty() {
            return Err(RecognitionError::EmptyInput);
        }

        let operation_id = self.submit(&content, mime_type).await?;
        let text = self.poll(&operation_id).await?;

        let meta = json!({
            "provider": "yandex_ocr",
            "operation_id": operation_id.clone(),
            "input_bytes": content.len(),
        });

        Ok(Recognition {
            text,
            operation_id: Some(operation_id),
            meta,
        })
    }
}
