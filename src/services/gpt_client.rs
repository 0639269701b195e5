//! Generation backed by the YandexGPT completion API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::services::pipeline::{Generation, GenerationError, Generator};

const DEFAULT_ENDPOINT: &str =
    "https://llm.api.cloud.yandex.net/foundationModels/v1/completion";

const SYSTEM_PROMPT: &str = "You are given raw text recognized from a scanned document. \
     Clean it up, fix recognition artifacts and produce a well-structured rewrite that \
     preserves the original meaning.";

pub struct GptClient {
    http: reqwest::Client,
    api_key: String,
    folder_id: String,
    endpoint: String,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    result: CompletionResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionResult {
    alternatives: Vec<Alternative>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Deserialize)]
struct Alternative {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    text: String,
}

impl GptClient {
    pub fn new(api_key: String, folder_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            folder_id,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            temperature: 0.3,
            max_tokens: 2_000,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Generator for GptClient {
    async fn generate(&self, source_text: &str) -> Result<Generation, GenerationError> {
        if source_text.trim().is_empty() {
            return Err(GenerationError::EmptyInput);
        }

        let body = json!({
            "modelUri": format!("gpt://{}/yandexgpt-lite/latest", self.folder_id),
            "completionOptions": {
                "stream": false,
                "temperature": self.temperature,
                "maxTokens": self.max_tokens,
            },
            "messages": [
                { "role": "system", "text": SYSTEM_PROMPT },
                { "role": "user", "text": source_text },
            ],
        });

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .header("x-folder-id", &self.folder_id)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream(format!(
                "completion returned {status}: {text}"
            )));
        }

        let completion: CompletionResponse = response.json().await?;
        let CompletionResult {
            alternatives,
            usage,
            model_version,
        } = completion.result;

        let text = alternatives
            .into_iter()
            .next()
            .map(|a| a.message.text)
            .ok_or_else(|| GenerationError::Upstream("No completion alternatives".to_string()))?;

        let meta = json!({
            "provider": "yandex_gpt",
            "usage": usage,
            "model_version": model_version.clone(),
        });

        Ok(Generation {
            text,
            response_id: model_version,
            meta,
        })
    }
}
