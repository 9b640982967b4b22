//! OpenAI-compatible chat-completion client
//!
//! Works against any server exposing `POST {base_url}/chat/completions`
//! (OpenAI, Groq, Ollama).

use super::{AnswerGenerator, GenerationError};
use crate::config::LlmConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    api_key_env: String,
    key_required: bool,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGenerator {
    /// Build a client from config; the API key is read from `llm.api_key_env`
    pub fn from_config(config: &LlmConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());

        // Local servers accept unauthenticated requests
        let local = ["://localhost", "://127.0.0.1"]
            .iter()
            .any(|host| config.base_url.contains(host));
        let key_required = config.provider != "ollama" && !local;

        if api_key.is_none() && key_required {
            tracing::warn!(
                "${} is not set; answer generation will fail until it is",
                config.api_key_env
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            api_key_env: config.api_key_env.clone(),
            key_required,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            temperature: self.temperature,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        match &self.api_key {
            Some(key) => builder = builder.bearer_auth(key),
            None if self.key_required => {
                return Err(GenerationError::MissingApiKey(self.api_key_env.clone()))
            }
            None => {}
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Response(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Response("No completion choices".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};

    fn config(base_url: &str, key_env: &str) -> LlmConfig {
        LlmConfig {
            base_url: base_url.to_string(),
            api_key_env: key_env.to_string(),
            ..LlmConfig::default()
        }
    }

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let generator =
            OpenAiGenerator::from_config(&config("https://api.groq.com/openai/v1/", "THEMIS_TEST_UNSET_KEY"))
                .unwrap();
        assert_eq!(
            generator.endpoint(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_missing_key_for_remote_service() {
        let generator =
            OpenAiGenerator::from_config(&config("https://api.openai.com/v1", "THEMIS_TEST_UNSET_KEY"))
                .unwrap();
        let result = generator.complete("system", "user").await;
        assert!(matches!(result, Err(GenerationError::MissingApiKey(_))));
    }

    #[tokio::test]
    async fn test_completion_against_stub_server() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["messages"][0]["role"], "system");
                assert_eq!(body["model"], "gpt-3.5-turbo");
                Json(serde_json::json!({
                    "choices": [{"message": {"role": "assistant", "content": "Selon l'article L221-18..."}}]
                }))
            }),
        );
        let base = spawn_stub(router).await;

        let generator =
            OpenAiGenerator::from_config(&config(&format!("{}/v1", base), "THEMIS_TEST_UNSET_KEY"))
                .unwrap();
        let answer = generator.complete("system", "user").await.unwrap();
        assert_eq!(answer, "Selon l'article L221-18...");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (axum::http::StatusCode::TOO_MANY_REQUESTS, "rate limited") }),
        );
        let base = spawn_stub(router).await;

        let generator =
            OpenAiGenerator::from_config(&config(&format!("{}/v1", base), "THEMIS_TEST_UNSET_KEY"))
                .unwrap();
        match generator.complete("system", "user").await {
            Err(GenerationError::Api { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
