//! Generative model backend.
//!
//! The classifier and synthesizer talk to the model through the
//! [`TextGenerator`] capability interface — one prompt in, one plain-text
//! completion out, bounded timeout, explicit error — so alternate backends
//! (and scripted test doubles) are substitutable without touching their
//! logic. [`OllamaClient`] is the production implementation over the Ollama
//! HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use otwatch_shared::{ModelConfig, OtWatchError, Result};

/// Synchronous text-in/text-out generation capability.
///
/// No streaming, no structured output beyond plain text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`. One blocking round-trip.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Ollama HTTP backend
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Model client for a local Ollama server.
pub struct OllamaClient {
    generate_url: Url,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Build a client from config, with an optional model-name override.
    pub fn new(config: &ModelConfig, model_override: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| OtWatchError::config(format!("invalid model endpoint: {e}")))?;
        let generate_url = endpoint
            .join("api/generate")
            .map_err(|e| OtWatchError::config(format!("invalid model endpoint: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OtWatchError::ModelBackend(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            generate_url,
            model: model_override.unwrap_or_else(|| config.default_model.clone()),
            client,
        })
    }

    /// The model name requests are issued against.
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(self.generate_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| OtWatchError::ModelBackend(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OtWatchError::ModelBackend(format!("HTTP {status}")));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| OtWatchError::ModelBackend(format!("invalid response payload: {e}")))?;

        debug!(
            model = %self.model,
            chars = body.response.len(),
            "model generation complete"
        );
        Ok(body.response)
    }
}

// ---------------------------------------------------------------------------
// Scripted test double
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: String) -> ModelConfig {
        ModelConfig {
            endpoint,
            ..ModelConfig::default()
        }
    }

    #[tokio::test]
    async fn sends_model_and_prompt_without_streaming() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "qwen2.5:latest",
                "stream": false
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"response": "not-relevant"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = OllamaClient::new(&config(server.uri()), None).unwrap();
        let text = client.generate("is this relevant?").await.unwrap();
        assert_eq!(text, "not-relevant");
    }

    #[tokio::test]
    async fn model_override_takes_precedence() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({"model": "llama3:8b"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            OllamaClient::new(&config(server.uri()), Some("llama3:8b".into())).unwrap();
        assert_eq!(client.model(), "llama3:8b");
        client.generate("p").await.unwrap();
    }

    #[tokio::test]
    async fn server_error_maps_to_model_backend() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = OllamaClient::new(&config(server.uri()), None).unwrap();
        let err = client.generate("p").await.unwrap_err();
        assert!(matches!(err, OtWatchError::ModelBackend(_)));
    }

    #[tokio::test]
    async fn scripted_generator_replays_and_records() {
        use super::testing::ScriptedGenerator;

        let generator = ScriptedGenerator::new([Ok("relevant"), Err("down")]);
        assert_eq!(generator.generate("first").await.unwrap(), "relevant");
        assert!(generator.generate("second").await.is_err());
        assert_eq!(generator.calls(), 2);
        assert_eq!(generator.prompts(), vec!["first", "second"]);
    }
}
