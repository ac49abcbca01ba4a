//! Blocking Ollama client serving as embedder and generator.

use log::debug;
use mnemos_memory::{Embedder, Generator, MemoryError, PromptContext};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct ShowRequest<'a> {
    model: &'a str,
}

#[derive(Deserialize)]
struct ShowResponse {
    #[serde(default)]
    model_info: HashMap<String, Value>,
}

impl ShowResponse {
    /// Trained context length, published as `<family>.context_length`.
    fn context_length(&self) -> Option<usize> {
        self.model_info
            .iter()
            .filter(|(key, _)| {
                key.as_str() == "context_length" || key.ends_with(".context_length")
            })
            .filter_map(|(_, value)| value.as_u64())
            .filter(|length| *length > 0)
            .max()
            .and_then(|length| usize::try_from(length).ok())
    }
}

/// Client for a local Ollama server.
pub struct OllamaClient {
    base_url: String,
    model: String,
    embedding_model: String,
    http_client: reqwest::blocking::Client,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            embedding_model: embedding_model.into(),
            http_client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    fn embedding_request<'a>(&'a self, text: &'a str) -> EmbeddingRequest<'a> {
        EmbeddingRequest {
            model: &self.embedding_model,
            prompt: text,
        }
    }

    fn generate_request(&self, prompt: &PromptContext) -> GenerateRequest<'_> {
        GenerateRequest {
            model: &self.model,
            prompt: prompt.render(),
            stream: false,
        }
    }

    /// Context window the server reports for the generation model.
    pub fn context_length(&self) -> Result<usize, MemoryError> {
        let response: ShowResponse = self
            .post("show", &ShowRequest { model: &self.model })
            .map_err(MemoryError::Generation)?;
        let length = response.context_length().ok_or_else(|| {
            MemoryError::Generation(format!("no context_length reported for {}", self.model))
        })?;
        debug!(
            "model context length (model={}, tokens={length})",
            self.model
        );
        Ok(length)
    }

    fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, String> {
        let url = self.endpoint(path);
        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| format!("request to {url} failed: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().unwrap_or_default();
            return Err(format!("ollama error {status}: {body_text}"));
        }
        response
            .json()
            .map_err(|e| format!("failed to parse ollama response: {e}"))
    }
}

impl Embedder for OllamaClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let response: EmbeddingResponse = self
            .post("embeddings", &self.embedding_request(text))
            .map_err(MemoryError::Embedding)?;
        if response.embedding.is_empty() {
            return Err(MemoryError::Embedding(format!(
                "empty embedding from model {}",
                self.embedding_model
            )));
        }
        debug!(
            "embedded text (model={}, dimension={})",
            self.embedding_model,
            response.embedding.len()
        );
        Ok(response.embedding)
    }
}

impl Generator for OllamaClient {
    fn generate(&self, prompt: &PromptContext) -> Result<String, MemoryError> {
        let response: GenerateResponse = self
            .post("generate", &self.generate_request(prompt))
            .map_err(MemoryError::Generation)?;
        Ok(response.response.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{OllamaClient, ShowResponse};
    use mnemos_memory::ContextAssembler;
    use pretty_assertions::assert_eq;

    fn client() -> OllamaClient {
        OllamaClient::new("http://localhost:11434/", "mistral", "all-minilm").expect("client")
    }

    #[test]
    fn endpoints_ignore_trailing_slash() {
        assert_eq!(
            client().endpoint("embeddings"),
            "http://localhost:11434/api/embeddings"
        );
    }

    #[test]
    fn embedding_body_uses_embedding_model() {
        let client = client();
        let body = serde_json::to_value(client.embedding_request("hello")).expect("json");
        assert_eq!(body["model"], "all-minilm");
        assert_eq!(body["prompt"], "hello");
    }

    #[test]
    fn generate_body_disables_streaming() {
        let client = client();
        let prompt = ContextAssembler::new()
            .with_system_prompt("SYS")
            .assemble(&[], &[], "hi");
        let body = serde_json::to_value(client.generate_request(&prompt)).expect("json");
        assert_eq!(body["model"], "mistral");
        assert_eq!(body["stream"], false);
        assert_eq!(body["prompt"], "SYS\nUser: hi\nAssistant:");
    }

    #[test]
    fn show_response_yields_family_context_length() {
        let response: ShowResponse = serde_json::from_str(
            r#"{
                "modelfile": "FROM mistral",
                "model_info": {
                    "general.architecture": "llama",
                    "general.parameter_count": 7241732096,
                    "llama.context_length": 32768,
                    "llama.embedding_length": 4096
                }
            }"#,
        )
        .expect("parse");
        assert_eq!(response.context_length(), Some(32768));
    }

    #[test]
    fn show_response_without_context_length_yields_none() {
        let response: ShowResponse =
            serde_json::from_str(r#"{ "model_info": { "llama.context_length": 0 } }"#)
                .expect("parse");
        assert_eq!(response.context_length(), None);
        let bare: ShowResponse = serde_json::from_str(r#"{ "details": {} }"#).expect("parse");
        assert_eq!(bare.context_length(), None);
    }
}
