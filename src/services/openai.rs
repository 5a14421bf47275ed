//! OpenAI chat completions and embeddings.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{BoxFuture, CompletionRequest, Embedder, TextGenerator};
use crate::config::ModelConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

fn require_key(key: &Option<String>) -> Result<&str> {
    key.as_deref()
        .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is not set"))
}

async fn post_json(http: &reqwest::Client, url: &str, api_key: &str, body: &Value) -> Result<Value> {
    let response = http
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .context("OpenAI request failed")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("OpenAI returned {}: {}", status, body);
    }

    Ok(response.json().await?)
}

pub struct OpenAiChat {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl OpenAiChat {
    pub fn new(http: reqwest::Client, config: &ModelConfig) -> Self {
        Self {
            http,
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

impl TextGenerator for OpenAiChat {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, String> {
        Box::pin(async move {
            let api_key = require_key(&self.api_key)?;
            let url = format!("{}/chat/completions", self.base_url);
            debug!(model = %self.model, "Calling OpenAI chat completions");

            let value = post_json(&self.http, &url, api_key, &self.request_body(&request)).await?;
            let text = value["choices"][0]["message"]["content"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("OpenAI response had no message content"))?;
            Ok(text.trim().to_string())
        })
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(http: reqwest::Client, config: &ModelConfig) -> Self {
        Self {
            http,
            api_key: config.openai_api_key.clone(),
            model: config.openai_embedding_model.clone(),
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed(&self, texts: Vec<String>) -> BoxFuture<'_, Vec<Vec<f32>>> {
        Box::pin(async move {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let api_key = require_key(&self.api_key)?;
            let url = format!("{}/embeddings", self.base_url);
            debug!(model = %self.model, inputs = texts.len(), "Requesting embeddings");

            let expected = texts.len();
            let body = json!({ "model": self.model, "input": texts });
            let value = post_json(&self.http, &url, api_key, &body).await?;

            let mut response: EmbeddingResponse = serde_json::from_value(value)?;
            if response.data.len() != expected {
                anyhow::bail!(
                    "Expected {} embeddings, got {}",
                    expected,
                    response.data.len()
                );
            }
            response.data.sort_by_key(|item| item.index);
            Ok(response.data.into_iter().map(|item| item.embedding).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ModelConfig {
        ModelConfig {
            openai_api_key: None,
            openai_model: "gpt-test".to_string(),
            ..ModelConfig::from_env().unwrap()
        }
    }

    #[test]
    fn test_chat_body_includes_system_message() {
        let chat = OpenAiChat::new(reqwest::Client::new(), &config());
        let body = chat.request_body(
            &CompletionRequest::new("What is 2+2?")
                .with_system("You are a helpful maths tutor.")
                .with_max_tokens(300),
        );

        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "What is 2+2?");
        assert_eq!(body["max_tokens"], 300);
    }

    #[tokio::test]
    async fn test_embed_empty_input_needs_no_key() {
        let embedder = OpenAiEmbedder::new(reqwest::Client::new(), &config());
        assert!(embedder.embed(Vec::new()).await.unwrap().is_empty());
        assert!(embedder.embed(vec!["x".into()]).await.is_err());
    }
}
