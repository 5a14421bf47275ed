//! Google Gemini text generation over the REST API.

use anyhow::{Context, Result};
use futures::{Stream, StreamExt, stream};
use serde_json::{Value, json};
use tracing::debug;

use super::{BoxFuture, CompletionRequest, TextGenerator, TextStream};
use crate::config::ModelConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, config: &ModelConfig) -> Self {
        Self {
            http,
            api_key: config.google_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("GOOGLE_API_KEY is not set"))
    }

    fn request_body(request: &CompletionRequest) -> Value {
        let mut generation_config = json!({ "temperature": request.temperature });
        if let Some(max_tokens) = request.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }

        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": generation_config,
        });
        if let Some(system) = &request.system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }

    async fn post(
        &self,
        method: &str,
        query: &[(&str, &str)],
        request: &CompletionRequest,
    ) -> Result<reqwest::Response> {
        let url = url::Url::parse_with_params(
            &format!("{}/models/{}:{}", self.base_url, self.model, method),
            query,
        )?;
        debug!(model = %self.model, method, "Calling Gemini");

        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", self.api_key()?)
            .json(&Self::request_body(request))
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini returned {}: {}", status, body);
        }
        Ok(response)
    }
}

/// Concatenated text parts of the first candidate.
pub(crate) fn candidate_text(response: &Value) -> String {
    response["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// `data:` payloads of a server-sent event stream.
pub(crate) fn sse_data(response: reqwest::Response) -> impl Stream<Item = Result<String>> + Send {
    let bytes = Box::pin(response.bytes_stream());

    stream::unfold(
        (bytes, Vec::<u8>::new(), false),
        |(mut bytes, mut buffer, mut exhausted)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    if let Some(data) = line.trim_end().strip_prefix("data:") {
                        let data = data.trim_start().to_string();
                        return Some((Ok(data), (bytes, buffer, exhausted)));
                    }
                    continue;
                }

                if exhausted {
                    let rest = String::from_utf8_lossy(&buffer).trim().to_string();
                    buffer.clear();
                    return rest
                        .strip_prefix("data:")
                        .map(|data| (Ok(data.trim_start().to_string()), (bytes, buffer, true)));
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        return Some((Err(anyhow::Error::from(e)), (bytes, buffer, true)));
                    }
                    None => exhausted = true,
                }
            }
        },
    )
}

impl TextGenerator for GeminiClient {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, String> {
        Box::pin(async move {
            let response = self.post("generateContent", &[], &request).await?;
            let value: Value = response.json().await?;
            let text = candidate_text(&value);
            Ok(text.trim().to_string())
        })
    }

    fn complete_stream(&self, request: CompletionRequest) -> BoxFuture<'_, TextStream> {
        Box::pin(async move {
            let response = self
                .post("streamGenerateContent", &[("alt", "sse")], &request)
                .await?;

            let fragments = sse_data(response).filter_map(|event| async move {
                match event {
                    Ok(data) => match serde_json::from_str::<Value>(&data) {
                        Ok(value) => {
                            let text = candidate_text(&value);
                            (!text.is_empty()).then_some(Ok(text))
                        }
                        Err(e) => Some(Err(anyhow::anyhow!("Malformed Gemini event: {}", e))),
                    },
                    Err(e) => Some(Err(e)),
                }
            });

            let stream: TextStream = Box::pin(fragments);
            Ok(stream)
        })
    }
}
