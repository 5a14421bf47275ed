//! Essay score prediction served over HTTP.

use anyhow::Context;
use serde_json::{Value, json};

use super::{BoxFuture, ScorePredictor};

/// POSTs `{"essay": ...}` and reads `score` or `predicted_score` back.
pub struct HttpScorePredictor {
    http: reqwest::Client,
    url: Option<String>,
}

impl HttpScorePredictor {
    pub fn new(http: reqwest::Client, url: Option<String>) -> Self {
        Self { http, url }
    }
}

pub(crate) fn score_from_response(value: &Value) -> Option<f64> {
    ["score", "predicted_score"].iter().find_map(|key| match &value[*key] {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(items) => items.first().and_then(Value::as_f64),
        _ => None,
    })
}

impl ScorePredictor for HttpScorePredictor {
    fn predict(&self, essay: String) -> BoxFuture<'_, f64> {
        Box::pin(async move {
            let url = self
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("ESSAY_SCORER_URL is not set"))?;

            let response = self
                .http
                .post(url)
                .json(&json!({ "essay": essay }))
                .send()
                .await
                .context("Score predictor request failed")?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("Score predictor returned {}: {}", status, body);
            }

            let value: Value = response.json().await?;
            score_from_response(&value)
                .ok_or_else(|| anyhow::anyhow!("Score predictor response had no score"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_from_response_shapes() {
        assert_eq!(score_from_response(&json!({"score": 7.5})), Some(7.5));
        assert_eq!(score_from_response(&json!({"predicted_score": "4"})), Some(4.0));
        assert_eq!(score_from_response(&json!({"score": [3.0]})), Some(3.0));
        assert_eq!(score_from_response(&json!({"other": 1})), None);
    }

    #[tokio::test]
    async fn test_unconfigured_predictor_fails() {
        let predictor = HttpScorePredictor::new(reqwest::Client::new(), None);
        assert!(predictor.predict("essay".into()).await.is_err());
    }
}
