//! English transcripts from YouTube's timed-text endpoint.

use anyhow::Context;
use regex::Regex;
use tracing::debug;

use super::{BoxFuture, TranscriptFetcher};

const TIMEDTEXT_URL: &str = "https://www.youtube.com/api/timedtext";

const CAPTION_PATTERN: &str = r"(?s)<text[^>]*>(.*?)</text>";

pub struct YouTubeTranscripts {
    http: reqwest::Client,
    base_url: String,
    captions: Regex,
}

impl YouTubeTranscripts {
    pub fn new(http: reqwest::Client) -> anyhow::Result<Self> {
        Ok(Self {
            http,
            base_url: TIMEDTEXT_URL.to_string(),
            captions: Regex::new(CAPTION_PATTERN)?,
        })
    }
}

fn unescape_entities(text: &str) -> String {
    text.replace("&amp;#39;", "'")
        .replace("&amp;quot;", "\"")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Join caption lines of a timed-text XML document with single spaces.
pub(crate) fn parse_timedtext(captions: &Regex, xml: &str) -> String {
    let lines: Vec<String> = captions
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| unescape_entities(m.as_str()).replace('\n', " "))
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    lines.join(" ")
}

impl TranscriptFetcher for YouTubeTranscripts {
    fn fetch(&self, video_id: String) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move {
            debug!(video_id = %video_id, "Fetching transcript");
            let url = url::Url::parse_with_params(
                &self.base_url,
                &[("lang", "en"), ("v", video_id.as_str())],
            )?;
            let response = self
                .http
                .get(url)
                .send()
                .await
                .context("Failed to fetch transcript")?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                anyhow::bail!("Failed to fetch transcript: HTTP {}", status);
            }

            let body = response.text().await?;
            let transcript = parse_timedtext(&self.captions, &body);
            Ok((!transcript.is_empty()).then_some(transcript))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timedtext() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript>
            <text start="0.5" dur="2.1">Today we study</text>
            <text start="2.6" dur="3">photosynthesis &amp; plants&#39;
leaves</text>
            <text start="5" dur="1"></text>
        </transcript>"#;

        let captions = Regex::new(CAPTION_PATTERN).unwrap();
        assert_eq!(
            parse_timedtext(&captions, xml),
            "Today we study photosynthesis & plants' leaves"
        );
    }

    #[test]
    fn test_parse_empty_document() {
        let captions = Regex::new(CAPTION_PATTERN).unwrap();
        assert_eq!(parse_timedtext(&captions, ""), "");
    }
}
