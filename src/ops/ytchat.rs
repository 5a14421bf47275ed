//! Question answering over YouTube transcripts.
//!
//! Loading a video fetches its transcript, asks the model whether it is study
//! material, then splits it into overlapping chunks and embeds them. Questions
//! are answered from the closest chunks only.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use super::{OpError, Outcome};
use crate::services::{CompletionRequest, Embedder, TextGenerator, TextStream, TranscriptFetcher};

pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;
pub const TOP_K: usize = 4;
const CLASSIFIER_SNIPPET_CHARS: usize = 2000;

const WATCH_ID_PATTERN: &str = r"v=([^&]+)";
const SHORT_ID_PATTERN: &str = r"youtu\.be/([^?]+)";

/// Pulls video ids out of `watch?v=` and `youtu.be/` URLs.
pub struct VideoUrlParser {
    patterns: [Regex; 2],
}

impl VideoUrlParser {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            patterns: [Regex::new(WATCH_ID_PATTERN)?, Regex::new(SHORT_ID_PATTERN)?],
        })
    }

    pub fn video_id(&self, url: &str) -> Option<String> {
        self.patterns
            .iter()
            .find_map(|re| re.captures(url).and_then(|c| c.get(1)))
            .map(|m| m.as_str().to_string())
    }
}

/// Split `text` into windows of `size` chars, each starting `size - overlap`
/// chars after the previous one. Windows end on whitespace where possible.
pub fn split_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.trim().chars().collect();
    let size = size.max(1);
    let overlap = overlap.min(size - 1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + size).min(chars.len());
        if end < chars.len() {
            match chars[start..end].iter().rposition(|c| c.is_whitespace()) {
                Some(space) if space > overlap => end = start + space,
                _ => {}
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }
    chunks
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Embedded transcript chunks for one video.
#[derive(Debug)]
pub struct TranscriptIndex {
    chunks: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl TranscriptIndex {
    /// Chunk and embed `transcript`. `None` when there is nothing to index.
    pub async fn build(embedder: &dyn Embedder, transcript: &str) -> anyhow::Result<Option<Self>> {
        let chunks = split_text(transcript, CHUNK_SIZE, CHUNK_OVERLAP);
        if chunks.is_empty() {
            return Ok(None);
        }

        let vectors = embedder.embed(chunks.clone()).await?;
        if vectors.len() != chunks.len() {
            anyhow::bail!(
                "Expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            );
        }

        Ok(Some(Self { chunks, vectors }))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The `k` chunks closest to `query`, best first.
    pub fn nearest(&self, query: &[f32], k: usize) -> Vec<&str> {
        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (cosine_similarity(query, v), i))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored
            .into_iter()
            .take(k)
            .map(|(_, i)| self.chunks[i].as_str())
            .collect()
    }
}

/// Ask the model whether the transcript is school study material.
/// Any model failure counts as "no".
pub async fn is_study_related(generator: &dyn TextGenerator, transcript: &str) -> bool {
    let snippet: String = transcript.chars().take(CLASSIFIER_SNIPPET_CHARS).collect();
    let prompt = format!(
        "You are a content classifier. Classify if the text is educational/study-related \
         content for students preparing for school subjects. Respond with only \"YES\" or \"NO\".\n\n\
         TEXT: \"{}\"\n\nAnswer:",
        snippet
    );

    match generator.complete(CompletionRequest::new(prompt)).await {
        Ok(answer) => answer.to_uppercase().contains("YES"),
        Err(e) => {
            warn!(error = %e, "Study classifier failed");
            false
        }
    }
}

/// Result of loading a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// The index was already cached
    AlreadyLoaded,
    Loaded,
}

impl LoadStatus {
    pub fn message(&self) -> &'static str {
        match self {
            Self::AlreadyLoaded => "Video already loaded and ready.",
            Self::Loaded => "Video processed and is ready for questions.",
        }
    }

    pub fn cached(&self) -> bool {
        matches!(self, Self::AlreadyLoaded)
    }
}

/// Collaborators used by the transcript chat.
pub struct TranscriptChat<'a> {
    pub transcripts: &'a dyn TranscriptFetcher,
    pub generator: &'a dyn TextGenerator,
    pub embedder: &'a dyn Embedder,
}

impl TranscriptChat<'_> {
    /// Fill `slot` with the index for `video_id` unless it is already there.
    pub async fn load(
        &self,
        slot: &mut Option<Arc<TranscriptIndex>>,
        video_id: &str,
    ) -> Outcome<LoadStatus> {
        if slot.is_some() {
            debug!(video_id = %video_id, "Transcript index already cached");
            return Outcome::Answered(LoadStatus::AlreadyLoaded);
        }

        let transcript = match self.transcripts.fetch(video_id.to_string()).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                return Outcome::Failed(OpError::Invalid(
                    "Transcripts are disabled for this video.".to_string(),
                ));
            }
            Err(e) => return Outcome::Failed(OpError::upstream("Failed to fetch transcript", e)),
        };

        if !is_study_related(self.generator, &transcript).await {
            info!(video_id = %video_id, "Refused non-study video");
            return Outcome::Refused("This video is not study-related".to_string());
        }

        let index = match TranscriptIndex::build(self.embedder, &transcript).await {
            Ok(Some(index)) => index,
            Ok(None) => {
                return Outcome::Failed(OpError::Upstream(anyhow::anyhow!(
                    "Failed to process transcript"
                )));
            }
            Err(e) => return Outcome::Failed(OpError::upstream("Failed to process transcript", e)),
        };

        info!(video_id = %video_id, chunks = index.len(), "Indexed transcript");
        *slot = Some(Arc::new(index));
        Outcome::Answered(LoadStatus::Loaded)
    }

    /// Stream an answer to `question` grounded in the closest transcript chunks.
    pub async fn ask(&self, index: &TranscriptIndex, question: &str) -> Result<TextStream, OpError> {
        if question.trim().is_empty() {
            return Err(OpError::Invalid("question is required".to_string()));
        }

        let query = self
            .embedder
            .embed(vec![question.to_string()])
            .await
            .map_err(|e| OpError::upstream("Embedding error", e))?
            .into_iter()
            .next()
            .ok_or_else(|| OpError::Upstream(anyhow::anyhow!("Embedding error: empty response")))?;

        let context = index.nearest(&query, TOP_K).join("\n\n");
        let prompt = format!(
            "You are a helpful assistant.\n\
             Answer the user's question based only on the following context.\n\
             If the context does not contain the answer, say you don't know.\n\n\
             Context:\n{}\n\n\
             Question:\n{}\n",
            context, question
        );

        self.generator
            .complete_stream(CompletionRequest::new(prompt))
            .await
            .map_err(|e| OpError::upstream("Model error", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::BoxFuture;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Two-dimensional embedding: counts of "cell" and "planet".
    struct WordCounts;

    impl Embedder for WordCounts {
        fn embed(&self, texts: Vec<String>) -> BoxFuture<'_, Vec<Vec<f32>>> {
            Box::pin(async move {
                Ok(texts
                    .iter()
                    .map(|t| {
                        let t = t.to_lowercase();
                        vec![
                            t.matches("cell").count() as f32,
                            t.matches("planet").count() as f32,
                        ]
                    })
                    .collect())
            })
        }
    }

    struct Transcript(Option<&'static str>, AtomicUsize);

    impl TranscriptFetcher for Transcript {
        fn fetch(&self, _video_id: String) -> BoxFuture<'_, Option<String>> {
            self.1.fetch_add(1, Ordering::SeqCst);
            let text = self.0.map(str::to_string);
            Box::pin(async move { Ok(text) })
        }
    }

    /// Says YES to classification prompts and echoes the context otherwise.
    struct Classifier(bool);

    impl TextGenerator for Classifier {
        fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, String> {
            let study = self.0;
            Box::pin(async move {
                if request.prompt.starts_with("You are a content classifier") {
                    Ok(if study { "YES" } else { "NO" }.to_string())
                } else {
                    Ok(request.prompt)
                }
            })
        }
    }

    #[test]
    fn test_video_id_from_url() {
        let urls = VideoUrlParser::new().unwrap();
        assert_eq!(
            urls.video_id("https://www.youtube.com/watch?v=abc123&t=10").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            urls.video_id("https://youtu.be/xyz789?si=share").as_deref(),
            Some("xyz789")
        );
        assert_eq!(urls.video_id("https://example.com/video"), None);
    }

    #[test]
    fn test_split_text_overlaps_and_covers() {
        let text = "word ".repeat(500);
        let chunks = split_text(&text, 100, 20);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        assert!(split_text("   ", 100, 20).is_empty());
        assert_eq!(split_text("short", 100, 20), vec!["short".to_string()]);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_load_then_reload_is_cached() {
        let fetcher = Transcript(
            Some("Cells divide by mitosis. Each cell copies its DNA."),
            AtomicUsize::new(0),
        );
        let chat = TranscriptChat {
            transcripts: &fetcher,
            generator: &Classifier(true),
            embedder: &WordCounts,
        };

        let mut slot = None;
        assert!(matches!(
            chat.load(&mut slot, "vid").await,
            Outcome::Answered(LoadStatus::Loaded)
        ));
        assert!(matches!(
            chat.load(&mut slot, "vid").await,
            Outcome::Answered(LoadStatus::AlreadyLoaded)
        ));
        assert_eq!(fetcher.1.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_study_video_is_refused() {
        let fetcher = Transcript(Some("Top ten goals of the season"), AtomicUsize::new(0));
        let chat = TranscriptChat {
            transcripts: &fetcher,
            generator: &Classifier(false),
            embedder: &WordCounts,
        };

        let mut slot = None;
        assert!(chat.load(&mut slot, "vid").await.is_refused());
        assert!(slot.is_none());
    }

    #[tokio::test]
    async fn test_disabled_transcript_is_invalid() {
        let fetcher = Transcript(None, AtomicUsize::new(0));
        let chat = TranscriptChat {
            transcripts: &fetcher,
            generator: &Classifier(true),
            embedder: &WordCounts,
        };

        let mut slot = None;
        assert!(matches!(
            chat.load(&mut slot, "vid").await,
            Outcome::Failed(OpError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_ask_uses_nearest_chunks() {
        let index = TranscriptIndex {
            chunks: vec!["Planets orbit stars.".to_string(), "A cell has a nucleus.".to_string()],
            vectors: vec![vec![0.0, 1.0], vec![1.0, 0.0]],
        };
        assert_eq!(index.nearest(&[1.0, 0.0], 1), vec!["A cell has a nucleus."]);

        let fetcher = Transcript(None, AtomicUsize::new(0));
        let chat = TranscriptChat {
            transcripts: &fetcher,
            generator: &Classifier(true),
            embedder: &WordCounts,
        };
        let stream = chat.ask(&index, "What is in a cell?").await.unwrap();
        let answer: String = stream.map(|r| r.unwrap()).collect::<Vec<_>>().await.concat();
        assert!(answer.contains("A cell has a nucleus."));
        assert!(answer.contains("What is in a cell?"));
    }
}
