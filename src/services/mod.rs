//! External collaborators: hosted models, OCR, document extraction, transcripts.
//!
//! Each collaborator is a trait object so routes can be exercised with stubs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use futures::Stream;
use futures::stream;

use crate::config::ModelConfig;

pub mod documents;
pub mod gemini;
pub mod ocr;
pub mod openai;
pub mod scorer;
pub mod youtube;

pub use documents::CommandDocumentExtractor;
pub use gemini::GeminiClient;
pub use ocr::TesseractOcr;
pub use openai::{OpenAiChat, OpenAiEmbedder};
pub use scorer::HttpScorePredictor;
pub use youtube::YouTubeTranscripts;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Lazily produced text fragments.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One prompt for a text generator.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.3,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Prompt in, text out.
pub trait TextGenerator: Send + Sync {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, String>;

    /// Stream the answer as it is produced. The default yields one fragment.
    fn complete_stream(&self, request: CompletionRequest) -> BoxFuture<'_, TextStream> {
        Box::pin(async move {
            let text = self.complete(request).await?;
            let stream: TextStream = Box::pin(stream::once(async move { Ok(text) }));
            Ok(stream)
        })
    }
}

/// Image bytes in, recognized text out.
pub trait OcrEngine: Send + Sync {
    fn extract_text(&self, image: Vec<u8>) -> BoxFuture<'_, String>;
}

/// Supported note formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    /// Kind from a file name's extension (case-insensitive).
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".pdf") {
            Some(Self::Pdf)
        } else if lower.ends_with(".docx") {
            Some(Self::Docx)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

/// Document bytes in, plain text out.
pub trait DocumentExtractor: Send + Sync {
    fn extract_text(&self, kind: DocumentKind, bytes: Vec<u8>) -> BoxFuture<'_, String>;
}

/// Essay text in, numeric grade out.
pub trait ScorePredictor: Send + Sync {
    fn predict(&self, essay: String) -> BoxFuture<'_, f64>;
}

/// Video id in, transcript text out. `None` when the video has no transcript.
pub trait TranscriptFetcher: Send + Sync {
    fn fetch(&self, video_id: String) -> BoxFuture<'_, Option<String>>;
}

/// Texts in, one embedding vector per text out.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: Vec<String>) -> BoxFuture<'_, Vec<Vec<f32>>>;
}

/// The collaborator set a running server uses.
#[derive(Clone)]
pub struct Services {
    /// Answers, summaries, plans, explanations and chat
    pub generator: Arc<dyn TextGenerator>,
    /// Tutoring conversations
    pub tutor: Arc<dyn TextGenerator>,
    pub ocr: Arc<dyn OcrEngine>,
    pub documents: Arc<dyn DocumentExtractor>,
    pub scorer: Arc<dyn ScorePredictor>,
    pub transcripts: Arc<dyn TranscriptFetcher>,
    pub embedder: Arc<dyn Embedder>,
}

impl Services {
    /// Production collaborators configured from `config`.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            generator: Arc::new(GeminiClient::new(http.clone(), config)),
            tutor: Arc::new(OpenAiChat::new(http.clone(), config)),
            ocr: Arc::new(TesseractOcr::new(config.tesseract_bin.clone())),
            documents: Arc::new(CommandDocumentExtractor::new(
                config.pdftotext_bin.clone(),
                config.pandoc_bin.clone(),
            )),
            scorer: Arc::new(HttpScorePredictor::new(
                http.clone(),
                config.essay_scorer_url.clone(),
            )),
            transcripts: Arc::new(YouTubeTranscripts::new(http.clone())?),
            embedder: Arc::new(OpenAiEmbedder::new(http, config)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct Echo;

    impl TextGenerator for Echo {
        fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, String> {
            Box::pin(async move { Ok(request.prompt) })
        }
    }

    #[tokio::test]
    async fn test_default_stream_yields_single_fragment() {
        let stream = Echo
            .complete_stream(CompletionRequest::new("hello"))
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(fragments, vec!["hello".to_string()]);
    }

    #[test]
    fn test_document_kind_from_filename() {
        assert_eq!(DocumentKind::from_filename("Notes.PDF"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_filename("a.docx"), Some(DocumentKind::Docx));
        assert_eq!(DocumentKind::from_filename("a.doc"), None);
        assert_eq!(DocumentKind::from_filename("pdf"), None);
    }
}
