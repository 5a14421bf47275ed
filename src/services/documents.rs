//! Plain-text extraction from PDF and DOCX notes via command-line tools.

use tracing::debug;

use super::ocr::run_filter;
use super::{BoxFuture, DocumentExtractor, DocumentKind};

/// `pdftotext` for PDFs, `pandoc` for DOCX.
pub struct CommandDocumentExtractor {
    pdftotext: String,
    pandoc: String,
}

impl CommandDocumentExtractor {
    pub fn new(pdftotext: impl Into<String>, pandoc: impl Into<String>) -> Self {
        Self {
            pdftotext: pdftotext.into(),
            pandoc: pandoc.into(),
        }
    }

    async fn extract_docx(&self, bytes: Vec<u8>) -> anyhow::Result<String> {
        // pandoc needs a seekable input for zip containers
        let path = std::env::temp_dir().join(format!("{}.docx", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&path, &bytes).await?;

        let path_arg = path.to_string_lossy().into_owned();
        let result = run_filter(
            &self.pandoc,
            &["-f", "docx", "-t", "plain", "--wrap=none", &path_arg],
            Vec::new(),
        )
        .await;

        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!(path = %path.display(), error = %e, "Failed to remove temp file");
        }
        result
    }
}

impl DocumentExtractor for CommandDocumentExtractor {
    fn extract_text(&self, kind: DocumentKind, bytes: Vec<u8>) -> BoxFuture<'_, String> {
        Box::pin(async move {
            let text = match kind {
                DocumentKind::Pdf => {
                    run_filter(&self.pdftotext, &["-layout", "-", "-"], bytes).await?
                }
                DocumentKind::Docx => self.extract_docx(bytes).await?,
            };
            Ok(text.trim().to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_tool_is_an_error() {
        let extractor = CommandDocumentExtractor::new("no-such-pdftotext", "no-such-pandoc");
        assert!(
            extractor
                .extract_text(DocumentKind::Pdf, b"%PDF-1.4".to_vec())
                .await
                .is_err()
        );
        assert!(
            extractor
                .extract_text(DocumentKind::Docx, b"PK".to_vec())
                .await
                .is_err()
        );
    }
}
