use super::OpError;
use crate::services::{CompletionRequest, DocumentExtractor, DocumentKind, TextGenerator};

pub const MIN_EXTRACTED_CHARS: usize = 20;

fn summary_prompt(text: &str) -> String {
    format!(
        "You are an AI study assistant.\n\
         Summarize the following educational content for a 10th-grade student.\n\
         Use short sentences, bullet points, and highlight key concepts.\n\
         Match the summary length to the content, like a textbook would.\n\n\
         Content:\n{}",
        text
    )
}

/// Extract the text of an uploaded note and summarize it.
pub async fn summarize(
    documents: &dyn DocumentExtractor,
    generator: &dyn TextGenerator,
    kind: DocumentKind,
    bytes: Vec<u8>,
) -> Result<String, OpError> {
    let text = documents
        .extract_text(kind, bytes)
        .await
        .map_err(|e| OpError::upstream(&format!("{} extraction error", kind.as_str().to_uppercase()), e))?;

    if text.trim().chars().count() < MIN_EXTRACTED_CHARS {
        return Err(OpError::Invalid(
            "Extracted text is too short or empty.".to_string(),
        ));
    }

    let summary = generator
        .complete(CompletionRequest::new(summary_prompt(text.trim())))
        .await
        .map_err(|e| OpError::upstream("Gemini summarization error", e))?;

    if summary.trim().is_empty() {
        Ok("No summary generated.".to_string())
    } else {
        Ok(summary.trim().to_string())
    }
}
