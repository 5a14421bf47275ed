use serde::Serialize;
use tracing::debug;

use super::OpError;
use crate::services::{CompletionRequest, OcrEngine, TextGenerator};

#[derive(Debug, Clone, Serialize)]
pub struct DoubtAnswer {
    pub extracted_text: String,
    pub answer: String,
}

fn answer_prompt(question: &str) -> String {
    format!(
        "You are a study assistant for students.\n\
         The following question was extracted from an image:\n\n\
         {}\n\n\
         Provide a clear, step-by-step, student-friendly answer.",
        question
    )
}

/// Read the question off an image and answer it.
pub async fn solve(
    ocr: &dyn OcrEngine,
    generator: &dyn TextGenerator,
    image: Vec<u8>,
) -> Result<DoubtAnswer, OpError> {
    let extracted_text = ocr
        .extract_text(image)
        .await
        .map_err(|e| OpError::upstream("OCR error", e))?
        .trim()
        .to_string();

    if extracted_text.is_empty() {
        return Err(OpError::Invalid("No text found in image.".to_string()));
    }
    debug!(chars = extracted_text.len(), "Extracted question text");

    let answer = generator
        .complete(CompletionRequest::new(answer_prompt(&extracted_text)))
        .await
        .map_err(|e| OpError::upstream("Gemini error", e))?;

    let answer = if answer.trim().is_empty() {
        "No answer generated.".to_string()
    } else {
        answer.trim().to_string()
    };

    Ok(DoubtAnswer {
        extracted_text,
        answer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::BoxFuture;

    struct FixedOcr(&'static str);

    impl OcrEngine for FixedOcr {
        fn extract_text(&self, _image: Vec<u8>) -> BoxFuture<'_, String> {
            let text = self.0.to_string();
            Box::pin(async move { Ok(text) })
        }
    }

    struct Echo;

    impl TextGenerator for Echo {
        fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, String> {
            Box::pin(async move { Ok(format!("answer to: {}", request.prompt.len())) })
        }
    }

    #[tokio::test]
    async fn test_solve_answers_extracted_question() {
        let result = solve(&FixedOcr("  2x + 3 = 7  "), &Echo, vec![0u8; 4])
            .await
            .unwrap();
        assert_eq!(result.extracted_text, "2x + 3 = 7");
        assert!(result.answer.starts_with("answer to:"));
    }

    #[tokio::test]
    async fn test_blank_image_is_rejected() {
        let result = solve(&FixedOcr("   \n"), &Echo, Vec::new()).await;
        assert!(matches!(result, Err(OpError::Invalid(msg)) if msg == "No text found in image."));
    }
}
