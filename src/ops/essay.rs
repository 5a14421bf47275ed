use serde::Serialize;

use super::OpError;
use crate::services::{CompletionRequest, ScorePredictor, TextGenerator};

#[derive(Debug, Clone, Serialize)]
pub struct EssayAnalysis {
    pub essay: String,
    pub predicted_score: f64,
    pub explanation: String,
}

fn explanation_prompt(essay: &str, score: f64) -> String {
    format!(
        "You are an English Language expert. Analyze the essay:\n{}\n\n\
         This essay has a score of {}. Explain in 2 lines why this score was assigned. \
         If you did not receive the essay, say you did not receive it.",
        essay, score
    )
}

/// Score an essay and explain the score.
pub async fn analyze(
    scorer: &dyn ScorePredictor,
    generator: &dyn TextGenerator,
    essay: &str,
) -> Result<EssayAnalysis, OpError> {
    let essay = essay.trim();
    if essay.is_empty() {
        return Err(OpError::Invalid("Essay text is required.".to_string()));
    }

    let predicted_score = scorer
        .predict(essay.to_string())
        .await
        .map_err(|e| OpError::upstream("Model prediction error", e))?;

    let explanation = generator
        .complete(
            CompletionRequest::new(explanation_prompt(essay, predicted_score)).with_temperature(0.2),
        )
        .await
        .map_err(|e| OpError::upstream("LLM error", e))?;

    Ok(EssayAnalysis {
        essay: essay.to_string(),
        predicted_score,
        explanation,
    })
}
