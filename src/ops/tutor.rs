use serde::{Deserialize, Serialize};

use super::OpError;
use crate::services::{CompletionRequest, TextGenerator};

pub const DEFAULT_CONVERSATION: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
}

/// One turn of a tutoring conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub message: String,
}

fn system_prompt(subject: &str) -> String {
    format!(
        "You are a helpful {subject} tutor.\n\
         Your job:\n\
         1) Understand the learner's question.\n\
         2) Solve it step-by-step with clear reasoning.\n\
         3) State the final answer clearly.\n\
         4) Give a brief recap and 1-2 practice questions.\n\n\
         Rules:\n\
         - Use simple language appropriate for a maximum 10 grade student.\n\
         - If key info is missing, ask a brief clarifying question first, otherwise make a reasonable assumption and say it.\n\
         - Use Markdown with short sections and numbered steps.\n\
         - For math/science, show formulas where helpful (LaTeX allowed).\n\
         - Keep the explanation focused and avoid extra fluff."
    )
}

fn question_prompt(subject: &str, question: &str) -> String {
    format!(
        "Subject: {subject}\n\
         Question: {question}\n\n\
         Respond using this structure:\n\n\
         ### Understanding\n(brief restatement + plan)\n\n\
         ### Step-by-step Solution\n(1. ... 2. ... 3. ...)\n\n\
         ### Final Answer\n(clearly boxed or highlighted)"
    )
}

/// Ask the tutor and record the exchange in `history`.
///
/// `history` is only extended when the model answers.
pub async fn ask(
    generator: &dyn TextGenerator,
    history: &mut Vec<HistoryEntry>,
    subject: &str,
    question: &str,
) -> Result<String, OpError> {
    if question.trim().is_empty() {
        return Err(OpError::Invalid("question is required".to_string()));
    }

    let request = CompletionRequest::new(question_prompt(subject, question))
        .with_system(system_prompt(subject))
        .with_temperature(0.2)
        .with_max_tokens(300);

    let response = generator
        .complete(request)
        .await
        .map_err(|e| OpError::upstream("Tutor error", e))?;

    history.push(HistoryEntry {
        role: Role::Human,
        message: question.to_string(),
    });
    history.push(HistoryEntry {
        role: Role::Ai,
        message: response.clone(),
    });

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::BoxFuture;

    struct Echo;

    impl TextGenerator for Echo {
        fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, String> {
            Box::pin(async move {
                assert_eq!(request.max_tokens, Some(300));
                assert!(request.system.unwrap_or_default().contains("physics tutor"));
                Ok("### Final Answer\n42".to_string())
            })
        }
    }

    struct Failing;

    impl TextGenerator for Failing {
        fn complete(&self, _request: CompletionRequest) -> BoxFuture<'_, String> {
            Box::pin(async move { Err(anyhow::anyhow!("rate limited")) })
        }
    }

    #[tokio::test]
    async fn test_ask_appends_both_turns() {
        let mut history = Vec::new();
        let answer = ask(&Echo, &mut history, "physics", "What is force?").await.unwrap();
        assert_eq!(answer, "### Final Answer\n42");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::Human);
        assert_eq!(history[0].message, "What is force?");
        assert_eq!(history[1].role, Role::Ai);

        ask(&Echo, &mut history, "physics", "And mass?").await.unwrap();
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_answer_leaves_history_untouched() {
        let mut history = Vec::new();
        let err = ask(&Failing, &mut history, "maths", "2+2?").await.unwrap_err();
        assert!(matches!(err, OpError::Upstream(_)));
        assert!(history.is_empty());
    }

    #[test]
    fn test_roles_serialize_lowercase() {
        let entry = HistoryEntry {
            role: Role::Ai,
            message: "hi".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            serde_json::json!({"role": "ai", "message": "hi"})
        );
    }
}
