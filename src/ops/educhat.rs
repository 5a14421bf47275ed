//! Education-only chat.

use regex::Regex;
use tracing::debug;

use super::{OpError, Outcome};
use crate::services::{CompletionRequest, TextGenerator};

pub const REFUSAL_MESSAGE: &str =
    "This chatbot only answers education-related, non-explicit questions.";

const EDU_KEYWORDS: &[&str] = &[
    "math", "mathematics", "algebra", "geometry", "calculus", "trigonometry", "probability",
    "statistics", "science", "physics", "chemistry", "biology", "geology", "astronomy", "english",
    "grammar", "vocabulary", "literature", "writing", "essay", "reading", "comprehension",
    "history", "civics", "geography", "economics", "political", "social studies",
    "socialstudies", "computer", "coding", "programming", "python", "java", "c++", "algorithms",
    "data structures", "study", "exam", "test", "homework", "assignment", "syllabus",
    "curriculum", "revision", "notes",
];

/// Openers that mark a question as a request to learn something.
const LEARNING_OPENERS: &[&str] = &[
    "explain", "define", "describe", "solve", "calculate", "what is", "what are", "how does",
    "how do", "why does", "why do", "why is",
];

const EXPLICIT_PATTERN: &str = r"(?i)\b(18\+|16\+|nsfw|porn|sex|sexual|nude|naked|erotic|fetish|bdsm|incest|rape|bestiality|onlyfans|boobs|penis|vagina|semen|cum|anal|oral|blowjob|handjob|hookup|escort|explicit)\b";

const SYSTEM_PROMPT: &str = "You are an education-only tutor. Answer briefly and clearly for a \
     school audience. Refuse anything unrelated to school subjects, study skills, or learning help.";

/// Decides whether a question is fit for the education chat.
pub struct EducationGate {
    explicit: Regex,
}

impl EducationGate {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            explicit: Regex::new(EXPLICIT_PATTERN)?,
        })
    }

    /// Not explicit, and either mentions a school topic or asks to learn.
    pub fn is_educational(&self, question: &str) -> bool {
        let text = question.trim().to_lowercase();
        if self.explicit.is_match(&text) {
            return false;
        }

        EDU_KEYWORDS.iter().any(|k| text.contains(k))
            || LEARNING_OPENERS.iter().any(|opener| text.starts_with(opener))
    }
}

/// Answer `question` if the gate allows it.
pub async fn chat(
    gate: &EducationGate,
    generator: &dyn TextGenerator,
    question: &str,
) -> Outcome<String> {
    let question = question.trim();
    if question.is_empty() {
        return Outcome::Failed(OpError::Invalid("question is required".to_string()));
    }

    if !gate.is_educational(question) {
        debug!("Refused non-educational question");
        return Outcome::Refused(REFUSAL_MESSAGE.to_string());
    }

    let request = CompletionRequest::new(format!("Question: {}\n\nAnswer:", question))
        .with_system(SYSTEM_PROMPT);

    match generator.complete(request).await {
        Ok(answer) => Outcome::Answered(answer.trim().to_string()),
        Err(e) => Outcome::Failed(OpError::upstream("model_error", e)),
    }
}
