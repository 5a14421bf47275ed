use super::OpError;
use crate::db::StudentLinkRecord;
use crate::services::{CompletionRequest, TextGenerator};

pub const MIN_GRADE: u8 = 5;
pub const MAX_GRADE: u8 = 10;

/// Subjects offered to every supported grade.
pub const SUBJECTS: &[&str] = &["english", "maths", "science", "socialstudies", "coding"];

/// Grade for the plan: the token's claim wins over the stored student link.
pub fn resolve_grade(
    token_grade: Option<u8>,
    link: Option<&StudentLinkRecord>,
) -> Result<u8, OpError> {
    if let Some(grade) = token_grade {
        return Ok(grade);
    }

    let link = link.ok_or_else(|| OpError::NotFound("student link not found".to_string()))?;
    u8::try_from(link.class_std).map_err(|_| OpError::Invalid("invalid class_std".to_string()))
}

/// Canonical subject name, if `subject` is offered for `grade`.
pub fn normalize_subject(subject: &str, grade: u8) -> Result<String, OpError> {
    let normalized = subject.trim().to_lowercase();
    let normalized = if normalized == "social studies" {
        "socialstudies".to_string()
    } else {
        normalized
    };

    if (MIN_GRADE..=MAX_GRADE).contains(&grade) && SUBJECTS.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(OpError::Invalid("invalid subject for class_std".to_string()))
    }
}

fn plan_prompt(grade: u8, subject: &str) -> String {
    format!(
        "Generate a 4-week study plan for a student in class {grade} for the subject \"{subject}\".\n\
         Constraints:\n\
         - 6 days per week, 60-90 minutes per day.\n\
         - Mix concept learning, worked examples, active recall, spaced revision, and weekly mini-tests.\n\
         - Use simple language for the student's level.\n\
         - Output format:\n\
         Week 1:\n- Day 1: ...\n- Day 2: ...\n\
         Week 2:\nWeek 3:\nWeek 4:\n\
         Tailor the topics to class {grade} {subject}."
    )
}

/// Generate a four-week plan for `subject` at `grade`.
pub async fn generate_plan(
    generator: &dyn TextGenerator,
    grade: u8,
    subject: &str,
) -> Result<String, OpError> {
    let plan = generator
        .complete(CompletionRequest::new(plan_prompt(grade, subject)))
        .await
        .map_err(|e| OpError::upstream("plan generation failed", e))?;

    let plan = plan.trim();
    if plan.is_empty() {
        return Err(OpError::Upstream(anyhow::anyhow!("plan generation failed")));
    }
    Ok(plan.to_string())
}
