//! Single-shot study tools: doubt solver, essay grader, notes summarizer and
//! study planner. Each handler runs its operation and then records the
//! activity; a failed record fails the request.

use axum::{
    Json,
    extract::{Multipart, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::info;

use super::AppState;
use super::error::ApiError;
use super::identity::Actor;
use crate::infra::UploadKind;
use crate::ops::essay::EssayAnalysis;
use crate::ops::{OpError, doubt, essay, notes, study};
use crate::services::DocumentKind;

/// One file taken from a multipart form.
struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

async fn read_upload(multipart: &mut Multipart, field_name: &str) -> Result<Upload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(field_name) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        return Ok(Upload {
            filename,
            bytes: bytes.to_vec(),
        });
    }

    Err(ApiError::BadRequest(format!("Missing '{}' file field", field_name)))
}

/// Lowercased extension of `filename`, empty when it has none.
fn extension_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

pub async fn solve_doubt(
    State(state): State<AppState>,
    Actor(actor): Actor,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let upload = read_upload(&mut multipart, "image").await?;
    let stored = state
        .infra
        .save_upload(UploadKind::Image, &extension_of(&upload.filename), &upload.bytes)
        .await?;
    let path = stored.path.display().to_string();

    let result = doubt::solve(
        state.services.ocr.as_ref(),
        state.services.generator.as_ref(),
        upload.bytes,
    )
    .await?;

    state
        .infra
        .activity_log()
        .await?
        .record(
            &actor,
            "image",
            json!({ "filename": stored.name, "path": path }),
            json!({ "extracted_text": result.extracted_text, "answer": result.answer }),
        )
        .await?;

    Ok(Json(json!({
        "extracted_text": result.extracted_text,
        "answer": result.answer,
        "file": { "filename": stored.name, "path": path },
    })))
}

#[derive(Debug, Deserialize)]
pub struct EssayRequest {
    #[serde(default)]
    pub essay: Option<String>,
}

pub async fn analyze_essay(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<EssayRequest>,
) -> Result<Json<EssayAnalysis>, ApiError> {
    let text = payload.essay.unwrap_or_default();
    let analysis = essay::analyze(
        state.services.scorer.as_ref(),
        state.services.generator.as_ref(),
        &text,
    )
    .await?;

    state
        .infra
        .activity_log()
        .await?
        .record(
            &actor,
            "essay",
            json!({ "text": analysis.essay }),
            json!({
                "predicted_score": analysis.predicted_score,
                "explanation": analysis.explanation,
            }),
        )
        .await?;

    Ok(Json(analysis))
}

pub async fn summarize_notes(
    State(state): State<AppState>,
    Actor(actor): Actor,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let upload = read_upload(&mut multipart, "file").await?;
    let kind = DocumentKind::from_filename(&upload.filename).ok_or_else(|| {
        ApiError::BadRequest("Only .pdf or .docx files are supported.".to_string())
    })?;

    let stored = state
        .infra
        .save_upload(UploadKind::Document, kind.as_str(), &upload.bytes)
        .await?;
    let path = stored.path.display().to_string();
    let sha256 = format!("{:x}", Sha256::digest(&upload.bytes));

    let summary = notes::summarize(
        state.services.documents.as_ref(),
        state.services.generator.as_ref(),
        kind,
        upload.bytes,
    )
    .await?;

    state
        .infra
        .activity_log()
        .await?
        .record(
            &actor,
            kind.as_str(),
            json!({ "filename": stored.name, "path": path, "sha256": sha256 }),
            json!({ "summary": summary }),
        )
        .await?;

    Ok(Json(json!({
        "filename": upload.filename,
        "file": { "filename": stored.name, "path": path },
        "summary": summary,
    })))
}

#[derive(Debug, Deserialize)]
pub struct StudyPlanRequest {
    pub subject: String,
}

pub async fn make_study_plan(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<StudyPlanRequest>,
) -> Result<Json<Value>, ApiError> {
    let link = match actor.grade_claim() {
        Some(_) => None,
        None => {
            let user_id = actor
                .user_id()
                .ok_or_else(|| OpError::Invalid("no user identity".to_string()))?;
            let users = state.infra.users().await?;
            users.get_student_link(user_id.as_str()).await?
        }
    };

    let grade = study::resolve_grade(actor.grade_claim(), link.as_ref())?;
    let subject = study::normalize_subject(&payload.subject, grade)?;
    let plan = study::generate_plan(state.services.generator.as_ref(), grade, &subject).await?;
    info!(user_id = ?actor.user_id(), grade, subject = %subject, "Generated study plan");

    state
        .infra
        .activity_log()
        .await?
        .record(
            &actor,
            "study_plan",
            json!({ "subject": subject, "class_std": grade }),
            json!({ "plan": plan }),
        )
        .await?;

    Ok(Json(json!({
        "class_std": grade,
        "subject": subject,
        "plan": plan,
    })))
}
