//! Conversational routes: transcript chat, tutor and education chat.

use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use futures::{StreamExt, stream};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::AppState;
use super::error::ApiError;
use super::identity::Actor;
use crate::audit::ActivityLogger;
use crate::auth::ResolvedIdentity;
use crate::ops::tutor::{self, DEFAULT_CONVERSATION};
use crate::ops::ytchat::TranscriptChat;
use crate::ops::{OpError, Outcome, educhat};
use crate::services::TextStream;

/// Longest answer kept in the activity record of a streamed chat.
const LOGGED_ANSWER_CHARS: usize = 5000;

fn transcript_chat(state: &AppState) -> TranscriptChat<'_> {
    TranscriptChat {
        transcripts: state.services.transcripts.as_ref(),
        generator: state.services.generator.as_ref(),
        embedder: state.services.embedder.as_ref(),
    }
}

#[derive(Debug, Deserialize)]
pub struct LoadVideoRequest {
    pub video_url: String,
}

pub async fn load_video(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<LoadVideoRequest>,
) -> Result<Json<Value>, ApiError> {
    let video_id = state
        .video_urls
        .video_id(&payload.video_url)
        .ok_or_else(|| ApiError::BadRequest("Invalid YouTube URL".to_string()))?;
    let logger = state.infra.activity_log().await?;

    let status = {
        let mut slot = state.transcripts.lock(&video_id).await;
        match transcript_chat(&state).load(&mut slot, &video_id).await {
            Outcome::Answered(status) => status,
            Outcome::Refused(reason) => return Err(ApiError::Refused(reason)),
            Outcome::Failed(e) => return Err(e.into()),
        }
    };

    logger
        .record(
            &actor,
            "yt_chat",
            json!({
                "action": "load_video",
                "video_id": video_id,
                "url": payload.video_url,
                "cached": status.cached(),
            }),
            json!({ "status": "ready" }),
        )
        .await?;

    Ok(Json(json!({
        "status": "success",
        "video_id": video_id,
        "message": status.message(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct AskVideoRequest {
    pub video_id: String,
    pub question: String,
}

/// Forward `inner` and record the joined answer once it is exhausted.
///
/// Dropping the returned stream early skips the record.
fn record_when_done(
    inner: TextStream,
    logger: ActivityLogger,
    actor: ResolvedIdentity,
    input: Value,
) -> TextStream {
    struct Pending {
        inner: TextStream,
        answer: String,
        finish: Option<(ActivityLogger, ResolvedIdentity, Value)>,
    }

    let pending = Pending {
        inner,
        answer: String::new(),
        finish: Some((logger, actor, input)),
    };

    Box::pin(stream::unfold(pending, |mut pending| async move {
        match pending.inner.next().await {
            Some(Ok(fragment)) => {
                pending.answer.push_str(&fragment);
                Some((Ok(fragment), pending))
            }
            Some(Err(e)) => Some((Err(e), pending)),
            None => {
                if let Some((logger, actor, input)) = pending.finish.take() {
                    let answer: String = pending.answer.chars().take(LOGGED_ANSWER_CHARS).collect();
                    logger
                        .record_best_effort(&actor, "yt_chat", input, json!({ "answer": answer }))
                        .await;
                }
                None
            }
        }
    }))
}

pub async fn ask_video(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<AskVideoRequest>,
) -> Result<Response, ApiError> {
    let index = state
        .transcripts
        .lock_existing(&payload.video_id)
        .await
        .and_then(|slot| slot.clone())
        .ok_or_else(|| OpError::NotFound("Video not loaded".to_string()))?;

    let logger = state.infra.activity_log().await?;
    let answer = transcript_chat(&state).ask(&index, &payload.question).await?;
    debug!(video_id = %payload.video_id, "Streaming transcript answer");

    let input = json!({
        "action": "ask_question",
        "video_id": payload.video_id,
        "question": payload.question,
    });
    let body = Body::from_stream(record_when_done(answer, logger, actor, input));

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}

#[derive(Debug, Deserialize)]
pub struct TutorQuery {
    pub conversation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TutorRequest {
    pub subject: String,
    pub question: String,
}

pub async fn ask_tutor(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(query): Query<TutorQuery>,
    Json(payload): Json<TutorRequest>,
) -> Result<Json<Value>, ApiError> {
    let conversation_id = query
        .conversation_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| DEFAULT_CONVERSATION.to_string());
    let logger = state.infra.activity_log().await?;

    let (response, chat_history) = {
        let mut history = state.conversations.lock(&conversation_id).await;
        let response = tutor::ask(
            state.services.tutor.as_ref(),
            &mut history,
            &payload.subject,
            &payload.question,
        )
        .await?;
        (response, history.clone())
    };
    info!(conversation_id = %conversation_id, turns = chat_history.len(), "Tutor answered");

    logger
        .record(
            &actor,
            "tutor",
            json!({
                "subject": payload.subject,
                "question": payload.question,
                "conversation_id": conversation_id,
            }),
            json!({ "response": response }),
        )
        .await?;

    Ok(Json(json!({
        "response": response,
        "chat_history": chat_history,
    })))
}

#[derive(Debug, Deserialize)]
pub struct EduChatRequest {
    #[serde(default)]
    pub question: String,
}

pub async fn edu_chat(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<EduChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let question = payload.question.trim().to_string();
    let logger = state.infra.activity_log().await?;

    match educhat::chat(&state.gate, state.services.generator.as_ref(), &question).await {
        Outcome::Answered(answer) => {
            logger
                .record(
                    &actor,
                    "edu_chat",
                    json!({ "question": question }),
                    json!({ "answer": answer }),
                )
                .await?;
            Ok(Json(json!({ "answer": answer })))
        }
        Outcome::Refused(reason) => {
            logger
                .record(
                    &actor,
                    "edu_chat",
                    json!({ "question": question }),
                    json!({ "refused": true, "reason": "non-educational or explicit" }),
                )
                .await?;
            Err(ApiError::Refused(reason))
        }
        Outcome::Failed(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_conversation_id() {
        let query: TutorQuery = serde_json::from_value(json!({})).unwrap();
        assert_eq!(
            query
                .conversation_id
                .unwrap_or_else(|| DEFAULT_CONVERSATION.to_string()),
            "default"
        );
    }
}
