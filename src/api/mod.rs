// REST API for the study tools

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post, put},
};
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::TokenCodec;
use crate::cache::KeyedCache;
use crate::config::CacheConfig;
use crate::infra::Infrastructure;
use crate::ops::educhat::EducationGate;
use crate::ops::tutor::HistoryEntry;
use crate::ops::ytchat::{TranscriptIndex, VideoUrlParser};
use crate::services::Services;

pub mod auth;
pub mod chat;
pub mod error;
pub mod identity;
pub mod tools;


pub use error::ApiError;

pub const API_TITLE: &str = "BrainBuddy AIO API";

/// Uploads larger than this are rejected before reaching a handler.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Shared state behind every route.
pub struct AppContext {
    pub infra: Arc<Infrastructure>,
    pub codec: TokenCodec,
    pub services: Services,
    pub gate: EducationGate,
    pub video_urls: VideoUrlParser,
    /// Tutor histories by conversation id
    pub conversations: KeyedCache<Vec<HistoryEntry>>,
    /// Transcript indexes by video id
    pub transcripts: KeyedCache<Option<Arc<TranscriptIndex>>>,
}

impl AppContext {
    pub fn new(
        infra: Arc<Infrastructure>,
        codec: TokenCodec,
        services: Services,
        cache: &CacheConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            infra,
            codec,
            services,
            gate: EducationGate::new()?,
            video_urls: VideoUrlParser::new()?,
            conversations: KeyedCache::new(
                "conversations",
                cache.conversation_capacity,
                cache.idle_ttl,
            ),
            transcripts: KeyedCache::new("transcripts", cache.transcript_capacity, cache.idle_ttl),
        })
    }
}

pub type AppState = Arc<AppContext>;

fn cors_layer(allow_origins: &[String]) -> CorsLayer {
    if allow_origins.is_empty() || allow_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allow_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Service index listing the route entry points under `prefix`.
fn route_index(prefix: &str) -> Value {
    json!({
        "status": "ok",
        "title": API_TITLE,
        "version": env!("CARGO_PKG_VERSION"),
        "routes": {
            "auth": format!("{prefix}/auth"),
            "doubt": format!("{prefix}/doubt/solve"),
            "essay": format!("{prefix}/essay/analyze"),
            "notes": format!("{prefix}/notes/summarize"),
            "study": format!("{prefix}/study/plan"),
            "ytchat_load": format!("{prefix}/ytchat/load"),
            "ytchat_ask": format!("{prefix}/ytchat/ask"),
            "aitutor": format!("{prefix}/aitutor/ask"),
            "educhat": format!("{prefix}/educhat/chat"),
            "health": format!("{prefix}/healthz"),
        },
    })
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Build the full router, nested under `api_prefix` when one is set.
pub fn create_router(state: AppState, api_prefix: &str, cors_allow_origins: &[String]) -> Router {
    let index = route_index(api_prefix);

    let routes = Router::new()
        .route(
            "/",
            get(move || {
                let index = index.clone();
                async move { Json(index) }
            }),
        )
        .route("/healthz", get(health_check))
        .route("/auth/register", post(auth::register))
        .route("/auth/token", post(auth::login))
        .route("/auth/me", get(auth::me).put(auth::update_me))
        .route("/auth/users", get(auth::list_users))
        .route("/auth/users/{id}", put(auth::update_user))
        .route(
            "/auth/students/link",
            post(auth::link_student).put(auth::link_student),
        )
        .route("/doubt/solve", post(tools::solve_doubt))
        .route("/essay/analyze", post(tools::analyze_essay))
        .route("/notes/summarize", post(tools::summarize_notes))
        .route("/study/plan", post(tools::make_study_plan))
        .route("/ytchat/load", post(chat::load_video))
        .route("/ytchat/ask", post(chat::ask_video))
        .route("/aitutor/ask", post(chat::ask_tutor))
        .route("/educhat/chat", post(chat::edu_chat))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);

    let router = if api_prefix.is_empty() {
        routes
    } else {
        Router::new().nest(api_prefix, routes)
    };

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(cors_allow_origins)),
    )
}
