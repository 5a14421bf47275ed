//! Account routes: registration, login, profile, admin and student link.

use axum::{
    Form, Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AppState;
use super::error::ApiError;
use super::identity::{Admin, Member};
use crate::auth::{AuthError, TokenClaims};
use crate::db::{StudentLinkPublic, UserAdminUpdate, UserCreate, UserPublic, UserSelfUpdate};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
pub struct StudentLinkRequest {
    pub email: String,
    pub class_std: i64,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<UserPublic>, ApiError> {
    let users = state.infra.users().await?;
    let user = users
        .register(UserCreate {
            username: payload.username,
            password: payload.password,
            email: payload.email,
            full_name: payload.full_name,
            roles: Vec::new(),
        })
        .await?;

    Ok(Json(UserPublic::from(&user)))
}

pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    let users = state.infra.users().await?;
    let user = users
        .authenticate(&form.username, &form.password)
        .await?
        .ok_or_else(|| AuthError::Unauthorized("Incorrect username or password".to_string()))?;

    let access_token = state
        .codec
        .issue(TokenClaims::for_user(&user.username, &user.user_id))?;
    info!(username = %user.username, "Issued access token");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

/// The caller's profile; a linked student email replaces the account email.
pub async fn me(
    State(state): State<AppState>,
    Member(user): Member,
) -> Result<Json<UserPublic>, ApiError> {
    let users = state.infra.users().await?;
    let mut public = UserPublic::from(&user);
    if let Some(email) = users.linked_email(&user.username).await? {
        public.email = email;
    }
    Ok(Json(public))
}

pub async fn update_me(
    State(state): State<AppState>,
    Member(user): Member,
    Json(update): Json<UserSelfUpdate>,
) -> Result<Json<UserPublic>, ApiError> {
    let users = state.infra.users().await?;
    let updated = users.update_me(&user.username, update).await?;
    Ok(Json(UserPublic::from(&updated)))
}

pub async fn list_users(
    State(state): State<AppState>,
    Admin(_admin): Admin,
) -> Result<Json<Vec<UserPublic>>, ApiError> {
    let users = state.infra.users().await?;
    let records = users.list_users().await?;
    Ok(Json(records.iter().map(UserPublic::from).collect()))
}

pub async fn update_user(
    State(state): State<AppState>,
    Admin(admin): Admin,
    Path(id): Path<String>,
    Json(update): Json<UserAdminUpdate>,
) -> Result<Json<UserPublic>, ApiError> {
    let users = state.infra.users().await?;
    let updated = users.admin_update(&id, update).await?;
    info!(admin = %admin.username, target = %updated.username, "Admin updated account");
    Ok(Json(UserPublic::from(&updated)))
}

pub async fn link_student(
    State(state): State<AppState>,
    Member(user): Member,
    Json(payload): Json<StudentLinkRequest>,
) -> Result<Json<StudentLinkPublic>, ApiError> {
    let users = state.infra.users().await?;
    let link = users
        .link_student(&user.username, &payload.email, payload.class_std)
        .await?;
    Ok(Json(StudentLinkPublic::from(&link)))
}
