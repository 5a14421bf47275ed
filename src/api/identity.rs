//! Request extractors that authenticate the caller.
//!
//! [`Actor`] only requires a valid token and resolves the identity softly.
//! [`Member`] additionally requires an active account, and [`Admin`] an
//! account carrying the `admin` role.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::debug;

use super::AppState;
use super::error::ApiError;
use crate::auth::{
    AuthError, ResolvedIdentity, TokenClaims, extract_credential, resolve, resolve_member,
};
use crate::db::UserRecord;

/// Value of the `access_token` query parameter, percent-decoded.
fn query_access_token(parts: &Parts) -> Option<String> {
    let query = parts.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "access_token")
        .map(|(_, value)| value.into_owned())
}

async fn verified_claims(parts: &Parts, state: &AppState) -> Result<TokenClaims, ApiError> {
    let access_token = query_access_token(parts);
    let token = extract_credential(access_token.as_deref(), &parts.headers)?;
    let claims = state.codec.verify(&token)?;
    Ok(claims)
}

/// Caller with a verified token.
#[derive(Debug, Clone)]
pub struct Actor(pub ResolvedIdentity);

impl FromRequestParts<AppState> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = verified_claims(parts, state).await?;
        let users = state.infra.users().await?;
        let identity = resolve(&users, &claims).await;
        debug!(user_id = ?identity.user_id(), "Resolved caller");
        Ok(Self(identity))
    }
}

/// Caller whose token names an active account.
#[derive(Debug, Clone)]
pub struct Member(pub UserRecord);

impl FromRequestParts<AppState> for Member {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = verified_claims(parts, state).await?;
        let users = state.infra.users().await?;
        let user = resolve_member(&users, &claims).await?;
        Ok(Self(user))
    }
}

/// Active account with the `admin` role.
#[derive(Debug, Clone)]
pub struct Admin(pub UserRecord);

impl FromRequestParts<AppState> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Member(user) = Member::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AuthError::Forbidden("Admin access required".to_string()).into());
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(uri: &str) -> Parts {
        Request::builder().uri(uri).body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_query_access_token() {
        assert_eq!(
            query_access_token(&parts("/study/plan?x=1&access_token=a.b.c")).as_deref(),
            Some("a.b.c")
        );
        assert_eq!(
            query_access_token(&parts("/study/plan?access_token=%22a.b.c%22")).as_deref(),
            Some("\"a.b.c\"")
        );
        assert_eq!(query_access_token(&parts("/study/plan")), None);
    }
}
