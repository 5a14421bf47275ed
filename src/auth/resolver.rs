//! Turning verified claims into an identity.

use tracing::{debug, warn};

use crate::auth::context::{CanonicalClaims, ResolvedIdentity};
use crate::auth::extractor::AuthError;
use crate::auth::token::TokenClaims;
use crate::auth::user_store::UserStore;
use crate::db::UserRecord;
use crate::types::UserId;

/// Resolve claims to an identity, enriched from the account when it exists.
///
/// Never fails: a missing account or a lookup error yields an identity
/// without a display name.
pub async fn resolve(users: &UserStore, claims: &TokenClaims) -> ResolvedIdentity {
    let canonical = CanonicalClaims::normalize(claims);

    let record = match &canonical.username {
        Some(username) => match users.get_user_by_username(username.as_str()).await {
            Ok(record) => record,
            Err(e) => {
                warn!(username = %username, error = %e, "Identity lookup failed");
                None
            }
        },
        None => None,
    };

    if record.is_none() {
        debug!(username = ?canonical.username, "Token subject has no account");
    }

    let user_id = canonical.user_id.or_else(|| {
        record
            .as_ref()
            .filter(|r| !r.user_id.is_empty())
            .map(|r| UserId::new(r.user_id.clone()))
    });
    let full_name = record
        .as_ref()
        .and_then(|r| r.display_name())
        .map(str::to_string);

    ResolvedIdentity::new(user_id, canonical.username, full_name).with_grade(canonical.grade)
}

/// Resolve claims to an active account, failing when it cannot be used.
pub async fn resolve_member(users: &UserStore, claims: &TokenClaims) -> Result<UserRecord, AuthError> {
    let canonical = CanonicalClaims::normalize(claims);
    let username = canonical
        .username
        .ok_or_else(|| AuthError::Unauthorized("Invalid token payload".to_string()))?;

    let user = users
        .get_user_by_username(username.as_str())
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?
        .ok_or_else(|| AuthError::Unauthorized("User not found".to_string()))?;

    if !user.is_active {
        return Err(AuthError::Forbidden("User is inactive".to_string()));
    }

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseConfig, UserAdminUpdate, UserCreate, create_connection, ensure_schema};

    async fn setup_store() -> UserStore {
        let db = create_connection(DatabaseConfig::memory()).await.unwrap();
        ensure_schema(&db).await.unwrap();
        UserStore::new(db).with_bcrypt_cost(4 /* bcrypt minimum cost; bcrypt::MIN_COST is private */)
    }

    async fn register(store: &UserStore, username: &str) -> UserRecord {
        store
            .register(UserCreate {
                username: username.to_string(),
                password: "pw123456".to_string(),
                email: None,
                full_name: Some("Alice Liddell".to_string()),
                roles: Vec::new(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_known_user() {
        let store = setup_store().await;
        let user = register(&store, "alice").await;

        let claims = TokenClaims::for_user("alice", &user.user_id);
        let identity = resolve(&store, &claims).await;

        assert_eq!(identity.user_id().map(|u| u.as_str()), Some(user.user_id.as_str()));
        assert_eq!(identity.full_name(), Some("Alice Liddell"));
        assert_eq!(identity.username().map(|u| u.as_str()), Some("alice"));
    }

    #[tokio::test]
    async fn test_resolve_unknown_user_is_soft() {
        let store = setup_store().await;
        let claims = TokenClaims::new().with("username", "ghost").with("user_id", "u-0");

        let identity = resolve(&store, &claims).await;
        assert_eq!(identity.user_id().map(|u| u.as_str()), Some("u-0"));
        assert_eq!(identity.full_name(), None);
    }

    #[tokio::test]
    async fn test_resolve_fills_user_id_from_account() {
        let store = setup_store().await;
        let user = register(&store, "alice").await;

        let identity = resolve(&store, &TokenClaims::new().with("sub", "alice")).await;
        assert_eq!(identity.user_id().map(|u| u.as_str()), Some(user.user_id.as_str()));
    }

    #[tokio::test]
    async fn test_resolve_member_is_strict() {
        let store = setup_store().await;
        let user = register(&store, "alice").await;

        let claims = TokenClaims::for_user("alice", &user.user_id);
        assert!(resolve_member(&store, &claims).await.is_ok());

        let ghost = TokenClaims::for_user("ghost", "u-0");
        assert!(matches!(
            resolve_member(&store, &ghost).await,
            Err(AuthError::Unauthorized(_))
        ));

        store
            .admin_update(
                &user.id.to_string(),
                UserAdminUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            resolve_member(&store, &claims).await,
            Err(AuthError::Forbidden(_))
        ));
    }
}
