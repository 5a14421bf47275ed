//! Account and student link storage.

use std::fmt;

use chrono::Utc;
use surrealdb::RecordId;
use tracing::{debug, info};

use crate::auth::password::{
    DEFAULT_COST, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH, hash_password, looks_like_bcrypt,
    verify_password,
};
use crate::db::Db;
use crate::db::schema::{
    StudentLinkRecord, UserAdminUpdate, UserCreate, UserRecord, UserSelfUpdate,
};

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 64;
pub const MIN_CLASS_STD: i64 = 5;
pub const MAX_CLASS_STD: i64 = 10;

/// Errors surfaced by account operations.
#[derive(Debug)]
pub enum StoreError {
    /// Input rejected (bad length, duplicate username, ...)
    Invalid(String),
    /// Referenced account does not exist
    NotFound(String),
    /// Storage failure
    Internal(anyhow::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "{}", msg),
            Self::NotFound(msg) => write!(f, "{}", msg),
            Self::Internal(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}

impl From<surrealdb::Error> for StoreError {
    fn from(e: surrealdb::Error) -> Self {
        Self::Internal(e.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Minimal shape check: one `@` with a dotted domain after it.
pub fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

fn validate_email(email: &str) -> StoreResult<()> {
    if is_plausible_email(email) {
        Ok(())
    } else {
        Err(StoreError::Invalid(format!("Invalid email address: {}", email)))
    }
}

fn validate_registration(create: &UserCreate) -> StoreResult<()> {
    let username_len = create.username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&username_len) {
        return Err(StoreError::Invalid(format!(
            "Username must be between {} and {} characters",
            MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
        )));
    }

    let password_len = create.password.chars().count();
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&password_len) {
        return Err(StoreError::Invalid(format!(
            "Password must be between {} and {} characters",
            MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH
        )));
    }

    if let Some(email) = create.email.as_deref().filter(|e| !e.is_empty()) {
        validate_email(email)?;
    }

    Ok(())
}

/// Parse an admin-supplied account id, with or without the `user:` prefix.
pub fn parse_user_record_id(raw: &str) -> StoreResult<RecordId> {
    let key = raw.strip_prefix("user:").unwrap_or(raw).trim();
    let key = key.trim_matches(|c| c == '⟨' || c == '⟩' || c == '`');
    if key.is_empty() {
        return Err(StoreError::NotFound("Invalid user id".to_string()));
    }
    Ok(RecordId::from_table_key("user", key))
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// User store for database operations.
#[derive(Clone)]
pub struct UserStore {
    db: Db,
    bcrypt_cost: u32,
}

impl UserStore {
    /// Create a new user store.
    pub fn new(db: Db) -> Self {
        Self {
            db,
            bcrypt_cost: DEFAULT_COST,
        }
    }

    /// Override the bcrypt cost (tests use the minimum).
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Register a new account with the `user` role unless roles are given.
    pub async fn register(&self, create: UserCreate) -> StoreResult<UserRecord> {
        validate_registration(&create)?;

        if self.get_user_by_username(&create.username).await?.is_some() {
            return Err(StoreError::Invalid("Username already exists".to_string()));
        }

        let email = create.email.unwrap_or_default();
        if !email.is_empty() && self.get_user_by_email(&email).await?.is_some() {
            return Err(StoreError::Invalid("Email already exists".to_string()));
        }

        let hashed_password = hash_password(&create.password, self.bcrypt_cost).await?;
        let roles = if create.roles.is_empty() {
            vec!["user".to_string()]
        } else {
            create.roles
        };
        let now = now_rfc3339();

        let query = r#"
            CREATE user CONTENT {
                user_id: $user_id,
                username: $username,
                hashed_password: $hashed_password,
                email: $email,
                full_name: $full_name,
                is_active: true,
                roles: $roles,
                created_at: $now,
                updated_at: $now
            }
        "#;

        let result = self
            .db
            .query(query)
            .bind(("user_id", uuid::Uuid::new_v4().to_string()))
            .bind(("username", create.username.clone()))
            .bind(("hashed_password", hashed_password))
            .bind(("email", email))
            .bind(("full_name", create.full_name.unwrap_or_default()))
            .bind(("roles", roles))
            .bind(("now", now))
            .await;

        // A concurrent registration can still trip the unique index.
        let mut res = match result.and_then(|r| r.check()) {
            Ok(res) => res,
            Err(e) if e.to_string().contains("already contains") => {
                return Err(StoreError::Invalid("Username already exists".to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let users: Vec<UserRecord> = res.take(0)?;
        let user = users
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Failed to create user"))?;

        info!(username = %user.username, user_id = %user.user_id, "Registered account");
        Ok(user)
    }

    /// Check credentials; `None` when the username or password is wrong.
    ///
    /// Rows still holding a plaintext password are upgraded to a bcrypt hash
    /// on the first successful login.
    pub async fn authenticate(&self, username: &str, password: &str) -> StoreResult<Option<UserRecord>> {
        let Some(user) = self.get_user_by_username(username).await? else {
            return Ok(None);
        };

        let stored = user.hashed_password.as_str();
        if verify_password(password, stored).await? {
            return Ok(Some(user));
        }

        if !stored.is_empty() && !looks_like_bcrypt(stored) && stored == password {
            let new_hash = hash_password(password, self.bcrypt_cost).await?;
            self.db
                .query("UPDATE $id SET hashed_password = $hash, updated_at = $now")
                .bind(("id", user.id.clone()))
                .bind(("hash", new_hash))
                .bind(("now", now_rfc3339()))
                .await?
                .check()?;

            info!(username = %user.username, "Upgraded legacy plaintext password");
            return Ok(self.get_user_by_id(&user.id).await?);
        }

        debug!(username, "Password mismatch");
        Ok(None)
    }

    /// Get a user by login name.
    pub async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM user WHERE username = $username LIMIT 1")
            .bind(("username", username.to_string()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM user WHERE email = $email LIMIT 1")
            .bind(("email", email.to_string()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// Get a user by database ID.
    pub async fn get_user_by_id(&self, id: &RecordId) -> StoreResult<Option<UserRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM user WHERE id = $id LIMIT 1")
            .bind(("id", id.clone()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// All accounts, oldest first.
    pub async fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM user ORDER BY created_at ASC")
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users)
    }

    /// Apply a self-service update to the account named `username`.
    pub async fn update_me(&self, username: &str, update: UserSelfUpdate) -> StoreResult<UserRecord> {
        let user = self
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| StoreError::NotFound("User not found".to_string()))?;

        self.apply_update(
            &user.id,
            UserAdminUpdate {
                email: update.email,
                full_name: update.full_name,
                ..Default::default()
            },
        )
        .await
    }

    /// Apply an admin update to the account with database id `raw_id`.
    pub async fn admin_update(&self, raw_id: &str, update: UserAdminUpdate) -> StoreResult<UserRecord> {
        let id = parse_user_record_id(raw_id)?;
        self.apply_update(&id, update).await
    }

    async fn apply_update(&self, id: &RecordId, update: UserAdminUpdate) -> StoreResult<UserRecord> {
        if let Some(email) = update.email.as_deref().filter(|e| !e.is_empty()) {
            validate_email(email)?;
        }

        if update.is_empty() {
            return self
                .get_user_by_id(id)
                .await?
                .ok_or_else(|| StoreError::NotFound("User not found".to_string()));
        }

        // Unset fields bind as NONE and keep their current value.
        let query = r#"
            UPDATE $id SET
                email = $email ?? email,
                full_name = $full_name ?? full_name,
                is_active = $is_active ?? is_active,
                roles = $roles ?? roles,
                updated_at = $now
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("id", id.clone()))
            .bind(("email", update.email))
            .bind(("full_name", update.full_name))
            .bind(("is_active", update.is_active))
            .bind(("roles", update.roles))
            .bind(("now", now_rfc3339()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        users
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound("User not found".to_string()))
    }

    /// Create or refresh the student link for `username`.
    ///
    /// The link is keyed by the account's external id, so repeated calls
    /// update one record and keep its original creation time.
    pub async fn link_student(
        &self,
        username: &str,
        email: &str,
        class_std: i64,
    ) -> StoreResult<StudentLinkRecord> {
        if !(MIN_CLASS_STD..=MAX_CLASS_STD).contains(&class_std) {
            return Err(StoreError::Invalid(format!(
                "class_std must be an integer between {} and {}",
                MIN_CLASS_STD, MAX_CLASS_STD
            )));
        }
        validate_email(email)?;

        let user = self
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| StoreError::Invalid("User not found".to_string()))?;

        let query = r#"
            UPSERT $id SET
                user_id = $user_id,
                email = $email,
                class_std = $class_std,
                full_name = $full_name,
                updated_at = $now,
                created_at = created_at ?? $now
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("id", RecordId::from_table_key("student_link", user.user_id.clone())))
            .bind(("user_id", user.user_id.clone()))
            .bind(("email", email.to_string()))
            .bind(("class_std", class_std))
            .bind(("full_name", user.full_name.clone()))
            .bind(("now", now_rfc3339()))
            .await?;

        let links: Vec<StudentLinkRecord> = res.take(0)?;
        let link = links
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Failed to upsert student link"))?;

        info!(user_id = %link.user_id, class_std = link.class_std, "Linked student profile");
        Ok(link)
    }

    /// Student link for the account with external id `user_id`.
    pub async fn get_student_link(&self, user_id: &str) -> StoreResult<Option<StudentLinkRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM student_link WHERE user_id = $user_id LIMIT 1")
            .bind(("user_id", user_id.to_string()))
            .await?;

        let links: Vec<StudentLinkRecord> = res.take(0)?;
        Ok(links.into_iter().next())
    }

    /// Email recorded on the student link for `username`, if any.
    pub async fn linked_email(&self, username: &str) -> StoreResult<Option<String>> {
        let Some(user) = self.get_user_by_username(username).await? else {
            return Ok(None);
        };
        if user.user_id.is_empty() {
            return Ok(None);
        }

        Ok(self
            .get_student_link(&user.user_id)
            .await?
            .map(|link| link.email)
            .filter(|email| !email.is_empty()))
    }
}
