use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::RecordId;

/// Persisted account record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Database identifier (table: `user`)
    pub id: RecordId,
    /// Stable external id carried in tokens
    pub user_id: String,
    /// Unique login name
    pub username: String,
    /// bcrypt hash of the password
    #[serde(default)]
    pub hashed_password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    /// Whether the account may authenticate
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub roles: Vec<String>,
    /// RFC 3339 timestamps
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

fn default_true() -> bool {
    true
}

impl UserRecord {
    /// Whether the account carries the `admin` role (case-insensitive).
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case("admin"))
    }

    /// Display name, if one was set.
    pub fn display_name(&self) -> Option<&str> {
        if self.full_name.is_empty() {
            None
        } else {
            Some(&self.full_name)
        }
    }
}

/// Payload for creating a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub roles: Vec<String>,
}

/// Fields a user may change on their own account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSelfUpdate {
    pub email: Option<String>,
    pub full_name: Option<String>,
}

/// Fields an admin may change on any account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserAdminUpdate {
    pub email: Option<String>,
    pub full_name: Option<String>,
    #[serde(rename = "isActive")]
    pub is_active: Option<bool>,
    pub roles: Option<Vec<String>>,
}

impl UserAdminUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.full_name.is_none()
            && self.is_active.is_none()
            && self.roles.is_none()
    }
}

/// Public view of an account as returned by the auth routes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPublic {
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub username: String,
    pub full_name: String,
    pub email: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    #[serde(rename = "isActive")]
    pub is_active: bool,
    pub roles: Vec<String>,
}

impl From<&UserRecord> for UserPublic {
    fn from(user: &UserRecord) -> Self {
        let created_at = user.created_at.clone().unwrap_or_default();
        let updated_at = user
            .updated_at
            .clone()
            .unwrap_or_else(|| created_at.clone());

        Self {
            id: user.id.to_string(),
            user_id: user.user_id.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            created_at,
            updated_at,
            is_active: user.is_active,
            roles: user.roles.clone(),
        }
    }
}

/// Persisted grade/email link for a student account (table: `student_link`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentLinkRecord {
    pub id: RecordId,
    pub user_id: String,
    pub email: String,
    pub class_std: i64,
    #[serde(default)]
    pub full_name: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Public view of a student link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentLinkPublic {
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub class_std: i64,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

impl From<&StudentLinkRecord> for StudentLinkPublic {
    fn from(link: &StudentLinkRecord) -> Self {
        Self {
            id: link.id.to_string(),
            user_id: link.user_id.clone(),
            full_name: link.full_name.clone(),
            email: link.email.clone(),
            class_std: link.class_std,
            created_at: link.created_at.clone().unwrap_or_default(),
            updated_at: link.updated_at.clone().unwrap_or_default(),
        }
    }
}

/// Persisted activity entry (table: `activity_log`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogRecord {
    pub id: RecordId,
    /// External user id of the actor, absent when unknown
    pub user_id: Option<String>,
    /// Display name of the actor, absent when unknown
    pub name: Option<String>,
    /// Operation input summary; always carries a `type` key
    pub data: Value,
    /// Operation output summary
    pub output: Value,
    /// ISO-8601 UTC timestamp
    pub datetime: String,
}

/// Payload for appending an activity entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogCreate {
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub data: Value,
    pub output: Value,
    pub datetime: String,
}
