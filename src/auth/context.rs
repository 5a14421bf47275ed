//! Request-scoped identity.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::token::TokenClaims;
use crate::types::{UserId, Username};

const USER_ID_KEYS: &[&str] = &["userId", "user_id", "userid"];
const USERNAME_KEYS: &[&str] = &["sub", "username", "email"];
const GRADE_KEYS: &[&str] = &["classStd", "class_std", "grade"];

/// Identity claims with key spellings reconciled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalClaims {
    pub user_id: Option<UserId>,
    pub username: Option<Username>,
    /// Grade level, if the token carries one
    pub grade: Option<u8>,
}

impl CanonicalClaims {
    /// Pick the first present spelling of each identity claim.
    pub fn normalize(claims: &TokenClaims) -> Self {
        let first_str = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| claims.get_str(k))
                .map(str::to_string)
        };

        let grade = GRADE_KEYS
            .iter()
            .find_map(|k| claims.get(k).and_then(grade_from_value));

        Self {
            user_id: first_str(USER_ID_KEYS).map(UserId::new),
            username: first_str(USERNAME_KEYS).map(Username::new),
            grade,
        }
    }
}

/// Read a grade from a number or from the first run of digits in a string
/// (`"8"`, `"Class 8"`, `"8th"`).
pub fn grade_from_value(value: &Value) -> Option<u8> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
        Value::String(s) => first_digit_run(s),
        _ => None,
    }
}

pub(crate) fn first_digit_run(s: &str) -> Option<u8> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits: String = s[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Identity resolved for one request.
///
/// Every field is optional: an unknown account still gets an identity so the
/// activity trail can record what happened.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    user_id: Option<UserId>,
    username: Option<Username>,
    full_name: Option<String>,
    #[serde(skip)]
    grade: Option<u8>,
}

impl ResolvedIdentity {
    pub fn new(
        user_id: Option<UserId>,
        username: Option<Username>,
        full_name: Option<String>,
    ) -> Self {
        Self {
            user_id,
            username,
            full_name,
            grade: None,
        }
    }

    pub fn with_grade(mut self, grade: Option<u8>) -> Self {
        self.grade = grade;
        self
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    pub fn username(&self) -> Option<&Username> {
        self.username.as_ref()
    }

    pub fn full_name(&self) -> Option<&str> {
        self.full_name.as_deref()
    }

    /// Grade level claimed by the token.
    pub fn grade_claim(&self) -> Option<u8> {
        self.grade
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefers_first_spelling() {
        let claims = TokenClaims::new()
            .with("user_id", "u-2")
            .with("userId", "u-1")
            .with("username", "bob")
            .with("sub", "alice");

        let canonical = CanonicalClaims::normalize(&claims);
        assert_eq!(canonical.user_id, Some(UserId::new("u-1")));
        assert_eq!(canonical.username, Some(Username::new("alice")));
        assert_eq!(canonical.grade, None);
    }

    #[test]
    fn test_normalize_falls_back_to_alternate_keys() {
        let claims = TokenClaims::new()
            .with("userid", "u-9")
            .with("email", "carol@example.com")
            .with("grade", "Class 7");

        let canonical = CanonicalClaims::normalize(&claims);
        assert_eq!(canonical.user_id, Some(UserId::new("u-9")));
        assert_eq!(
            canonical.username,
            Some(Username::new("carol@example.com"))
        );
        assert_eq!(canonical.grade, Some(7));
    }

    #[test]
    fn test_empty_claim_values_are_ignored() {
        let claims = TokenClaims::new().with("sub", "").with("username", "dave");
        let canonical = CanonicalClaims::normalize(&claims);
        assert_eq!(canonical.username, Some(Username::new("dave")));
    }

    #[test]
    fn test_grade_from_value() {
        assert_eq!(grade_from_value(&serde_json::json!(8)), Some(8));
        assert_eq!(grade_from_value(&serde_json::json!("10th")), Some(10));
        assert_eq!(grade_from_value(&serde_json::json!("none")), None);
        assert_eq!(grade_from_value(&serde_json::json!(true)), None);
        assert_eq!(grade_from_value(&serde_json::json!(300)), None);
    }
}
