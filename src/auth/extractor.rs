//! Bearer credential extraction from HTTP requests.

use std::fmt;

use http::HeaderMap;
use http::header::AUTHORIZATION;

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credential in the query string or `Authorization` header
    MissingCredential,
    /// Credential present but not shaped like a signed token
    MalformedCredential,
    /// Bad signature, malformed claims or expired token
    InvalidCredential(String),
    /// Credential verified but the account cannot be used
    Unauthorized(String),
    /// Authenticated but not allowed to perform this action
    Forbidden(String),
    /// Database error while resolving the identity
    DatabaseError(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential => write!(f, "Missing bearer token"),
            Self::MalformedCredential => write!(f, "Malformed bearer token"),
            Self::InvalidCredential(msg) => write!(f, "Invalid token: {}", msg),
            Self::Unauthorized(msg) => write!(f, "{}", msg),
            Self::Forbidden(msg) => write!(f, "{}", msg),
            Self::DatabaseError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

const QUOTES: &[char] = &['"', '\''];

fn trim_token(raw: &str) -> &str {
    raw.trim().trim_matches(QUOTES).trim()
}

fn has_token_shape(candidate: &str) -> bool {
    candidate.matches('.').count() == 2
}

/// Strip a case-insensitive `prefix` from `value`.
fn strip_prefix_ci<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        value.get(prefix.len()..)
    } else {
        None
    }
}

/// Extract a bearer credential from the `access_token` query parameter or the
/// `Authorization` header.
///
/// The query parameter wins when it holds a well-formed token. Header values
/// may carry a `Bearer `, `JWT ` or `bearer:` prefix (any case), a
/// `token=<value>` assignment, or the bare token.
pub fn extract_credential(
    access_token: Option<&str>,
    headers: &HeaderMap,
) -> Result<String, AuthError> {
    if let Some(raw) = access_token {
        let candidate = trim_token(raw);
        if has_token_shape(candidate) {
            return Ok(candidate.to_string());
        }
    }

    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingCredential)?;

    let stripped = strip_prefix_ci(header, "bearer ")
        .or_else(|| strip_prefix_ci(header, "jwt "))
        .or_else(|| strip_prefix_ci(header, "bearer:"))
        .map(str::trim_start);

    let candidate = match stripped {
        Some(rest) => rest,
        None if header.to_ascii_lowercase().contains("token=") => header
            .split_once('=')
            .map(|(_, value)| value)
            .unwrap_or(header),
        None => header,
    };

    let candidate = trim_token(candidate);
    if !has_token_shape(candidate) {
        return Err(AuthError::MalformedCredential);
    }

    Ok(candidate.to_string())
}
