//! Signed, time-limited identity tokens.

use std::env;
use std::str::FromStr;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::extractor::AuthError;

pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60;

/// Token signing configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Process-wide HMAC secret
    pub secret: String,
    /// One of HS256, HS384, HS512
    pub algorithm: Algorithm,
    /// Lifetime of issued tokens
    pub token_ttl_minutes: i64,
}

impl AuthConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            algorithm: Algorithm::HS256,
            token_ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
        }
    }

    /// Read `SECRET_KEY`, `ALGORITHM` and `ACCESS_TOKEN_EXPIRE_MINUTES`.
    ///
    /// A missing secret falls back to a random per-process one, so tokens do
    /// not survive a restart.
    pub fn from_env() -> anyhow::Result<Self> {
        let secret = match env::var("SECRET_KEY") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("SECRET_KEY not set, using an ephemeral signing secret");
                format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
            }
        };

        let algorithm = match env::var("ALGORITHM") {
            Ok(name) => parse_hmac_algorithm(&name)?,
            Err(_) => Algorithm::HS256,
        };

        let token_ttl_minutes = match env::var("ACCESS_TOKEN_EXPIRE_MINUTES") {
            Ok(raw) => raw.trim().parse::<i64>().map_err(|e| {
                anyhow::anyhow!("ACCESS_TOKEN_EXPIRE_MINUTES must be an integer: {}", e)
            })?,
            Err(_) => DEFAULT_TOKEN_TTL_MINUTES,
        };

        Ok(Self {
            secret,
            algorithm,
            token_ttl_minutes,
        })
    }
}

/// Parse an HMAC algorithm name. Asymmetric algorithms are rejected.
pub fn parse_hmac_algorithm(name: &str) -> anyhow::Result<Algorithm> {
    let algorithm = Algorithm::from_str(name.trim().to_ascii_uppercase().as_str())
        .map_err(|e| anyhow::anyhow!("Unknown token algorithm '{}': {}", name, e))?;

    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        other => Err(anyhow::anyhow!(
            "Token algorithm {:?} is not an HMAC algorithm",
            other
        )),
    }
}

/// Claim set carried by a token.
///
/// Kept as an open map: tokens minted elsewhere may spell identity claims
/// differently, and [`crate::auth::CanonicalClaims`] reconciles them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenClaims(Map<String, Value>);

impl TokenClaims {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Claims for a freshly authenticated account.
    pub fn for_user(username: &str, user_id: &str) -> Self {
        Self::new()
            .with("sub", username)
            .with("userId", user_id)
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of `key`, if present and non-empty.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.0.get("exp").and_then(Value::as_i64)
    }
}

/// Issues and verifies tokens with one configured HMAC key.
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    default_ttl: Duration,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            algorithm: config.algorithm,
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            default_ttl: Duration::minutes(config.token_ttl_minutes),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Sign `claims` with `iat = now` and `exp = now + default ttl`.
    pub fn issue(&self, claims: TokenClaims) -> anyhow::Result<String> {
        self.issue_with_ttl(claims, self.default_ttl)
    }

    /// Sign `claims` with an explicit lifetime.
    pub fn issue_with_ttl(&self, claims: TokenClaims, ttl: Duration) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = claims
            .with("iat", now.timestamp())
            .with("exp", (now + ttl).timestamp());

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Verify signature and expiry, returning the claims as signed.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => {
                    AuthError::InvalidCredential("Token expired".to_string())
                }
                ErrorKind::InvalidSignature => {
                    AuthError::InvalidCredential("Signature verification failed".to_string())
                }
                _ => AuthError::InvalidCredential(e.to_string()),
            }
        })?;

        Ok(data.claims)
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(&AuthConfig::new("test-secret"))
    }

    #[test]
    fn test_issue_then_verify_returns_claims_with_expiry() {
        let codec = codec();
        let claims = TokenClaims::for_user("alice", "u-1");

        let token = codec.issue(claims.clone()).unwrap();
        let verified = codec.verify(&token).unwrap();

        assert_eq!(verified.get_str("sub"), Some("alice"));
        assert_eq!(verified.get_str("userId"), Some("u-1"));

        let exp = verified.expires_at().unwrap();
        let expected = Utc::now().timestamp() + 60 * 60;
        assert!((exp - expected).abs() <= 5);
        assert!(verified.get("iat").is_some());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let codec = codec();
        let token = codec
            .issue_with_ttl(TokenClaims::for_user("alice", "u-1"), Duration::seconds(-5))
            .unwrap();

        assert!(matches!(
            codec.verify(&token),
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = codec()
            .issue(TokenClaims::for_user("alice", "u-1"))
            .unwrap();
        let other = TokenCodec::new(&AuthConfig::new("another-secret"));

        assert!(matches!(
            other.verify(&token),
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            codec().verify("a.b.c"),
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_algorithm_must_match() {
        let mut config = AuthConfig::new("test-secret");
        config.algorithm = Algorithm::HS512;
        let hs512 = TokenCodec::new(&config);

        let token = hs512.issue(TokenClaims::for_user("bob", "u-2")).unwrap();
        assert!(hs512.verify(&token).is_ok());
        assert!(codec().verify(&token).is_err());
    }

    #[test]
    fn test_parse_hmac_algorithm() {
        assert_eq!(parse_hmac_algorithm("hs384").unwrap(), Algorithm::HS384);
        assert!(parse_hmac_algorithm("RS256").is_err());
        assert!(parse_hmac_algorithm("nope").is_err());
    }
}
