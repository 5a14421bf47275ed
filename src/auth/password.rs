//! Password hashing.

use anyhow::Result;
use bcrypt::{hash, verify};

pub use bcrypt::DEFAULT_COST;

pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Hash a password with bcrypt on the blocking pool.
pub async fn hash_password(password: &str, cost: u32) -> Result<String> {
    let password = password.to_string();

    tokio::task::spawn_blocking(move || hash(password, cost))
        .await
        .map_err(|e| anyhow::anyhow!("Task join error: {}", e))?
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))
}

/// Check a password against a bcrypt hash on the blocking pool.
///
/// A stored value that is not a bcrypt hash never matches.
pub async fn verify_password(password: &str, hashed: &str) -> Result<bool> {
    if !looks_like_bcrypt(hashed) {
        return Ok(false);
    }

    let password = password.to_string();
    let hashed = hashed.to_string();

    tokio::task::spawn_blocking(move || verify(password, &hashed))
        .await
        .map_err(|e| anyhow::anyhow!("Task join error: {}", e))?
        .map_err(|e| anyhow::anyhow!("Password verification failed: {}", e))
}

/// Whether a stored password value is a bcrypt hash (`$2a$`, `$2b$`, `$2y$`).
pub fn looks_like_bcrypt(stored: &str) -> bool {
    stored.len() == 60
        && (stored.starts_with("$2a$") || stored.starts_with("$2b$") || stored.starts_with("$2y$"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hashed = hash_password("pw123456", 4 /* bcrypt minimum cost; bcrypt::MIN_COST is private */).await.unwrap();
        assert!(looks_like_bcrypt(&hashed));
        assert!(verify_password("pw123456", &hashed).await.unwrap());
        assert!(!verify_password("wrong", &hashed).await.unwrap());
    }

    #[tokio::test]
    async fn test_plaintext_never_verifies() {
        assert!(!verify_password("pw123456", "pw123456").await.unwrap());
    }
}
