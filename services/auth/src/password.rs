//! Argon2 credential hashing
//!
//! Hashing is CPU bound, so both operations run on the blocking pool.

use anyhow::{Context, Result};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use std::sync::OnceLock;

/// Hash a plaintext password into a PHC string
pub async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || hash_blocking(&password))
        .await
        .context("password hashing task panicked")?
}

/// Check a plaintext password against a stored PHC string
pub async fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let password = password.to_owned();
    let password_hash = password_hash.to_owned();
    tokio::task::spawn_blocking(move || verify_blocking(&password, &password_hash))
        .await
        .context("password verification task panicked")?
}

/// Spend the same work as a real verification for an unknown account
pub async fn verify_dummy(password: &str) -> Result<()> {
    let hash = dummy_hash()?.to_owned();
    verify_password(password, &hash).await.map(|_| ())
}

fn hash_blocking(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

fn verify_blocking(password: &str, password_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Stored password hash is malformed: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn dummy_hash() -> Result<&'static str> {
    static DUMMY: OnceLock<String> = OnceLock::new();
    if let Some(hash) = DUMMY.get() {
        return Ok(hash);
    }
    let hash = hash_blocking("dummy-password-for-unknown-accounts")?;
    Ok(DUMMY.get_or_init(|| hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_then_verify() {
        let hash = hash_password("Correct-Horse-9").await.unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Correct-Horse-9", &hash).await.unwrap());
        assert!(!verify_password("wrong", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_hash_is_an_error() {
        assert!(verify_password("x", "not-a-hash").await.is_err());
    }

    #[tokio::test]
    async fn test_dummy_verification_succeeds() {
        verify_dummy("anything").await.unwrap();
    }
}
