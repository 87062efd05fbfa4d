//! bcrypt hashing. Both calls are CPU-bound and run on the blocking pool.

use crate::error::{AppError, AppResult};

/// bcrypt work factor for stored passwords.
pub const BCRYPT_COST: u32 = 12;

lazy_static::lazy_static! {
    // Checked when the account does not exist, so both paths cost one bcrypt verify.
    static ref DUMMY_HASH: String =
        bcrypt::hash("portfolio-cms-no-such-account", BCRYPT_COST).unwrap_or_default();
}

pub async fn hash_password(password: String) -> AppResult<String> {
    match tokio::task::spawn_blocking(move || bcrypt::hash(&password, BCRYPT_COST)).await {
        Ok(Ok(hash)) => Ok(hash),
        Ok(Err(e)) => Err(AppError::Internal(format!("failed to hash password: {e}"))),
        Err(e) => Err(AppError::Internal(format!(
            "spawn_blocking panic during hash: {e}"
        ))),
    }
}

/// `false` on mismatch, on a malformed hash, and if the blocking task dies.
pub async fn verify_password(password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || bcrypt::verify(&password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

/// Spend the same bcrypt work as [`verify_password`] for an unknown account.
pub async fn verify_dummy(password: String) {
    let _ = tokio::task::spawn_blocking(move || bcrypt::verify(&password, &DUMMY_HASH)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_then_verify() {
        let hash = hash_password("correct horse".to_string()).await.unwrap();
        assert!(hash.starts_with("$2"));
        assert!(hash.contains("$12$"));
        assert!(verify_password("correct horse".to_string(), hash.clone()).await);
        assert!(!verify_password("wrong horse".to_string(), hash).await);
    }

    #[tokio::test]
    async fn test_dummy_hash_has_full_cost() {
        assert!(DUMMY_HASH.starts_with("$2"));
        assert!(DUMMY_HASH.contains("$12$"));
        verify_dummy("password123".to_string()).await;
    }

    #[tokio::test]
    async fn test_malformed_hash_is_a_mismatch() {
        assert!(!verify_password("anything".to_string(), "not-a-hash".to_string()).await);
    }
}
