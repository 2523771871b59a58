use std::sync::OnceLock;

use tokio::task;

/// Hashed on first use; verified against when the email is unknown so that
/// both login failure paths spend the same bcrypt work.
const DUMMY_PASSWORD: &str = "opsdesk-timing-equaliser";

pub struct PasswordHasher {
    cost: u32,
    dummy_hash: OnceLock<String>,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost,
            dummy_hash: OnceLock::new(),
        }
    }

    pub async fn hash(&self, password: &str) -> anyhow::Result<String> {
        let password = password.to_string();
        let cost = self.cost;
        let hash = task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
        Ok(hash)
    }

    /// `stored` is `None` for unknown accounts: a dummy hash is checked
    /// instead and the result is always false.
    pub async fn verify(&self, password: &str, stored: Option<&str>) -> anyhow::Result<bool> {
        let (hash, known) = match stored {
            Some(hash) => (hash.to_string(), true),
            None => (self.dummy_hash().await?, false),
        };
        let password = password.to_string();
        let matched = task::spawn_blocking(move || match bcrypt::verify(password, &hash) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::warn!("stored password hash is unreadable: {}", e);
                false
            }
        })
        .await?;
        Ok(known && matched)
    }

    async fn dummy_hash(&self) -> anyhow::Result<String> {
        if let Some(hash) = self.dummy_hash.get() {
            return Ok(hash.clone());
        }
        let hash = self.hash(DUMMY_PASSWORD).await?;
        Ok(self.dummy_hash.get_or_init(|| hash).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn verifies_what_it_hashed() {
        let hasher = PasswordHasher::new(4);
        let hash = hasher.hash("correct horse").await.unwrap();

        assert!(hasher.verify("correct horse", Some(&hash)).await.unwrap());
        assert!(!hasher.verify("wrong horse", Some(&hash)).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_account_never_verifies() {
        let hasher = PasswordHasher::new(4);
        assert!(!hasher.verify(DUMMY_PASSWORD, None).await.unwrap());
    }

    #[tokio::test]
    async fn garbage_hash_is_a_mismatch() {
        let hasher = PasswordHasher::new(4);
        assert!(!hasher.verify("whatever", Some("not-a-bcrypt-hash")).await.unwrap());
    }
}
