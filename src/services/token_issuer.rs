use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;
use crate::models::auth::Claims;

/// Raw refresh and ephemeral tokens carry 32 bytes of entropy.
const TOKEN_BYTES: usize = 32;

/// Signs short-lived access tokens and mints opaque refresh tokens.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl_seconds: u64,
}

impl TokenIssuer {
    pub fn new(secret: &str, issuer: &str, audience: &str, access_ttl_seconds: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            access_ttl_seconds,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_secret,
            &config.jwt_issuer,
            &config.jwt_audience,
            config.jwt_expiry_seconds,
        )
    }

    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        workspace_id: Uuid,
        auth_version: i32,
    ) -> anyhow::Result<String> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: user_id.to_string(),
            user_id,
            workspace_id,
            auth_version,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + self.access_ttl_seconds as usize,
        };
        self.sign(&claims)
    }

    /// Verifies signature, expiry, issuer and audience. A leading `Bearer `
    /// is tolerated.
    pub fn decode_access_token(&self, token: &str) -> anyhow::Result<Claims> {
        let token = token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);

        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    fn sign(&self, claims: &Claims) -> anyhow::Result<String> {
        let token = encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?;
        Ok(token)
    }
}

/// 32 bytes from the OS RNG, hex encoded.
pub fn generate_token() -> anyhow::Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| anyhow::anyhow!("os rng unavailable: {e}"))?;
    Ok(hex::encode(bytes))
}

pub fn issue_refresh_token() -> anyhow::Result<String> {
    generate_token()
}

/// Only this digest is ever persisted.
pub fn hash_refresh_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret", "opsdesk", "opsdesk-portal", 900)
    }

    #[test]
    fn access_token_round_trips_its_claims() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();
        let workspace_id = Uuid::new_v4();

        let token = issuer.issue_access_token(user_id, workspace_id, 3).unwrap();
        let claims = issuer.decode_access_token(&format!("Bearer {token}")).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.workspace_id, workspace_id);
        assert_eq!(claims.auth_version, 3);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn every_access_token_gets_its_own_jti() {
        let issuer = issuer();
        let id = Uuid::new_v4();
        let a = issuer.decode_access_token(&issuer.issue_access_token(id, id, 1).unwrap()).unwrap();
        let b = issuer.decode_access_token(&issuer.issue_access_token(id, id, 1).unwrap()).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn rejects_foreign_signature_and_audience() {
        let ours = issuer();
        let id = Uuid::new_v4();

        let other_key = TokenIssuer::new("other-secret", "opsdesk", "opsdesk-portal", 900);
        let forged = other_key.issue_access_token(id, id, 1).unwrap();
        assert!(ours.decode_access_token(&forged).is_err());

        let other_aud = TokenIssuer::new("test-secret", "opsdesk", "someone-else", 900);
        let wrong_aud = other_aud.issue_access_token(id, id, 1).unwrap();
        assert!(ours.decode_access_token(&wrong_aud).is_err());
    }

    #[test]
    fn rejects_expired_tokens() {
        let issuer = issuer();
        let id = Uuid::new_v4();
        let long_ago = (Utc::now().timestamp() - 3600) as usize;
        let claims = Claims {
            sub: id.to_string(),
            user_id: id,
            workspace_id: id,
            auth_version: 1,
            iss: "opsdesk".into(),
            aud: "opsdesk-portal".into(),
            jti: Uuid::new_v4().to_string(),
            iat: long_ago - 900,
            exp: long_ago,
        };
        let token = issuer.sign(&claims).unwrap();
        assert!(issuer.decode_access_token(&token).is_err());
    }

    #[test]
    fn refresh_tokens_are_random_and_hash_stably() {
        let a = issue_refresh_token().unwrap();
        let b = issue_refresh_token().unwrap();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);

        assert_eq!(hash_refresh_token(&a), hash_refresh_token(&a));
        assert_ne!(hash_refresh_token(&a), hash_refresh_token(&b));
        assert_eq!(hash_refresh_token(&a).len(), 64);
    }
}
