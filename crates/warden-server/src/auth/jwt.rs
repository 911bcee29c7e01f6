//! JWT token issuance and validation.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};

use super::claims::{Claims, TokenScope};

/// An access/refresh token pair for one subject.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: i64,
    pub refresh_expires_at: i64,
}

/// Manages JWT token creation and validation.
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl JwtManager {
    pub fn new(secret: &[u8], access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    /// Sign a fresh access/refresh pair for `subject`.
    pub fn issue_pair(&self, subject: i64) -> Result<TokenPair, jsonwebtoken::errors::Error> {
        let now = warden_core::db::unix_timestamp();
        let (access_token, access_expires_at) =
            self.sign(subject, TokenScope::Access, now, self.access_ttl_secs)?;
        let (refresh_token, refresh_expires_at) =
            self.sign(subject, TokenScope::Refresh, now, self.refresh_ttl_secs)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
        })
    }

    fn sign(
        &self,
        subject: i64,
        scope: TokenScope,
        now: i64,
        ttl: i64,
    ) -> Result<(String, i64), jsonwebtoken::errors::Error> {
        let exp = now + ttl;
        let claims = Claims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: subject.to_string(),
            scope,
            iat: now,
            exp,
        };
        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok((token, exp))
    }

    /// Verify the signature and expiry of a token and return its claims.
    pub fn decode(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data =
            jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }

    /// Hash a token for storage (raw tokens are never persisted).
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
