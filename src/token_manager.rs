//! Mints and validates MAC-signed credit-tokens, and adapts them to the [`CounterStore`].

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::counter_store::{CounterStore, StoreError};

/// Registered + custom claims embedded in an issued credit-token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditClaims {
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
    /// TokenID: the authoritative key into the Counter Store.
    pub tid: String,
    /// Allowance at issuance time. Authenticated but not authoritative for consumption.
    pub requests_total: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid credential")]
    InvalidCredential,
    #[error("failed to issue token: {0}")]
    IssueFailed(#[from] StoreError),
}

/// Mints and validates credit-tokens, backed by a shared [`CounterStore`].
pub struct TokenManager {
    store: Arc<CounterStore>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_lifetime_secs: u64,
}

impl TokenManager {
    pub fn new(store: Arc<CounterStore>, secret: &[u8], token_lifetime_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            store,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            token_lifetime_secs,
        }
    }

    /// Generates a fresh TokenID, registers its allowance in the store, and returns a
    /// signed token string. If registration fails the signed token is discarded.
    pub fn issue(&self, payer_subject: &str, allowance: i64) -> Result<String, TokenError> {
        let token_id = Uuid::new_v4().to_string();
        self.store.register(&token_id, allowance)?;

        let now = now_secs();
        let claims = CreditClaims {
            sub: payer_subject.to_string(),
            iat: now,
            exp: now + self.token_lifetime_secs,
            tid: token_id,
            requests_total: allowance,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| TokenError::InvalidCredential)?;
        Ok(token)
    }

    /// Parses and MAC-verifies a token string, rejecting any algorithm other than HS256
    /// and any expired token. Malformed input, bad MAC, and expiry all collapse to
    /// [`TokenError::InvalidCredential`].
    pub fn validate(&self, token: &str) -> Result<CreditClaims, TokenError> {
        decode::<CreditClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::InvalidCredential)
    }

    /// Delegates to `Store.Use(claims.tid, claims.requests_total)`.
    pub fn consume(&self, claims: &CreditClaims) -> Result<i64, StoreError> {
        self.store.r#use(&claims.tid, claims.requests_total)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter_store::CounterStore;

    fn manager() -> TokenManager {
        TokenManager::new(Arc::new(CounterStore::new()), b"test-secret-at-least-16-bytes", 3600)
    }

    #[test]
    fn issue_then_validate_round_trips_claims() {
        let manager = manager();
        let token = manager.issue("0xpayer", 5).unwrap();
        let claims = manager.validate(&token).unwrap();
        assert_eq!(claims.sub, "0xpayer");
        assert_eq!(claims.requests_total, 5);
    }

    #[test]
    fn validate_rejects_garbage() {
        let manager = manager();
        assert!(manager.validate("not.a.jwt").is_err());
    }

    #[test]
    fn validate_rejects_token_signed_with_different_secret() {
        let manager_a = manager();
        let manager_b = TokenManager::new(Arc::new(CounterStore::new()), b"another-secret-16-bytes!", 3600);
        let token = manager_a.issue("0xpayer", 5).unwrap();
        assert!(manager_b.validate(&token).is_err());
    }

    #[test]
    fn consume_exhausts_after_allowance() {
        let manager = manager();
        let token = manager.issue("0xpayer", 2).unwrap();
        let claims = manager.validate(&token).unwrap();
        assert_eq!(manager.consume(&claims).unwrap(), 1);
        assert_eq!(manager.consume(&claims).unwrap(), 0);
        assert!(manager.consume(&claims).is_err());
    }
}
