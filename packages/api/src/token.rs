//! Identity tokens for accounts.
//!
//! Tokens are HMAC-signed JWTs carrying the numeric account id. They are valid for
//! 24 hours from issuance and cannot be revoked before that.
//!
//! Environment variables:
//! - `JWT_KEY`: symmetric signing secret shared by every gateway instance

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Environment variable holding the signing secret
pub const JWT_KEY_ENV: &str = "JWT_KEY";

/// Token lifetime in seconds
pub const TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Only the HMAC family is accepted. Anything else is rejected before the signature is
/// checked, so a token cannot pick its own verification scheme.
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Signing secret not configured (missing {JWT_KEY_ENV} env var)")]
    MissingSecret,
    #[error("Failed to sign token: {0}")]
    Signing(String),
    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub user_id: i64,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        if secret.trim().is_empty() {
            return Err(TokenError::MissingSecret);
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    pub fn issue(&self, subject_id: i64) -> Result<String, TokenError> {
        self.issue_at(subject_id, Utc::now())
    }

    /// Issue a token as if it had been created at `issued_at`.
    pub fn issue_at(&self, subject_id: i64, issued_at: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = IdentityClaims {
            user_id: subject_id,
            iat: issued_at.timestamp(),
            exp: (issued_at + Duration::seconds(TOKEN_TTL_SECONDS)).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature, algorithm family and expiry; returns the account id.
    pub fn validate(&self, token: &str) -> Result<i64, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let token_data = decode::<IdentityClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| TokenError::InvalidToken(e.to_string()))?;

        Ok(token_data.claims.user_id)
    }
}
