//! One-time codes that prove control of an email address.
//!
//! Codes are six decimal digits from a cryptographically secure RNG, stored only as
//! Argon2id hashes. A code is accepted for two hours after it was generated.
//! Hashing and verification run on the blocking thread pool.

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const OTP_VALIDITY: Duration = Duration::hours(2);

const OTP_SPACE: u32 = 1_000_000;

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("OTP expired")]
    Expired,
    #[error("OTP does not match")]
    Mismatch,
    #[error("hashing failed: {0}")]
    Hashing(String),
}

/// A freshly generated code. The plain code only lives long enough to be mailed.
#[derive(Clone)]
pub struct OtpRecord {
    pub code: String,
    pub generated_at: DateTime<Utc>,
}

impl std::fmt::Debug for OtpRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpRecord")
            .field("code", &"******")
            .field("generated_at", &self.generated_at)
            .finish()
    }
}

/// What the persistence layer keeps for a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOtp {
    pub hash: String,
    pub generated_at: DateTime<Utc>,
}

/// Destination table for an OTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OtpTable {
    /// Permanent account table, used by the password reset flow.
    Account,
    /// Pending registrations awaiting email confirmation.
    PendingRegistration,
}

impl OtpTable {
    pub fn index(self) -> u8 {
        match self {
            OtpTable::Account => 0,
            OtpTable::PendingRegistration => 1,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(OtpTable::Account),
            1 => Some(OtpTable::PendingRegistration),
            _ => None,
        }
    }
}

/// Whether a verified code stays usable for the rest of its window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OtpReplayPolicy {
    #[default]
    AllowReplay,
    InvalidateOnSuccess,
}

impl std::str::FromStr for OtpReplayPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow-replay" | "allow_replay" => Ok(OtpReplayPolicy::AllowReplay),
            "invalidate-on-success" | "invalidate_on_success" => {
                Ok(OtpReplayPolicy::InvalidateOnSuccess)
            }
            other => Err(format!("unknown OTP replay policy '{other}'")),
        }
    }
}

pub fn generate() -> OtpRecord {
    generate_at(Utc::now())
}

pub fn generate_at(now: DateTime<Utc>) -> OtpRecord {
    let value = rand::rng().random_range(0..OTP_SPACE);
    OtpRecord {
        code: format!("{value:06}"),
        generated_at: now,
    }
}

pub async fn hash_for_storage(code: &str) -> Result<String, OtpError> {
    hash_secret(code).await
}

pub async fn verify(
    stored_hash: &str,
    presented: &str,
    generated_at: DateTime<Utc>,
) -> Result<(), OtpError> {
    verify_at(stored_hash, presented, generated_at, Utc::now()).await
}

/// Expiry is checked before the hash so an expired code never reaches the hasher.
pub async fn verify_at(
    stored_hash: &str,
    presented: &str,
    generated_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), OtpError> {
    if now - generated_at > OTP_VALIDITY {
        return Err(OtpError::Expired);
    }

    if verify_secret(stored_hash, presented).await? {
        Ok(())
    } else {
        Err(OtpError::Mismatch)
    }
}

/// Argon2id PHC string with a random salt. Also used for account passwords.
pub async fn hash_secret(secret: &str) -> Result<String, OtpError> {
    let secret = secret.to_owned();
    blocking(move || hash_blocking(&secret)).await
}

/// `Ok(false)` on a wrong secret, `Err` only if the stored hash is unreadable.
///
/// Accepts the bcrypt hashes (`$2a$`, `$2b$`, `$2y$`) already in the database
/// next to the Argon2id ones written by [`hash_secret`].
pub async fn verify_secret(stored_hash: &str, presented: &str) -> Result<bool, OtpError> {
    let stored_hash = stored_hash.to_owned();
    let presented = presented.to_owned();
    blocking(move || verify_blocking(&stored_hash, &presented)).await
}

fn is_bcrypt(hash: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"]
        .iter()
        .any(|prefix| hash.starts_with(prefix))
}

async fn blocking<T, F>(work: F) -> Result<T, OtpError>
where
    F: FnOnce() -> Result<T, OtpError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| OtpError::Hashing(e.to_string()))?
}

pub(crate) fn hash_blocking(secret: &str) -> Result<String, OtpError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| OtpError::Hashing(e.to_string()))
}

fn verify_blocking(stored_hash: &str, presented: &str) -> Result<bool, OtpError> {
    if is_bcrypt(stored_hash) {
        return bcrypt::verify(presented, stored_hash)
            .map_err(|e| OtpError::Hashing(e.to_string()));
    }

    let parsed = PasswordHash::new(stored_hash).map_err(|e| OtpError::Hashing(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(presented.as_bytes(), &parsed)
        .is_ok())
}
