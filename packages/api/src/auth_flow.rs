//! The email verification protocol behind registration and password reset.
//!
//! Each stage is a value that can only be produced by the stage before it:
//!
//! ```text
//! Unverified ──require_*──▶ Unverified ──issue_otp──▶ OtpIssued ──stage/store──▶ (mail sent, hash persisted)
//! Unverified ──verify_otp──▶ OtpVerified ──commit_registration / reset_password──▶ done
//! ```
//!
//! Issuing and verifying happen in different requests, so the persisted OTP hash is
//! the only link between the two halves.

use chrono::{DateTime, Utc};

use crate::{
    error::ApiError,
    mail::{EmailMessage, MailClient},
    otp::{self, OtpRecord, OtpReplayPolicy, OtpTable, StoredOtp},
    store::{AccountStore, StoreError},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unverified {
    email: String,
}

#[derive(Debug)]
pub struct OtpIssued {
    email: String,
    otp: OtpRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpVerified {
    email: String,
}

impl Unverified {
    pub fn new(email: &str) -> Result<Self, ApiError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ApiError::bad_request("Email is required"));
        }
        Ok(Self {
            email: email.to_string(),
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub async fn require_new_account(self, accounts: &dyn AccountStore) -> Result<Self, ApiError> {
        if accounts.email_registered(&self.email).await? {
            return Err(ApiError::conflict("Account has already existed"));
        }
        Ok(self)
    }

    pub async fn require_existing_account(
        self,
        accounts: &dyn AccountStore,
    ) -> Result<Self, ApiError> {
        if !accounts.email_registered(&self.email).await? {
            return Err(ApiError::conflict("Account has not existed yet."));
        }
        Ok(self)
    }

    /// Generates a code and mails it. Nothing is persisted yet.
    pub async fn issue_otp(self, mail: &dyn MailClient) -> Result<OtpIssued, ApiError> {
        let otp = otp::generate();
        mail.send(EmailMessage::otp(&self.email, &otp.code)).await?;
        tracing::info!("OTP mail sent");

        Ok(OtpIssued {
            email: self.email,
            otp,
        })
    }

    pub async fn verify_otp(
        self,
        accounts: &dyn AccountStore,
        table: OtpTable,
        presented: &str,
        policy: OtpReplayPolicy,
    ) -> Result<OtpVerified, ApiError> {
        self.verify_otp_at(accounts, table, presented, policy, Utc::now())
            .await
    }

    pub async fn verify_otp_at(
        self,
        accounts: &dyn AccountStore,
        table: OtpTable,
        presented: &str,
        policy: OtpReplayPolicy,
        now: DateTime<Utc>,
    ) -> Result<OtpVerified, ApiError> {
        let stored = match accounts.load_otp(table, &self.email).await {
            Ok(stored) => stored,
            Err(StoreError::NotFound) => return Err(ApiError::not_found("OTP not found")),
            Err(err) => return Err(err.into()),
        };

        otp::verify_at(&stored.hash, presented, stored.generated_at, now).await?;

        if policy == OtpReplayPolicy::InvalidateOnSuccess {
            accounts.clear_otp(table, &self.email).await?;
        }

        Ok(OtpVerified { email: self.email })
    }
}

impl OtpIssued {
    pub fn email(&self) -> &str {
        &self.email
    }

    async fn stored(&self) -> Result<StoredOtp, ApiError> {
        Ok(StoredOtp {
            hash: otp::hash_for_storage(&self.otp.code).await?,
            generated_at: self.otp.generated_at,
        })
    }

    /// Upserts the pending registration with the hashed password and OTP.
    pub async fn stage_registration(
        self,
        accounts: &dyn AccountStore,
        password: &str,
    ) -> Result<(), ApiError> {
        let stored = self.stored().await?;
        let password_hash = otp::hash_secret(password).await?;
        accounts
            .stage_registration(&self.email, &password_hash, &stored)
            .await?;
        Ok(())
    }

    pub async fn store(self, accounts: &dyn AccountStore, table: OtpTable) -> Result<(), ApiError> {
        let stored = self.stored().await?;
        accounts.store_otp(table, &self.email, &stored).await?;
        Ok(())
    }
}

impl OtpVerified {
    pub fn email(&self) -> &str {
        &self.email
    }

    pub async fn commit_registration(self, accounts: &dyn AccountStore) -> Result<String, ApiError> {
        accounts.commit_registration(&self.email).await.map_err(|e| match e {
            StoreError::NotFound => ApiError::not_found("Pending registration not found"),
            other => other.into(),
        })?;
        tracing::info!("Registration committed");
        Ok(self.email)
    }

    pub async fn reset_password(
        self,
        accounts: &dyn AccountStore,
        new_password: &str,
    ) -> Result<(), ApiError> {
        if new_password.is_empty() {
            return Err(ApiError::bad_request("Password is required"));
        }
        let password_hash = otp::hash_secret(new_password).await?;
        accounts
            .update_password(&self.email, &password_hash)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ApiError::not_found("Account not found"),
                other => other.into(),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryAccountStore, RecordingMailer};
    use axum::http::StatusCode;
    use chrono::Duration;

    const EMAIL: &str = "new@example.com";

    async fn staged(accounts: &MemoryAccountStore, mailer: &RecordingMailer) -> String {
        Unverified::new(EMAIL)
            .unwrap()
            .require_new_account(accounts)
            .await
            .unwrap()
            .issue_otp(mailer)
            .await
            .unwrap()
            .stage_registration(accounts, "hunter2")
            .await
            .unwrap();
        mailer.last_code_for(EMAIL).unwrap()
    }

    #[test]
    fn blank_email_is_rejected() {
        assert_eq!(
            Unverified::new("   ").unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn registration_runs_through_every_stage() {
        let accounts = MemoryAccountStore::default();
        let mailer = RecordingMailer::default();
        let code = staged(&accounts, &mailer).await;

        let stored = accounts.otp(OtpTable::PendingRegistration, EMAIL).unwrap();
        assert_ne!(stored.hash, code);

        let email = Unverified::new(EMAIL)
            .unwrap()
            .verify_otp(
                &accounts,
                OtpTable::PendingRegistration,
                &code,
                OtpReplayPolicy::AllowReplay,
            )
            .await
            .unwrap()
            .commit_registration(&accounts)
            .await
            .unwrap();

        assert_eq!(email, EMAIL);
        assert!(accounts.email_registered(EMAIL).await.unwrap());
    }

    #[tokio::test]
    async fn registered_email_cannot_register_again() {
        let accounts = MemoryAccountStore::default();
        accounts.add_user(EMAIL, "pw");
        let err = Unverified::new(EMAIL)
            .unwrap()
            .require_new_account(&accounts)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_email_cannot_reset() {
        let accounts = MemoryAccountStore::default();
        let err = Unverified::new(EMAIL)
            .unwrap()
            .require_existing_account(&accounts)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn expired_code_is_rejected() {
        let accounts = MemoryAccountStore::default();
        let mailer = RecordingMailer::default();
        let code = staged(&accounts, &mailer).await;
        let generated_at = accounts
            .otp(OtpTable::PendingRegistration, EMAIL)
            .unwrap()
            .generated_at;

        let err = Unverified::new(EMAIL)
            .unwrap()
            .verify_otp_at(
                &accounts,
                OtpTable::PendingRegistration,
                &code,
                OtpReplayPolicy::AllowReplay,
                generated_at + Duration::hours(2) + Duration::minutes(1),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "OTP_EXPIRED");
    }

    #[tokio::test]
    async fn missing_otp_is_not_found() {
        let accounts = MemoryAccountStore::default();
        let err = Unverified::new(EMAIL)
            .unwrap()
            .verify_otp(
                &accounts,
                OtpTable::Account,
                "123456",
                OtpReplayPolicy::AllowReplay,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn replay_policy_controls_second_use() {
        for (policy, second_ok) in [
            (OtpReplayPolicy::AllowReplay, true),
            (OtpReplayPolicy::InvalidateOnSuccess, false),
        ] {
            let accounts = MemoryAccountStore::default();
            let mailer = RecordingMailer::default();
            let code = staged(&accounts, &mailer).await;

            let verify = || {
                Unverified::new(EMAIL).unwrap().verify_otp(
                    &accounts,
                    OtpTable::PendingRegistration,
                    &code,
                    policy,
                )
            };

            assert!(verify().await.is_ok());
            assert_eq!(verify().await.is_ok(), second_ok, "policy {policy:?}");
        }
    }

    #[tokio::test]
    async fn reset_updates_password_hash() {
        let accounts = MemoryAccountStore::default();
        let mailer = RecordingMailer::default();
        accounts.add_user(EMAIL, "old-password");

        Unverified::new(EMAIL)
            .unwrap()
            .require_existing_account(&accounts)
            .await
            .unwrap()
            .issue_otp(&mailer)
            .await
            .unwrap()
            .store(&accounts, OtpTable::Account)
            .await
            .unwrap();
        let code = mailer.last_code_for(EMAIL).unwrap();

        Unverified::new(EMAIL)
            .unwrap()
            .verify_otp(&accounts, OtpTable::Account, &code, OtpReplayPolicy::AllowReplay)
            .await
            .unwrap()
            .reset_password(&accounts, "new-password")
            .await
            .unwrap();

        let creds = accounts.user_credentials(EMAIL).await.unwrap();
        assert!(otp::verify_secret(&creds.password_hash, "new-password").await.unwrap());
        assert!(!otp::verify_secret(&creds.password_hash, "old-password").await.unwrap());
    }

    #[tokio::test]
    async fn mail_failure_stops_the_pipeline() {
        let accounts = MemoryAccountStore::default();
        let mailer = RecordingMailer::default();
        mailer.fail_sends();

        let err = Unverified::new(EMAIL)
            .unwrap()
            .issue_otp(&mailer)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MAIL_ERROR");
        assert!(accounts.otp(OtpTable::PendingRegistration, EMAIL).is_none());
    }
}
