use std::{sync::Arc, time::Duration};

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tokio::sync::mpsc;

use crate::{
    extraction::{ExtractionGate, ExtractionWatchdog, FatalError, WatchdogConfig},
    inference::{DynInference, GrpcInference, InferenceConfig, InferenceError},
    mail::{DynMailClient, MailError, SmtpSettings, create_mail_client},
    middleware::AuthGate,
    otp::OtpReplayPolicy,
    store::{
        DynAccountStore, DynConversationStore, DynPdfStore, PostgresAccountStore,
        PostgresConversationStore, PostgresPdfStore,
    },
    token::{TokenError, TokenService},
};

pub type AppState = Arc<State>;

/// Everything [`State::connect`] needs from the environment.
#[derive(Clone)]
pub struct StateConfig {
    pub database_url: String,
    pub jwt_key: String,
    pub inference: InferenceConfig,
    pub smtp: Option<SmtpSettings>,
    pub otp_replay_policy: OtpReplayPolicy,
    pub watchdog: WatchdogConfig,
}

impl std::fmt::Debug for StateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateConfig")
            .field("inference", &self.inference)
            .field("smtp", &self.smtp)
            .field("otp_replay_policy", &self.otp_replay_policy)
            .field("watchdog", &self.watchdog)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("database connection failed: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Mail(#[from] MailError),
}

/// Collaborators the handlers talk to.
pub struct Backends {
    pub db: Option<Arc<DatabaseConnection>>,
    pub accounts: DynAccountStore,
    pub pdfs: DynPdfStore,
    pub conversations: DynConversationStore,
    pub inference: DynInference,
    pub mail_client: DynMailClient,
}

pub struct State {
    pub db: Option<Arc<DatabaseConnection>>,
    pub tokens: Arc<TokenService>,
    pub auth: AuthGate,
    pub otp_policy: OtpReplayPolicy,
    pub accounts: DynAccountStore,
    pub pdfs: DynPdfStore,
    pub conversations: DynConversationStore,
    pub inference: DynInference,
    pub mail_client: DynMailClient,
    pub extraction: ExtractionGate,
    pub watchdog: ExtractionWatchdog,
}

impl State {
    pub fn new(
        tokens: TokenService,
        otp_policy: OtpReplayPolicy,
        watchdog: WatchdogConfig,
        backends: Backends,
        fatal: mpsc::UnboundedSender<FatalError>,
    ) -> Self {
        let tokens = Arc::new(tokens);
        let extraction = ExtractionGate::new();

        State {
            db: backends.db,
            auth: AuthGate::new(tokens.clone(), backends.accounts.clone()),
            tokens,
            otp_policy,
            accounts: backends.accounts,
            pdfs: backends.pdfs,
            conversations: backends.conversations,
            inference: backends.inference,
            mail_client: backends.mail_client,
            watchdog: ExtractionWatchdog::new(extraction.clone(), watchdog, fatal),
            extraction,
        }
    }

    /// Connects Postgres, the inference backend and SMTP.
    pub async fn connect(
        config: &StateConfig,
        fatal: mpsc::UnboundedSender<FatalError>,
    ) -> Result<Self, StartupError> {
        let tokens = TokenService::new(&config.jwt_key)?;

        let mut opt = ConnectOptions::new(config.database_url.to_owned());
        opt.max_connections(20)
            .min_connections(2)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .sqlx_logging(false);
        let db = Arc::new(Database::connect(opt).await?);
        tracing::info!("Connected to database");

        let inference = GrpcInference::connect(&config.inference).await?;

        if config.smtp.is_none() {
            tracing::warn!("SMTP is not configured, OTP mails will fail");
        }
        let mail_client = create_mail_client(config.smtp.as_ref())?;

        let backends = Backends {
            db: Some(db.clone()),
            accounts: Arc::new(PostgresAccountStore::new(db.clone())),
            pdfs: Arc::new(PostgresPdfStore::new(db.clone())),
            conversations: Arc::new(PostgresConversationStore::new(db)),
            inference: Arc::new(inference),
            mail_client,
        };

        Ok(State::new(
            tokens,
            config.otp_replay_policy,
            config.watchdog,
            backends,
            fatal,
        ))
    }
}
