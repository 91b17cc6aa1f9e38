use std::sync::Arc;

#[cfg(feature = "smtp")]
mod smtp;
pub mod templates;

#[cfg(feature = "smtp")]
pub use smtp::SmtpMailClient;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail is not configured: {0}")]
    NotConfigured(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("failed to build email: {0}")]
    Build(String),
    #[error("failed to send email: {0}")]
    Transport(String),
}

/// Relay settings. Port 587 is reached with STARTTLS.
#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
}

impl EmailMessage {
    pub fn otp(to: &str, code: &str) -> Self {
        let (html, text) = templates::otp_code(code);
        Self {
            to: to.to_string(),
            subject: templates::OTP_SUBJECT.to_string(),
            body_html: Some(html),
            body_text: Some(text),
        }
    }
}

impl std::fmt::Debug for EmailMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailMessage")
            .field("to", &self.to)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
pub trait MailClient: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError>;
    fn from_email(&self) -> &str;
    fn from_name(&self) -> &str;
}

pub type DynMailClient = Arc<dyn MailClient>;

/// Stands in when no SMTP credentials are configured. Every send fails.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredMailClient;

#[async_trait::async_trait]
impl MailClient for UnconfiguredMailClient {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        tracing::warn!(to = %message.to, "Dropping email, mail is not configured");
        Err(MailError::NotConfigured(
            "SMTP_USERNAME and SMTP_PWD are not set".to_string(),
        ))
    }

    fn from_email(&self) -> &str {
        ""
    }

    fn from_name(&self) -> &str {
        ""
    }
}

/// SMTP client when settings are present, otherwise [`UnconfiguredMailClient`].
pub fn create_mail_client(settings: Option<&SmtpSettings>) -> Result<DynMailClient, MailError> {
    match settings {
        #[cfg(feature = "smtp")]
        Some(settings) => Ok(Arc::new(SmtpMailClient::new(settings)?)),
        #[cfg(not(feature = "smtp"))]
        Some(_) => Err(MailError::NotConfigured(
            "SMTP feature not enabled".to_string(),
        )),
        None => Ok(Arc::new(UnconfiguredMailClient)),
    }
}
