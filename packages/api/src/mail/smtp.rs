use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};

use super::{EmailMessage, MailClient, MailError, SmtpSettings};

pub struct SmtpMailClient {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl SmtpMailClient {
    pub fn new(settings: &SmtpSettings) -> Result<Self, MailError> {
        let creds = Credentials::new(settings.username.clone(), settings.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| MailError::NotConfigured(format!("SMTP transport: {e}")))?
            .port(settings.port)
            .credentials(creds)
            .build();

        Ok(Self {
            transport,
            from_email: settings.from_email.clone(),
            from_name: settings.from_name.clone(),
        })
    }
}

#[async_trait::async_trait]
impl MailClient for SmtpMailClient {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        let from_address = format!("{} <{}>", self.from_name, self.from_email);

        let email_builder = Message::builder()
            .from(
                from_address
                    .parse()
                    .map_err(|e| MailError::InvalidAddress(format!("from: {e}")))?,
            )
            .to(message
                .to
                .parse()
                .map_err(|e| MailError::InvalidAddress(format!("to: {e}")))?)
            .subject(&message.subject);

        let email = match (message.body_html, message.body_text) {
            (Some(html), Some(text)) => email_builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    ),
            ),
            (Some(html), None) => email_builder.header(ContentType::TEXT_HTML).body(html),
            (None, Some(text)) => email_builder.header(ContentType::TEXT_PLAIN).body(text),
            (None, None) => {
                return Err(MailError::Build(
                    "email must have either HTML or text body".to_string(),
                ));
            }
        }
        .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        tracing::debug!(to = %message.to, "Email sent via SMTP");
        Ok(())
    }

    fn from_email(&self) -> &str {
        &self.from_email
    }

    fn from_name(&self) -> &str {
        &self.from_name
    }
}
