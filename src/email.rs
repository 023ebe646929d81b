//! Digest delivery.
//!
//! [`SmtpMailer`] sends through an SMTP relay with STARTTLS; [`LogMailer`]
//! only logs the message and backs `--dry-run`.

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, instrument};

use crate::config::EmailSettings;
use crate::error::{NewsError, Result};
use crate::utils::truncate_for_log;

pub trait Mailer {
    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// Plain-text mail over SMTP.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    to: String,
}

impl SmtpMailer {
    pub fn from_settings(settings: &EmailSettings) -> Result<Self> {
        let (Some(username), Some(password)) = (&settings.username, &settings.password) else {
            return Err(NewsError::Config(
                "SMTP username and password are required to send mail".to_string(),
            ));
        };
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)
            .map_err(|e| NewsError::Email(e.to_string()))?
            .port(settings.smtp_port)
            .credentials(Credentials::new(username.clone(), password.clone()))
            .build();
        Ok(Self {
            transport,
            from: settings.sender()?.to_string(),
            to: settings.recipient()?.to_string(),
        })
    }
}

/// Build the digest message.
pub fn build_message(from: &str, to: &str, subject: &str, body: &str) -> Result<Message> {
    let parse = |addr: &str| {
        addr.parse::<Mailbox>()
            .map_err(|e| NewsError::Config(format!("invalid address {addr:?}: {e}")))
    };
    Message::builder()
        .from(parse(from)?)
        .to(parse(to)?)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| NewsError::Email(e.to_string()))
}

impl Mailer for SmtpMailer {
    #[instrument(level = "info", skip(self, body), fields(to = %self.to))]
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let message = build_message(&self.from, &self.to, subject, body)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| NewsError::Email(e.to_string()))?;
        info!("Email sent");
        Ok(())
    }
}

/// Logs the digest instead of sending it.
#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        info!(%subject, body = %truncate_for_log(body, 2000), "Dry run; email not sent");
        Ok(())
    }
}
