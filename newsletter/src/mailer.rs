//! Digest delivery over SMTP.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::info;

use crate::compose::ComposedMessage;
use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

/// Delivery backend for composed digests.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `message` to every configured recipient in one transaction.
    async fn send(&self, message: &ComposedMessage) -> Result<(), MailError>;
}

/// STARTTLS SMTP mailer using lettre.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
    subject: String,
}

impl SmtpMailer {
    /// Create a mailer from explicit configuration.
    ///
    /// No connection is made until the first [`Mailer::send`].
    pub fn from_config(config: &SmtpConfig) -> Result<Self, MailError> {
        let (from, to) = mailboxes(config)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| MailError::Smtp(e.to_string()))?
            .port(config.port)
            .credentials(Credentials::new(config.sender.clone(), config.password.clone()))
            .build();

        Ok(Self {
            transport,
            from,
            to,
            subject: config.subject.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &ComposedMessage) -> Result<(), MailError> {
        let email = build_message(&self.from, &self.to, &self.subject, message)?;

        info!(
            recipients = self.to.len(),
            inline_images = message.parts.len(),
            "smtp_send_starting"
        );

        self.transport
            .send(email)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;

        info!("smtp_send_complete");
        Ok(())
    }
}

fn mailboxes(config: &SmtpConfig) -> Result<(Mailbox, Vec<Mailbox>), MailError> {
    let from: Mailbox = config
        .sender
        .parse()
        .map_err(|_| MailError::InvalidAddress(config.sender.clone()))?;

    let to = config
        .recipients
        .iter()
        .map(|r| r.parse().map_err(|_| MailError::InvalidAddress(r.clone())))
        .collect::<Result<Vec<Mailbox>, _>>()?;

    Ok((from, to))
}

/// Build the `multipart/related` email: an HTML alternative followed by one
/// inline part per image.
pub fn build_message(
    from: &Mailbox,
    to: &[Mailbox],
    subject: &str,
    message: &ComposedMessage,
) -> Result<Message, MailError> {
    let mut builder = Message::builder().from(from.clone()).subject(subject);
    for mailbox in to {
        builder = builder.to(mailbox.clone());
    }

    let mut related = MultiPart::related()
        .multipart(MultiPart::alternative().singlepart(SinglePart::html(message.html())));

    for part in &message.parts {
        let content_type = ContentType::parse(part.kind.mime_type())
            .map_err(|e| MailError::Build(e.to_string()))?;
        related = related.singlepart(
            Attachment::new_inline(part.content_id.clone()).body(part.bytes.clone(), content_type),
        );
    }

    builder
        .multipart(related)
        .map_err(|e| MailError::Build(e.to_string()))
}
