use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::MailConfig;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

impl OutgoingMail {
    pub fn otp(from: &str, to: &str, code: &str, ttl_minutes: u64) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: "Your Verification Code".to_string(),
            text: format!(
                "Your verification code is: {code}\nThis code will expire in {ttl_minutes} minutes."
            ),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

/// Picks the transport for `[mail]`: SMTP when a host is set, else the log.
pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    if config.smtp_configured() {
        return Ok(Arc::new(SmtpMailer::new(config)?));
    }
    if config.enable_log {
        warn!("no SMTP host configured, OTP mails will only be logged");
        return Ok(Arc::new(LogMailer));
    }
    warn!("mail delivery disabled, OTP requests will fail");
    Ok(Arc::new(DisabledMailer))
}

/// Writes the message to the log instead of delivering it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        info!(to = %mail.to, subject = %mail.subject, "mail: {}", mail.text);
        Ok(())
    }
}

/// Refuses every message.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _mail: &OutgoingMail) -> Result<()> {
        Err(anyhow!(
            "no mail transport configured, set mail.smtp_host or mail.enable_log"
        ))
    }
}

/// STARTTLS SMTP delivery through `lettre`.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(config.smtp_host.trim())?
                .port(config.smtp_port);
        if let Some(credentials) = credentials(config) {
            builder = builder.credentials(credentials);
        }
        Ok(Self {
            transport: builder.build(),
        })
    }
}

/// App passwords are often pasted with spaces between the groups.
fn credentials(config: &MailConfig) -> Option<Credentials> {
    let user = config.smtp_user.trim();
    let password: String = config
        .smtp_password
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if user.is_empty() || password.is_empty() {
        return None;
    }
    Some(Credentials::new(user.to_string(), password))
}

pub fn build_message(mail: &OutgoingMail) -> Result<Message> {
    let message = Message::builder()
        .from(mail.from.parse()?)
        .to(mail.to.parse()?)
        .subject(mail.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(mail.text.clone())?;
    Ok(message)
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let message = build_message(mail)?;
        self.transport.send(message).await?;
        info!(to = %mail.to, "OTP mail sent");
        Ok(())
    }
}
