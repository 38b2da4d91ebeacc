//! Outgoing mail: verification codes and account notices.
//!
//! `SmtpMailSender` renders the HTML templates under `templates/` and delivers
//! through an SMTP relay with implicit TLS. `LogMailSender` only logs, for local
//! runs without a relay. `RecordingMailSender` keeps the latest messages for tests.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::{ExposeSecret, SecretString};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::store::BoxFuture;

const CODE_TEMPLATE: &str = include_str!("../templates/verification_code.html");
const NOTICE_TEMPLATE: &str = include_str!("../templates/notice.html");
const SENDER_NAME: &str = "Daling Online";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Mail delivery used by the account flows.
pub trait MailSender: Send + Sync {
    /// Deliver a one-time code. `operate` names the action the code unlocks.
    fn send_code<'a>(
        &'a self,
        to: &'a str,
        name: &'a str,
        operate: &'a str,
        code: &'a str,
    ) -> BoxFuture<'a, Result<(), MailError>>;

    fn send_notice<'a>(
        &'a self,
        to: &'a str,
        name: &'a str,
        title: &'a str,
        content: &'a str,
    ) -> BoxFuture<'a, Result<(), MailError>>;
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Fill `{{key}}` placeholders in one pass over the template, escaping every
/// value. Unknown placeholders are left as they are.
#[must_use]
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut html = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        html.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            rest = &rest[start..];
            break;
        };
        let key = &after[..end];
        match values.iter().find(|(name, _)| *name == key) {
            Some((_, value)) => html.push_str(&escape_html(value)),
            None => html.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    html.push_str(rest);
    html
}

#[must_use]
pub fn render_code(name: &str, operate: &str, code: &str) -> String {
    render(
        CODE_TEMPLATE,
        &[("name", name), ("operate", operate), ("code", code)],
    )
}

#[must_use]
pub fn render_notice(name: &str, title: &str, content: &str) -> String {
    render(
        NOTICE_TEMPLATE,
        &[("name", name), ("title", title), ("content", content)],
    )
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    host: String,
    port: u16,
    user: String,
    password: SecretString,
    sender: String,
}

impl SmtpConfig {
    #[must_use]
    pub fn new(host: String, port: u16, user: String, password: SecretString) -> Self {
        Self {
            host,
            port,
            sender: user.clone(),
            user,
            password,
        }
    }

    /// Address in the `From` header; defaults to the SMTP user.
    #[must_use]
    pub fn with_sender(mut self, sender: String) -> Self {
        self.sender = sender;
        self
    }
}

pub struct SmtpMailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailSender {
    /// Build the relay transport. No connection is opened until the first send.
    ///
    /// # Errors
    /// Returns an error if the sender address or relay host is invalid.
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let from = Mailbox::new(Some(SENDER_NAME.to_string()), config.sender.parse()?);
        let credentials = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().to_string(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();
        Ok(Self { transport, from })
    }

    async fn deliver(&self, to: &str, subject: String, html: String) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse::<Mailbox>()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)?;
        self.transport.send(message).await?;
        Ok(())
    }
}

impl MailSender for SmtpMailSender {
    fn send_code<'a>(
        &'a self,
        to: &'a str,
        name: &'a str,
        operate: &'a str,
        code: &'a str,
    ) -> BoxFuture<'a, Result<(), MailError>> {
        Box::pin(async move {
            let html = render_code(name, operate, code);
            let subject = format!("{SENDER_NAME} - Verification code");
            match self.deliver(to, subject, html).await {
                Ok(()) => {
                    debug!(to, "verification code mail sent");
                    Ok(())
                }
                Err(err) => {
                    error!(to, "verification code mail failed: {err}");
                    Err(err)
                }
            }
        })
    }

    fn send_notice<'a>(
        &'a self,
        to: &'a str,
        name: &'a str,
        title: &'a str,
        content: &'a str,
    ) -> BoxFuture<'a, Result<(), MailError>> {
        Box::pin(async move {
            let html = render_notice(name, title, content);
            let subject = format!("{SENDER_NAME} - {title}");
            self.deliver(to, subject, html).await
        })
    }
}

/// Sender used when no relay is configured. Codes are only logged at `debug`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailSender;

impl MailSender for LogMailSender {
    fn send_code<'a>(
        &'a self,
        to: &'a str,
        name: &'a str,
        operate: &'a str,
        code: &'a str,
    ) -> BoxFuture<'a, Result<(), MailError>> {
        Box::pin(async move {
            info!(to, name, operate, "verification code not mailed, no smtp relay");
            debug!(to, code, "verification code");
            Ok(())
        })
    }

    fn send_notice<'a>(
        &'a self,
        to: &'a str,
        name: &'a str,
        title: &'a str,
        _content: &'a str,
    ) -> BoxFuture<'a, Result<(), MailError>> {
        Box::pin(async move {
            info!(to, name, title, "notice not mailed, no smtp relay");
            Ok(())
        })
    }
}

/// A message handed to [`RecordingMailSender`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentMail {
    Code {
        to: String,
        name: String,
        operate: String,
        code: String,
    },
    Notice {
        to: String,
        name: String,
        title: String,
        content: String,
    },
}

const RECORDED_LIMIT: usize = 256;

/// Keeps the most recent messages instead of delivering them. Clones share the
/// same buffer.
#[derive(Clone, Debug, Default)]
pub struct RecordingMailSender {
    sent: Arc<Mutex<VecDeque<SentMail>>>,
}

impl RecordingMailSender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages handed to this sender, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent
            .lock()
            .map(|sent| sent.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&self, mail: SentMail) {
        if let Ok(mut sent) = self.sent.lock() {
            if sent.len() == RECORDED_LIMIT {
                sent.pop_front();
            }
            sent.push_back(mail);
        }
    }
}

impl MailSender for RecordingMailSender {
    fn send_code<'a>(
        &'a self,
        to: &'a str,
        name: &'a str,
        operate: &'a str,
        code: &'a str,
    ) -> BoxFuture<'a, Result<(), MailError>> {
        Box::pin(async move {
            self.record(SentMail::Code {
                to: to.to_string(),
                name: name.to_string(),
                operate: operate.to_string(),
                code: code.to_string(),
            });
            Ok(())
        })
    }

    fn send_notice<'a>(
        &'a self,
        to: &'a str,
        name: &'a str,
        title: &'a str,
        content: &'a str,
    ) -> BoxFuture<'a, Result<(), MailError>> {
        Box::pin(async move {
            self.record(SentMail::Notice {
                to: to.to_string(),
                name: name.to_string(),
                title: title.to_string(),
                content: content.to_string(),
            });
            Ok(())
        })
    }
}
