// # E-mail Notifier
//
// This crate provides the notifiers for the postwatch package tracker:
//
// - `SmtpNotifier`: renders an HTML e-mail and delivers it over a STARTTLS
//   SMTP relay
// - `LogNotifier`: logs the same content via `tracing` (dry runs)
//
// ## Behavior
//
// - One message per detected change
// - Failures surface as `Error::Notify`; the pipeline skips persisting the
//   change so it is notified again on the next cycle
// - No retry logic (owned by the poll cycle)
//
// ## Security
//
// SMTP credentials never appear in logs or Debug output.

use askama::Template;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use postwatch_core::config::NotifierConfig;
use postwatch_core::snapshot::{LogEntry, Snapshot};
use postwatch_core::traits::notifier::movements;
use postwatch_core::traits::{Notifier, NotifierFactory};
use postwatch_core::{ComponentRegistry, Error, Result};

/// Placeholder replaced with the package identifier in subject templates
pub const IDENTIFIER_PLACEHOLDER: &str = "{identifier}";

/// HTML body of a change notification
#[derive(Template)]
#[template(path = "notification.html")]
struct NotificationTemplate<'a> {
    identifier: &'a str,
    category: &'a str,
    from: String,
    movements: &'a [LogEntry],
}

/// Render the subject line for `identifier`
pub fn render_subject(template: &str, identifier: &str) -> String {
    template.replace(IDENTIFIER_PLACEHOLDER, identifier)
}

/// Render the HTML body for a change
///
/// Lists the delta, or the full log when the delta is empty. Carrier text
/// is HTML-escaped.
pub fn render_body(snapshot: &Snapshot, delta: &[LogEntry]) -> Result<String> {
    NotificationTemplate {
        identifier: &snapshot.identifier,
        category: &snapshot.category,
        from: snapshot.origin.summary(),
        movements: movements(snapshot, delta),
    }
    .render()
    .map_err(|e| Error::notify(format!("Failed to render notification: {}", e)))
}

/// Parse a mailbox from configuration
fn parse_mailbox(field: &str, value: &str) -> Result<Mailbox> {
    value
        .parse()
        .map_err(|e| Error::config(format!("Invalid e-mail {} address '{}': {}", field, value, e)))
}

/// SMTP e-mail notifier
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose credentials.
pub struct SmtpNotifier {
    /// Relay host (for logging)
    server: String,

    /// Relay port (for logging)
    port: u16,

    /// Sender
    from: Mailbox,

    /// Recipient
    to: Mailbox,

    /// Subject template
    subject: String,

    /// STARTTLS transport
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("from", &self.from.to_string())
            .field("to", &self.to.to_string())
            .field("subject", &self.subject)
            .field("credentials", &"<REDACTED>")
            .finish()
    }
}

impl SmtpNotifier {
    /// Create a new SMTP notifier
    ///
    /// No connection is made until the first notification.
    ///
    /// # Parameters
    ///
    /// - `server`, `port`: STARTTLS relay
    /// - `credentials`: `(username, password)`; `None` for an open relay
    /// - `from`, `to`: Mailbox strings (`"Name <addr>"` or `"addr"`)
    /// - `subject`: Subject template, `{identifier}` is replaced
    pub fn new(
        server: &str,
        port: u16,
        credentials: Option<(String, String)>,
        from: &str,
        to: &str,
        subject: impl Into<String>,
    ) -> Result<Self> {
        let from = parse_mailbox("sender", from)?;
        let to = parse_mailbox("recipient", to)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)
            .map_err(|e| Error::config(format!("Invalid SMTP relay '{}': {}", server, e)))?
            .port(port);
        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            server: server.to_string(),
            port,
            from,
            to,
            subject: subject.into(),
            transport: builder.build(),
        })
    }

    /// Build the message for a change without sending it
    pub fn build_message(&self, snapshot: &Snapshot, delta: &[LogEntry]) -> Result<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(render_subject(&self.subject, &snapshot.identifier))
            .header(ContentType::TEXT_HTML)
            .body(render_body(snapshot, delta)?)
            .map_err(|e| Error::notify(format!("Failed to build e-mail: {}", e)))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, snapshot: &Snapshot, delta: &[LogEntry]) -> Result<()> {
        tracing::info!(package = %snapshot.identifier, "Sending notification...");

        let message = self.build_message(snapshot, delta)?;

        self.transport.send(message).await.map_err(|e| {
            Error::notify(format!(
                "SMTP delivery via {}:{} failed: {}",
                self.server, self.port, e
            ))
        })?;

        tracing::info!(package = %snapshot.identifier, "Notification sent");
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "smtp"
    }
}

/// Notifier that only logs
///
/// Used for dry runs: the pipeline still persists the change, so each
/// change is logged once.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, snapshot: &Snapshot, delta: &[LogEntry]) -> Result<()> {
        let shown = movements(snapshot, delta);

        tracing::info!(
            package = %snapshot.identifier,
            "[DRY-RUN] Would notify {} movement(s) (category '{}', from {})",
            shown.len(),
            snapshot.category,
            snapshot.origin.summary()
        );
        for movement in shown {
            tracing::info!(
                package = %snapshot.identifier,
                "  {} - {}",
                movement.date,
                movement.description
            );
        }

        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "log"
    }
}

/// Factory for creating SMTP notifiers
pub struct SmtpFactory;

impl NotifierFactory for SmtpFactory {
    fn create(&self, config: &NotifierConfig) -> Result<Box<dyn Notifier>> {
        match config {
            NotifierConfig::Smtp {
                server,
                port,
                username,
                password,
                from,
                to,
                subject,
            } => {
                let credentials = if username.is_empty() {
                    tracing::warn!("No SMTP username configured, sending without authentication");
                    None
                } else {
                    Some((username.clone(), password.clone()))
                };

                Ok(Box::new(SmtpNotifier::new(
                    server,
                    *port,
                    credentials,
                    from,
                    to,
                    subject.clone(),
                )?))
            }
            _ => Err(Error::config("Invalid config for SMTP notifier")),
        }
    }
}

/// Factory for creating log notifiers
pub struct LogFactory;

impl NotifierFactory for LogFactory {
    fn create(&self, config: &NotifierConfig) -> Result<Box<dyn Notifier>> {
        match config {
            NotifierConfig::Log => {
                tracing::warn!("Log notifier active - no e-mail will be sent");
                Ok(Box::new(LogNotifier))
            }
            _ => Err(Error::config("Invalid config for log notifier")),
        }
    }
}

/// Register the `smtp` and `log` notifiers with a registry
///
/// # Example
///
/// ```rust
/// use postwatch_core::ComponentRegistry;
///
/// let registry = ComponentRegistry::new();
/// postwatch_notify_smtp::register(&registry);
/// assert!(registry.has_notifier("smtp"));
/// assert!(registry.has_notifier("log"));
/// ```
pub fn register(registry: &ComponentRegistry) {
    registry.register_notifier("smtp", Box::new(SmtpFactory));
    registry.register_notifier("log", Box::new(LogFactory));
}
