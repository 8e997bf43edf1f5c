//! Throttled notification dispatch.
//!
//! A [`NotificationGate`] sits between a poll loop and its [`Transport`]:
//! it decides whether a notification may go out now, formats a bounded
//! summary of the matched message, and only advances its throttle clock
//! after the transport confirms the send. Each poll loop owns its own gate,
//! so the tracking modes throttle independently of each other.

use crate::envelope::MessageEnvelope;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Attachment extensions eligible for inline image delivery.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Maximum characters of subject/sender/body surfaced in a summary.
const SUMMARY_FIELD_CHARS: usize = 100;

/// Maximum attachment names listed in a summary before "+N more".
const SUMMARY_ATTACHMENT_NAMES: usize = 3;

/// Outcome of one notification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The transport confirmed delivery; the throttle clock advanced.
    Sent,
    /// The gate was disabled or inside the throttle window; nothing was sent.
    Skipped,
    /// The transport failed; the throttle clock did NOT advance, so the
    /// next match may retry immediately.
    Failed,
}

/// Transport that delivers a formatted notification to an external endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a plain text message.
    async fn send_text(&self, message: &str) -> Result<()>;

    /// Sends a text message with an inline image.
    ///
    /// Implementations fall back to text-only delivery when the image
    /// cannot be sent; only a failure of the fallback is an error.
    async fn send_text_with_image(&self, message: &str, image_path: &Path) -> Result<()>;
}

/// Throttled, per-worker notification dispatcher.
///
/// `last_sent_at` is the single mutable cell; it is updated only after a
/// confirmed-successful send, so a failed send does not consume the
/// throttle window.
pub struct NotificationGate<T> {
    transport: Option<T>,
    throttle: Duration,
    last_sent_at: Option<Instant>,
}

impl<T> std::fmt::Debug for NotificationGate<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationGate")
            .field("enabled", &self.transport.is_some())
            .field("throttle", &self.throttle)
            .field("last_sent_at", &self.last_sent_at)
            .finish()
    }
}

impl<T: Transport> NotificationGate<T> {
    /// Creates an enabled gate around a transport.
    #[must_use]
    pub fn new(transport: T, throttle: Duration) -> Self {
        Self {
            transport: Some(transport),
            throttle,
            last_sent_at: None,
        }
    }

    /// Creates a disabled gate: every [`notify`](Self::notify) is skipped.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            transport: None,
            throttle: Duration::ZERO,
            last_sent_at: None,
        }
    }

    /// Returns `true` if a notification may be sent at `now`.
    #[must_use]
    pub fn should_send(&self, now: Instant) -> bool {
        if self.transport.is_none() {
            return false;
        }
        match self.last_sent_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.throttle,
        }
    }

    /// Formats and dispatches a summary of a matched message.
    ///
    /// Throttled sends return [`NotifyOutcome::Skipped`] without side
    /// effects. Transport errors are caught, logged, and reported as
    /// [`NotifyOutcome::Failed`]; they never propagate to the poll loop.
    pub async fn notify(
        &mut self,
        envelope: &MessageEnvelope,
        source: &str,
        attachment_paths: &[PathBuf],
    ) -> NotifyOutcome {
        let now = Instant::now();
        if !self.should_send(now) {
            debug!(source, "Notification skipped (disabled or throttled)");
            return NotifyOutcome::Skipped;
        }
        let Some(transport) = &self.transport else {
            return NotifyOutcome::Skipped;
        };

        let message = format_summary(envelope, source);
        let image = pick_image(attachment_paths);

        let result = match image {
            Some(path) => transport.send_text_with_image(&message, path).await,
            None => transport.send_text(&message).await,
        };

        match result {
            Ok(()) => {
                self.last_sent_at = Some(now);
                info!(source, uid = envelope.uid, "Notification sent");
                NotifyOutcome::Sent
            }
            Err(error) => {
                warn!(
                    source,
                    uid = envelope.uid,
                    category = %error.category(),
                    error = %error,
                    "Notification failed; throttle clock not advanced"
                );
                NotifyOutcome::Failed
            }
        }
    }
}

/// Builds the bounded, human-readable summary of a matched message.
fn format_summary(envelope: &MessageEnvelope, source: &str) -> String {
    let subject = clip_chars(&envelope.subject, SUMMARY_FIELD_CHARS);
    let from = clip_chars(&envelope.sender_display, SUMMARY_FIELD_CHARS);
    let preview = clip_chars(&envelope.body_text, SUMMARY_FIELD_CHARS);

    let mut message = format!(
        "New mail matched\n\n\
         Source: {source}\n\
         From: {from}\n\
         Subject: {subject}\n\
         Date: {}\n\n\
         Preview:\n{preview}...",
        envelope.date
    );

    if !envelope.attachments.is_empty() {
        let names: Vec<&str> = envelope
            .attachments
            .iter()
            .map(|a| a.filename.as_str())
            .collect();
        let listed = names
            .iter()
            .take(SUMMARY_ATTACHMENT_NAMES)
            .copied()
            .collect::<Vec<_>>()
            .join(", ");
        message.push_str(&format!("\n\nAttachments: {listed}"));
        if names.len() > SUMMARY_ATTACHMENT_NAMES {
            message.push_str(&format!(" (+{} more)", names.len() - SUMMARY_ATTACHMENT_NAMES));
        }
    }

    message
}

/// Picks the first attachment path with an image extension, if any.
fn pick_image(paths: &[PathBuf]) -> Option<&PathBuf> {
    paths.iter().find(|path| {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    })
}

/// Keeps at most `max` characters, cutting on a char boundary.
fn clip_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Telegram transport
// ─────────────────────────────────────────────────────────────────────────────

/// [`Transport`] implementation over the Telegram Bot API.
///
/// Text goes through `sendMessage`; an inline image goes through
/// `sendPhoto` with the summary as caption, falling back to `sendMessage`
/// if the photo upload fails.
pub struct TelegramTransport {
    client: reqwest::Client,
    token: String,
    chat_id: String,
}

impl std::fmt::Debug for TelegramTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramTransport")
            .field("token", &"[REDACTED]")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl TelegramTransport {
    /// Creates a transport for the given bot token and chat.
    #[must_use]
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            token: token.into(),
            chat_id: chat_id.into(),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.token)
    }

    async fn send_photo(&self, caption: &str, image_path: &Path) -> Result<()> {
        let bytes = std::fs::read(image_path).map_err(|source| Error::Notify {
            message: format!("cannot read image {}: {source}", image_path.display()),
        })?;
        let filename = image_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .part(
                "photo",
                reqwest::multipart::Part::bytes(bytes).file_name(filename),
            );

        let response = self
            .client
            .post(self.endpoint("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(|source| Error::NotifyHttp { source })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Notify {
                message: format!("sendPhoto returned HTTP {}", response.status()),
            })
        }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(&self, message: &str) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": message,
            }))
            .send()
            .await
            .map_err(|source| Error::NotifyHttp { source })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Notify {
                message: format!("sendMessage returned HTTP {}", response.status()),
            })
        }
    }

    async fn send_text_with_image(&self, message: &str, image_path: &Path) -> Result<()> {
        match self.send_photo(message, image_path).await {
            Ok(()) => Ok(()),
            Err(error) => {
                warn!(
                    image = %image_path.display(),
                    error = %error,
                    "Image send failed, falling back to text-only"
                );
                self.send_text(message).await
            }
        }
    }
}
