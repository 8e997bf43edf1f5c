//! The persisted, human-editable tracking document.
//!
//! One JSON file holds the connection settings, the notification settings,
//! and the three tracking lists. Every section and field has a structural
//! default, so a partially edited document still loads; a missing or
//! malformed file falls back to full defaults instead of failing startup.

use crate::error::{Error, Result};
use crate::matcher::{TrackedMessage, TrackedSender};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Default file name of the tracking document.
pub const DEFAULT_SETTINGS_FILE: &str = "mail_tracking_config.json";

/// Mail server connection settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    /// IMAP server hostname. Empty means: discover from the email domain.
    pub imap_server: String,
    /// Account email address.
    pub email_address: String,
    /// Account password or app-specific password.
    pub password: String,
    /// Seconds between poll ticks.
    pub check_interval: u64,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            imap_server: String::new(),
            email_address: String::new(),
            password: String::new(),
            check_interval: 30,
        }
    }
}

impl std::fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSettings")
            .field("imap_server", &self.imap_server)
            .field("email_address", &self.email_address)
            .field("password", &"[REDACTED]")
            .field("check_interval", &self.check_interval)
            .finish()
    }
}

/// Telegram bot credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    /// Bot API token.
    pub bot_token: String,
    /// Destination chat ID.
    pub chat_id: String,
    /// Whether Telegram delivery is enabled.
    pub enabled: bool,
}

/// WhatsApp settings, parsed for document compatibility.
///
/// Delivery over WhatsApp is not implemented: the original tooling drives a
/// desktop WhatsApp Web session, which has no headless equivalent here.
/// Selecting this platform disables notifications with a warning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsappSettings {
    /// Destination phone number.
    pub phone_number: String,
    /// Whether WhatsApp delivery is enabled.
    pub enabled: bool,
}

/// Notification platform selection and throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Selected platform: `"telegram"` or `"whatsapp"`.
    pub platform: String,
    /// Minimum seconds between two successful sends per tracking mode.
    pub throttle_seconds: u64,
    /// Telegram credentials.
    pub telegram: TelegramSettings,
    /// WhatsApp settings.
    pub whatsapp: WhatsappSettings,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            platform: "telegram".to_string(),
            throttle_seconds: 300,
            telegram: TelegramSettings::default(),
            whatsapp: WhatsappSettings::default(),
        }
    }
}

/// Keyword tracking section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordTracking {
    /// Whether this mode runs.
    pub enabled: bool,
    /// Keywords matched by substring containment.
    pub keywords: Vec<String>,
    /// Folder that matched messages are saved into.
    pub save_folder: String,
}

impl Default for KeywordTracking {
    fn default() -> Self {
        Self {
            enabled: false,
            keywords: Vec::new(),
            save_folder: "tracked_keyword_mails".to_string(),
        }
    }
}

/// Sender tracking section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderTracking {
    /// Whether this mode runs.
    pub enabled: bool,
    /// Tracked senders keyed by lowercased address.
    pub tracked_senders: HashMap<String, TrackedSender>,
    /// Folder that matched messages are saved into.
    pub save_folder: String,
}

impl Default for SenderTracking {
    fn default() -> Self {
        Self {
            enabled: false,
            tracked_senders: HashMap::new(),
            save_folder: "tracked_sender_mails".to_string(),
        }
    }
}

/// Reply tracking section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyTracking {
    /// Whether this mode runs.
    pub enabled: bool,
    /// Tracked sent messages keyed by Message-ID.
    pub tracked_message_ids: HashMap<String, TrackedMessage>,
    /// Folder that reply messages are saved into.
    pub save_folder: String,
}

impl Default for ReplyTracking {
    fn default() -> Self {
        Self {
            enabled: false,
            tracked_message_ids: HashMap::new(),
            save_folder: "tracked_replies".to_string(),
        }
    }
}

/// The whole tracking document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Mail server connection settings.
    pub email_settings: EmailSettings,
    /// Notification platform and throttling.
    pub notification_settings: NotificationSettings,
    /// Keyword tracking list.
    pub keyword_tracking: KeywordTracking,
    /// Sender tracking list.
    pub sender_tracking: SenderTracking,
    /// Reply tracking list.
    pub reply_tracking: ReplyTracking,
}

impl Settings {
    /// Loads the document from `path`.
    ///
    /// A missing file or malformed JSON falls back to full defaults with a
    /// warning; startup never fails on a broken settings file.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(source) => {
                warn!(
                    path = %path.display(),
                    error = %source,
                    "Settings file not readable, using defaults"
                );
                return Self::default();
            }
        };

        match serde_json::from_str(&text) {
            Ok(settings) => {
                info!(path = %path.display(), "Settings loaded");
                settings
            }
            Err(source) => {
                warn!(
                    path = %path.display(),
                    error = %source,
                    "Settings file malformed, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Writes the document to `path` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(|source| Error::SettingsIo {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, source),
        })?;
        std::fs::write(path, text).map_err(|source| Error::SettingsIo {
            path: path.display().to_string(),
            source,
        })
    }

    /// Adds (or overwrites) a tracked sender and enables sender tracking.
    pub fn add_sender(
        &mut self,
        address: impl Into<String>,
        display_name: impl Into<String>,
        sample_subject: impl Into<String>,
    ) {
        let address = address.into().trim().to_lowercase();
        self.sender_tracking.tracked_senders.insert(
            address,
            TrackedSender {
                display_name: display_name.into(),
                added_at: Local::now().to_rfc3339(),
                sample_subject: sample_subject.into(),
            },
        );
        self.sender_tracking.enabled = true;
    }

    /// Adds (or overwrites) a tracked sent message and enables reply tracking.
    pub fn add_reply_tracking(
        &mut self,
        message_id: impl Into<String>,
        subject: impl Into<String>,
        recipient: impl Into<String>,
        sent_date: impl Into<String>,
    ) {
        self.reply_tracking.tracked_message_ids.insert(
            message_id.into(),
            TrackedMessage {
                subject: subject.into(),
                recipient: recipient.into(),
                sent_date: sent_date.into(),
                added_at: Local::now().to_rfc3339(),
            },
        );
        self.reply_tracking.enabled = true;
    }

    /// Returns the IMAP host: explicit when set, otherwise discovered from
    /// the email domain.
    #[must_use]
    pub fn effective_imap_server(&self) -> String {
        if self.email_settings.imap_server.is_empty() {
            crate::known_servers::discover_imap_host(&self.email_settings.email_address)
        } else {
            self.email_settings.imap_server.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let settings = Settings::load(Path::new("/nonexistent/config.json"));
        assert_eq!(settings.email_settings.check_interval, 30);
        assert_eq!(settings.notification_settings.throttle_seconds, 300);
        assert!(!settings.keyword_tracking.enabled);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ this is not json").unwrap();

        let settings = Settings::load(&path);
        assert_eq!(settings.notification_settings.platform, "telegram");
        assert_eq!(settings.sender_tracking.save_folder, "tracked_sender_mails");
    }

    #[test]
    fn test_partial_document_gets_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "email_settings": { "email_address": "user@gmail.com" },
                "keyword_tracking": { "enabled": true, "keywords": ["banka"] }
            }"#,
        )
        .unwrap();

        let settings = Settings::load(&path);
        assert_eq!(settings.email_settings.email_address, "user@gmail.com");
        assert_eq!(settings.email_settings.check_interval, 30);
        assert!(settings.keyword_tracking.enabled);
        assert_eq!(settings.keyword_tracking.keywords, vec!["banka"]);
        assert_eq!(
            settings.keyword_tracking.save_folder,
            "tracked_keyword_mails"
        );
        assert!(!settings.reply_tracking.enabled);
    }

    #[test]
    fn test_roundtrip_preserves_tracking_lists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut settings = Settings::default();
        settings.add_sender("Boss@Co.Com", "The Boss", "Quarterly numbers");
        settings.add_reply_tracking(
            "<abc123@mail.gmail.com>",
            "Contract draft",
            "partner@example.com",
            "2026-07-01",
        );
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path);
        assert!(loaded.sender_tracking.enabled);
        let sender = &loaded.sender_tracking.tracked_senders["boss@co.com"];
        assert_eq!(sender.display_name, "The Boss");
        assert!(!sender.added_at.is_empty());

        assert!(loaded.reply_tracking.enabled);
        let tracked = &loaded.reply_tracking.tracked_message_ids["<abc123@mail.gmail.com>"];
        assert_eq!(tracked.subject, "Contract draft");
        assert_eq!(tracked.recipient, "partner@example.com");
    }

    #[test]
    fn test_tracked_entry_json_field_names() {
        // The on-disk spelling is the original document layout
        let mut settings = Settings::default();
        settings.add_sender("a@b.c", "A", "s");
        let text = serde_json::to_string(&settings).unwrap();
        assert!(text.contains("\"name\":\"A\""));
        assert!(text.contains("\"sample_subject\":\"s\""));
    }

    #[test]
    fn test_add_sender_overwrites_existing_key() {
        let mut settings = Settings::default();
        settings.add_sender("boss@co.com", "Old Name", "");
        settings.add_sender("BOSS@CO.COM", "New Name", "");
        assert_eq!(settings.sender_tracking.tracked_senders.len(), 1);
        assert_eq!(
            settings.sender_tracking.tracked_senders["boss@co.com"].display_name,
            "New Name"
        );
    }

    #[test]
    fn test_effective_imap_server() {
        let mut settings = Settings::default();
        settings.email_settings.email_address = "user@gmail.com".into();
        assert_eq!(settings.effective_imap_server(), "imap.gmail.com");

        settings.email_settings.imap_server = "mail.corp.internal".into();
        assert_eq!(settings.effective_imap_server(), "mail.corp.internal");
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut settings = Settings::default();
        settings.email_settings.password = "super-secret".into();
        let debug = format!("{:?}", settings.email_settings);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
