//! Durable storage for matched messages.
//!
//! Each match produces a normalized JSON record, the raw `.eml` bytes, and
//! the decoded attachment payloads, all under the tracking mode's save
//! folder. Persistence is best-effort: the poll loop logs a failure and
//! still attempts the notification.

use crate::envelope::MessageEnvelope;
use crate::error::{Error, Result};
use crate::matcher::{MatchDetails, MatchInfo};
use chrono::Local;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Paths produced by persisting one matched message.
#[derive(Debug, Clone)]
pub struct SavedMail {
    /// Path of the normalized JSON record.
    pub record_path: PathBuf,
    /// Path of the raw message bytes.
    pub raw_path: PathBuf,
    /// Paths of the saved attachment payloads, in message order.
    pub attachment_paths: Vec<PathBuf>,
}

/// Sink that durably stores matched messages.
pub trait MailStore: Send + Sync {
    /// Stores the normalized record, raw bytes, and attachments of a match.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be written; partial output may
    /// remain on disk.
    fn save(&self, envelope: &MessageEnvelope, raw: &[u8], info: &MatchInfo) -> Result<SavedMail>;
}

/// Filesystem-backed [`MailStore`] writing into one folder per mode.
#[derive(Debug, Clone)]
pub struct FsMailStore {
    root: PathBuf,
}

impl FsMailStore {
    /// Creates a store rooted at `root`. The folder is created on first save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the folder this store writes into.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        std::fs::write(path, bytes).map_err(|source| Error::SaveMail {
            path: path.display().to_string(),
            source,
        })
    }
}

impl MailStore for FsMailStore {
    fn save(&self, envelope: &MessageEnvelope, raw: &[u8], info: &MatchInfo) -> Result<SavedMail> {
        std::fs::create_dir_all(&self.root).map_err(|source| Error::SaveMail {
            path: self.root.display().to_string(),
            source,
        })?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let uid = envelope.uid;

        // Attachments first, so the record can reference their paths
        let mut attachment_paths = Vec::with_capacity(envelope.attachments.len());
        let mut attachment_manifest = Vec::with_capacity(envelope.attachments.len());
        for attachment in &envelope.attachments {
            let filename = sanitize_filename(&attachment.filename);
            let path = self.root.join(format!("{stamp}_{filename}"));
            self.write(&path, &attachment.payload)?;
            attachment_manifest.push(json!({
                "filename": attachment.filename,
                "saved_as": path.display().to_string(),
            }));
            attachment_paths.push(path);
        }

        let mut record = json!({
            "id": uid,
            "subject": envelope.subject,
            "from": envelope.sender_display,
            "sender_address": envelope.sender_address,
            "date": envelope.date,
            "body": envelope.body_text,
            "in_reply_to": envelope.reply.in_reply_to,
            "references": envelope.reply.references,
            "source": info.source,
            "attachments": attachment_manifest,
            "saved_at": Local::now().to_rfc3339(),
        });

        // Strategy-specific record fields
        let extra = match &info.details {
            MatchDetails::Keyword { hits } => json!({ "matched_keywords": hits }),
            MatchDetails::Sender {
                address,
                display_name,
            } => json!({ "sender_email": address, "sender_name": display_name }),
            MatchDetails::Reply {
                tracked_id,
                original_subject,
            } => json!({
                "replied_to_message_id": tracked_id,
                "replied_to_subject": original_subject,
            }),
        };
        if let (Some(record_map), Some(extra_map)) = (record.as_object_mut(), extra.as_object()) {
            for (key, value) in extra_map {
                record_map.insert(key.clone(), value.clone());
            }
        }

        let record_path = self.root.join(format!("{stamp}_mail_{uid}.json"));
        let record_text =
            serde_json::to_string_pretty(&record).map_err(|source| Error::EncodeRecord { source })?;
        self.write(&record_path, record_text.as_bytes())?;

        let raw_path = self.root.join(format!("{stamp}_mail_{uid}.eml"));
        self.write(&raw_path, raw)?;

        Ok(SavedMail {
            record_path,
            raw_path,
            attachment_paths,
        })
    }
}

/// Reduces an attachment filename to a safe final path component.
fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("attachment");
    let cleaned: String = base
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Attachment, ReplyHeaders};

    fn sample_envelope() -> MessageEnvelope {
        MessageEnvelope {
            uid: 42,
            subject: "Quarterly numbers".into(),
            sender_display: "Boss <boss@co.com>".into(),
            sender_address: "boss@co.com".into(),
            date: "Tue, 14 Jul 2026 09:00:00 +0300".into(),
            body_text: "Numbers attached.".into(),
            reply: ReplyHeaders::default(),
            attachments: vec![Attachment {
                filename: "q2.xlsx".into(),
                payload: b"SPREADSHEET".to_vec(),
            }],
        }
    }

    fn sender_match() -> MatchInfo {
        MatchInfo {
            source: "Sender watch - Boss".into(),
            details: MatchDetails::Sender {
                address: "boss@co.com".into(),
                display_name: "Boss".into(),
            },
        }
    }

    #[test]
    fn test_save_writes_record_raw_and_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMailStore::new(dir.path().join("tracked_sender_mails"));
        let envelope = sample_envelope();

        let saved = store
            .save(&envelope, b"raw bytes", &sender_match())
            .unwrap();

        assert!(saved.record_path.exists());
        assert!(saved.raw_path.exists());
        assert_eq!(saved.attachment_paths.len(), 1);
        assert!(saved.attachment_paths[0].exists());

        let record: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&saved.record_path).unwrap()).unwrap();
        assert_eq!(record["id"], 42);
        assert_eq!(record["sender_email"], "boss@co.com");
        assert_eq!(record["sender_name"], "Boss");
        assert_eq!(record["attachments"][0]["filename"], "q2.xlsx");
        assert!(record["saved_at"].as_str().is_some());

        assert_eq!(std::fs::read(&saved.raw_path).unwrap(), b"raw bytes");
        assert_eq!(
            std::fs::read(&saved.attachment_paths[0]).unwrap(),
            b"SPREADSHEET"
        );
    }

    #[test]
    fn test_save_reply_match_records_correlation() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMailStore::new(dir.path());
        let mut envelope = sample_envelope();
        envelope.attachments.clear();

        let info = MatchInfo {
            source: "Reply watch - Quarterly numbers...".into(),
            details: MatchDetails::Reply {
                tracked_id: "<abc@mail.gmail.com>".into(),
                original_subject: "Quarterly numbers".into(),
            },
        };
        let saved = store.save(&envelope, b"raw", &info).unwrap();

        let record: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&saved.record_path).unwrap()).unwrap();
        assert_eq!(record["replied_to_message_id"], "<abc@mail.gmail.com>");
        assert_eq!(record["replied_to_subject"], "Quarterly numbers");
    }

    #[test]
    fn test_sanitize_filename_strips_path_components() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename(""), "attachment");
    }
}
