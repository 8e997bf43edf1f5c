//! Normalized view of one fetched mail message.
//!
//! A [`MessageEnvelope`] is decoded fresh from the raw RFC822 bytes of each
//! fetched message and discarded after processing. Missing or undecodable
//! header fields become empty strings so matching never has to deal with
//! absent data.

use crate::error::{Error, Result};
use mailparse::{parse_mail, DispositionType, MailHeaderMap, ParsedMail};
use tracing::debug;

/// One attachment carried by a message.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Attachment file name as announced by the sender.
    pub filename: String,
    /// Decoded attachment payload.
    pub payload: Vec<u8>,
}

/// Reply-correlation headers of a message.
///
/// Both fields default to empty strings when the headers are absent.
#[derive(Debug, Clone, Default)]
pub struct ReplyHeaders {
    /// Raw `In-Reply-To` header value.
    pub in_reply_to: String,
    /// Raw `References` header value.
    pub references: String,
}

/// Normalized, decoded view of one mail message.
///
/// Constructed per fetch via [`decode_envelope`]; never mutated. Only the
/// `uid` (and, for sender tracking, the extracted address) outlive the
/// processing of a single message.
#[derive(Debug, Clone)]
pub struct MessageEnvelope {
    /// Server-assigned UID, stable within one session. Used as the dedupe key.
    pub uid: u32,
    /// Decoded subject line.
    pub subject: String,
    /// Raw `From` header as displayed (may include a display name).
    pub sender_display: String,
    /// Address extracted from the `From` header, lowercased.
    pub sender_address: String,
    /// Raw `Date` header value.
    pub date: String,
    /// Decoded plain-text body.
    pub body_text: String,
    /// Reply-correlation headers.
    pub reply: ReplyHeaders,
    /// Attachments in message order.
    pub attachments: Vec<Attachment>,
}

/// Decodes a fetched message into a [`MessageEnvelope`].
///
/// Header decoding is forgiving: anything missing becomes an empty string.
/// A message whose MIME structure cannot be parsed at all is an error; the
/// poll loop logs it and skips the message rather than aborting the tick.
///
/// # Errors
///
/// Returns [`Error::ParseMessage`] if the raw bytes are not parseable mail.
pub fn decode_envelope(uid: u32, raw: &[u8]) -> Result<MessageEnvelope> {
    let parsed = parse_mail(raw).map_err(|source| Error::ParseMessage { uid, source })?;

    let header = |name: &str| parsed.headers.get_first_value(name).unwrap_or_default();

    let sender_display = header("From");
    let sender_address = extract_address(&sender_display);

    let envelope = MessageEnvelope {
        uid,
        subject: header("Subject"),
        sender_address,
        sender_display,
        date: header("Date"),
        body_text: extract_body_text(&parsed),
        reply: ReplyHeaders {
            in_reply_to: header("In-Reply-To"),
            references: header("References"),
        },
        attachments: collect_attachments(&parsed),
    };

    debug!(
        uid,
        subject_len = envelope.subject.len(),
        attachment_count = envelope.attachments.len(),
        "Decoded message"
    );

    Ok(envelope)
}

/// Extracts the bare address from a raw `From` field, lowercased.
///
/// `"Ali Veli <ali@example.com>"` becomes `"ali@example.com"`; a field
/// without angle brackets is used as-is after trimming. Unbalanced brackets
/// fall back to the raw trimmed field so a malformed header fails toward
/// "no match" instead of panicking.
#[must_use]
pub fn extract_address(from_field: &str) -> String {
    if let Some(start) = from_field.find('<') {
        let rest = &from_field[start + 1..];
        if let Some(end) = rest.find('>') {
            return rest[..end].trim().to_lowercase();
        }
    }
    from_field.trim().to_lowercase()
}

/// Extracts plain-text content, preferring non-attachment text/plain parts.
fn extract_body_text(parsed: &ParsedMail<'_>) -> String {
    if parsed.subparts.is_empty() {
        return parsed.get_body().unwrap_or_default();
    }

    // Prefer a text/plain part that is not an attachment
    for part in &parsed.subparts {
        let is_attachment =
            part.get_content_disposition().disposition == DispositionType::Attachment;
        if part.ctype.mimetype.eq_ignore_ascii_case("text/plain") && !is_attachment {
            if let Ok(body) = part.get_body() {
                return body;
            }
        }
    }

    // Fall back to text/html, then recurse into the first subpart
    for part in &parsed.subparts {
        if part.ctype.mimetype.eq_ignore_ascii_case("text/html") {
            if let Ok(body) = part.get_body() {
                return body;
            }
        }
    }

    parsed
        .subparts
        .first()
        .map(extract_body_text)
        .unwrap_or_default()
}

/// Collects attachment parts (recursively) with their decoded payloads.
fn collect_attachments(parsed: &ParsedMail<'_>) -> Vec<Attachment> {
    let mut out = Vec::new();
    collect_attachments_into(parsed, &mut out);
    out
}

fn collect_attachments_into(parsed: &ParsedMail<'_>, out: &mut Vec<Attachment>) {
    for part in &parsed.subparts {
        let disposition = part.get_content_disposition();
        if disposition.disposition == DispositionType::Attachment {
            let filename = disposition
                .params
                .get("filename")
                .cloned()
                .unwrap_or_default();
            if !filename.is_empty() {
                if let Ok(payload) = part.get_body_raw() {
                    out.push(Attachment { filename, payload });
                }
            }
        }
        collect_attachments_into(part, out);
    }
}
