//! Message classification for the three tracking modes.
//!
//! This module provides the [`Matcher`] trait and its three implementations:
//! keyword containment, tracked-sender identity, and reply correlation over
//! the `In-Reply-To`/`References` chain.
//!
//! # Example
//!
//! ```
//! use mail_watch::matcher::{KeywordMatcher, Matcher};
//! use mail_watch::envelope::{MessageEnvelope, ReplyHeaders};
//!
//! let matcher = KeywordMatcher::new(["invoice"]);
//! let envelope = MessageEnvelope {
//!     uid: 1,
//!     subject: "Your INVOICE is ready".into(),
//!     sender_display: "billing <billing@shop.example>".into(),
//!     sender_address: "billing@shop.example".into(),
//!     date: String::new(),
//!     body_text: String::new(),
//!     reply: ReplyHeaders::default(),
//!     attachments: Vec::new(),
//! };
//! assert!(matcher.classify(&envelope).is_some());
//! ```

use crate::envelope::MessageEnvelope;
use crate::mailbox::SearchFilter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A sender on the tracking list, keyed externally by lowercased address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackedSender {
    /// Display name as it appeared when the sender was added.
    #[serde(rename = "name", default)]
    pub display_name: String,
    /// When the sender was added to the list (ISO 8601 text).
    #[serde(default)]
    pub added_at: String,
    /// Subject of the message that prompted tracking this sender.
    #[serde(default)]
    pub sample_subject: String,
}

/// A sent message being watched for replies, keyed externally by Message-ID.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackedMessage {
    /// Subject of the tracked sent message.
    #[serde(default)]
    pub subject: String,
    /// Recipient of the tracked sent message.
    #[serde(rename = "to", default)]
    pub recipient: String,
    /// Date the tracked message was sent.
    #[serde(rename = "date", default)]
    pub sent_date: String,
    /// When tracking was added (ISO 8601 text).
    #[serde(default)]
    pub added_at: String,
}

/// Why a message matched, strategy-specific.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchDetails {
    /// Keywords found in the message text.
    Keyword {
        /// Every keyword that hit, in configuration order.
        hits: Vec<String>,
    },
    /// Message came from a tracked sender.
    Sender {
        /// Lowercased tracked address.
        address: String,
        /// Display name from the tracking list.
        display_name: String,
    },
    /// Message is a reply to a tracked sent message.
    Reply {
        /// Message-ID of the tracked original.
        tracked_id: String,
        /// Subject of the tracked original.
        original_subject: String,
    },
}

/// A positive classification result.
#[derive(Debug, Clone)]
pub struct MatchInfo {
    /// Human-readable source label for the notification summary.
    pub source: String,
    /// Strategy-specific match metadata for the saved record.
    pub details: MatchDetails,
}

/// Trait for classifying a message envelope against a tracking mode.
///
/// Implementations also declare the fetch policy of their mode: which
/// server-side search filter the poll loop should use, and whether the
/// mode marks the pre-existing backlog as seen before reporting anything.
pub trait Matcher: Send + Sync {
    /// Classifies an envelope, returning match metadata on a hit.
    ///
    /// Never fails: missing fields in the envelope are empty strings and
    /// simply produce no match.
    fn classify(&self, envelope: &MessageEnvelope) -> Option<MatchInfo>;

    /// Returns a human-readable description of what this matcher looks for.
    ///
    /// Used in logging.
    fn description(&self) -> &str;

    /// Server-side search filter for this mode's fetches.
    fn search_filter(&self) -> SearchFilter {
        SearchFilter::All
    }

    /// Whether the first poll marks the existing backlog as seen without
    /// reporting it.
    fn skips_backlog(&self) -> bool {
        true
    }
}

/// Keeps at most `max` characters of `s`.
fn clip(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyword matching
// ─────────────────────────────────────────────────────────────────────────────

/// Matches messages whose text contains any configured keyword.
///
/// The haystack is the subject, body, and sender address concatenated and
/// case-folded. Matching is pure substring containment with no word-boundary
/// logic: the keyword `"yapı kredi"` hits `"...İşte yapı kredi ödemeniz..."`
/// but not a message that only contains the single token `"yapıkredi"`.
/// This is intentional - keywords are user-chosen phrases, not tokens.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
    description: String,
}

impl KeywordMatcher {
    /// Creates a matcher from a keyword list.
    ///
    /// Keywords are case-folded on construction; empty keywords are dropped.
    #[must_use]
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.into().to_lowercase())
            .filter(|k| !k.trim().is_empty())
            .collect();
        Self {
            description: format!("keyword containment ({} keywords)", keywords.len()),
            keywords,
        }
    }

    /// Returns the configured (case-folded) keywords.
    #[must_use]
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl Matcher for KeywordMatcher {
    fn classify(&self, envelope: &MessageEnvelope) -> Option<MatchInfo> {
        if self.keywords.is_empty() {
            return None;
        }

        let haystack = format!(
            "{} {} {}",
            envelope.subject, envelope.body_text, envelope.sender_address
        )
        .to_lowercase();

        let hits: Vec<String> = self
            .keywords
            .iter()
            .filter(|kw| haystack.contains(kw.as_str()))
            .cloned()
            .collect();

        if hits.is_empty() {
            return None;
        }

        // Only the first two hits go into the source label
        let label_hits = hits
            .iter()
            .take(2)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        Some(MatchInfo {
            source: format!("Keyword watch ({label_hits})"),
            details: MatchDetails::Keyword { hits },
        })
    }

    fn description(&self) -> &str {
        &self.description
    }

    // Unseen-only keeps server load down; keyword matching needs no
    // sender identity or header correlation, so the server can pre-filter.
    fn search_filter(&self) -> SearchFilter {
        SearchFilter::Unseen
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sender matching
// ─────────────────────────────────────────────────────────────────────────────

/// Matches messages whose sender address is on the tracking list.
///
/// The address is extracted from the `From` field by
/// [`crate::envelope::extract_address`] during envelope decoding:
/// `"Ali Veli <ali@example.com>"` yields `"ali@example.com"`, a bare
/// address is used unchanged.
#[derive(Debug, Clone)]
pub struct SenderMatcher {
    tracked: HashMap<String, TrackedSender>,
    description: String,
}

impl SenderMatcher {
    /// Creates a matcher from a tracking map keyed by address.
    ///
    /// Keys are lowercased on construction; re-adding an address overwrites
    /// the previous entry.
    #[must_use]
    pub fn new(tracked: HashMap<String, TrackedSender>) -> Self {
        let tracked: HashMap<String, TrackedSender> = tracked
            .into_iter()
            .map(|(address, entry)| (address.trim().to_lowercase(), entry))
            .collect();
        Self {
            description: format!("tracked senders ({} addresses)", tracked.len()),
            tracked,
        }
    }

    /// Returns `true` if the given (lowercased) address is tracked.
    #[must_use]
    pub fn is_tracked(&self, address: &str) -> bool {
        self.tracked.contains_key(address)
    }
}

impl Matcher for SenderMatcher {
    fn classify(&self, envelope: &MessageEnvelope) -> Option<MatchInfo> {
        let entry = self.tracked.get(&envelope.sender_address)?;

        let name = if entry.display_name.is_empty() {
            envelope.sender_address.clone()
        } else {
            entry.display_name.clone()
        };

        Some(MatchInfo {
            source: format!("Sender watch - {}", clip(&name, 40)),
            details: MatchDetails::Sender {
                address: envelope.sender_address.clone(),
                display_name: name,
            },
        })
    }

    fn description(&self) -> &str {
        &self.description
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reply correlation
// ─────────────────────────────────────────────────────────────────────────────

/// Matches messages that are replies to tracked sent messages.
///
/// A message matches when any tracked Message-ID appears as a substring of
/// its `In-Reply-To` or `References` header. Containment rather than exact
/// token equality is used because mail clients carry angle brackets and
/// whitespace inconsistently in these headers; Message-ID entropy makes
/// accidental containment hits vanishingly unlikely.
#[derive(Debug, Clone)]
pub struct ReplyMatcher {
    tracked: HashMap<String, TrackedMessage>,
    description: String,
}

impl ReplyMatcher {
    /// Creates a matcher from a tracking map keyed by Message-ID.
    ///
    /// Empty Message-IDs are dropped - an empty key would be contained in
    /// every header and match everything.
    #[must_use]
    pub fn new(tracked: HashMap<String, TrackedMessage>) -> Self {
        let tracked: HashMap<String, TrackedMessage> = tracked
            .into_iter()
            .filter(|(id, _)| !id.trim().is_empty())
            .collect();
        Self {
            description: format!("reply correlation ({} tracked messages)", tracked.len()),
            tracked,
        }
    }
}

impl Matcher for ReplyMatcher {
    fn classify(&self, envelope: &MessageEnvelope) -> Option<MatchInfo> {
        let in_reply_to = &envelope.reply.in_reply_to;
        let references = &envelope.reply.references;

        if in_reply_to.is_empty() && references.is_empty() {
            return None;
        }

        for (tracked_id, entry) in &self.tracked {
            if in_reply_to.contains(tracked_id.as_str())
                || references.contains(tracked_id.as_str())
            {
                return Some(MatchInfo {
                    source: format!("Reply watch - {}...", clip(&entry.subject, 30)),
                    details: MatchDetails::Reply {
                        tracked_id: tracked_id.clone(),
                        original_subject: entry.subject.clone(),
                    },
                });
            }
        }

        None
    }

    fn description(&self) -> &str {
        &self.description
    }

    // The tracking list is user-curated; there is no backlog to skip, and
    // replies that arrived before startup should still be reported.
    fn skips_backlog(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ReplyHeaders;

    fn envelope(subject: &str, from: &str, body: &str) -> MessageEnvelope {
        MessageEnvelope {
            uid: 1,
            subject: subject.into(),
            sender_display: from.into(),
            sender_address: crate::envelope::extract_address(from),
            date: String::new(),
            body_text: body.into(),
            reply: ReplyHeaders::default(),
            attachments: Vec::new(),
        }
    }

    fn reply_envelope(in_reply_to: &str, references: &str) -> MessageEnvelope {
        MessageEnvelope {
            reply: ReplyHeaders {
                in_reply_to: in_reply_to.into(),
                references: references.into(),
            },
            ..envelope("Re: ping", "b@example.com", "pong")
        }
    }

    #[test]
    fn test_keyword_case_insensitive_substring() {
        let matcher = KeywordMatcher::new(["yapı kredi"]);
        let hit = envelope(
            "Bilgilendirme",
            "noreply@bank.example",
            "...İşte yapı kredi ödemeniz hakkında detaylar...",
        );
        let info = matcher.classify(&hit).expect("should match");
        assert_eq!(
            info.details,
            MatchDetails::Keyword {
                hits: vec!["yapı kredi".into()]
            }
        );
    }

    #[test]
    fn test_keyword_requires_exact_containment() {
        // The joined token does not contain the spaced keyword
        let matcher = KeywordMatcher::new(["yapı kredi"]);
        let miss = envelope("Duyuru", "noreply@bank.example", "yapıkredi kampanyası");
        assert!(matcher.classify(&miss).is_none());
    }

    #[test]
    fn test_keyword_matches_uppercase_subject() {
        let matcher = KeywordMatcher::new(["invoice"]);
        let hit = envelope("YOUR INVOICE", "billing@shop.example", "");
        assert!(matcher.classify(&hit).is_some());
    }

    #[test]
    fn test_keyword_matches_sender_address() {
        let matcher = KeywordMatcher::new(["bank.example"]);
        let hit = envelope("hello", "NoReply <noreply@bank.example>", "nothing here");
        assert!(matcher.classify(&hit).is_some());
    }

    #[test]
    fn test_keyword_label_caps_at_two_hits() {
        let matcher = KeywordMatcher::new(["alpha", "beta", "gamma"]);
        let hit = envelope("alpha beta gamma", "x@example.com", "");
        let info = matcher.classify(&hit).unwrap();
        assert_eq!(info.source, "Keyword watch (alpha, beta)");
        match info.details {
            MatchDetails::Keyword { hits } => assert_eq!(hits.len(), 3),
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[test]
    fn test_keyword_empty_list_never_matches() {
        let matcher = KeywordMatcher::new(Vec::<String>::new());
        let msg = envelope("anything", "a@example.com", "anything");
        assert!(matcher.classify(&msg).is_none());
    }

    #[test]
    fn test_sender_match_by_extracted_address() {
        let mut tracked = HashMap::new();
        tracked.insert(
            "boss@co.com".to_string(),
            TrackedSender {
                display_name: "The Boss".into(),
                ..TrackedSender::default()
            },
        );
        let matcher = SenderMatcher::new(tracked);

        let hit = envelope("status?", "The Boss <Boss@Co.Com>", "where are we");
        let info = matcher.classify(&hit).expect("should match");
        assert_eq!(info.source, "Sender watch - The Boss");

        let miss = envelope("spam", "other@co.com", "buy now");
        assert!(matcher.classify(&miss).is_none());
    }

    #[test]
    fn test_sender_keys_lowercased_on_construction() {
        let mut tracked = HashMap::new();
        tracked.insert("Boss@Co.Com".to_string(), TrackedSender::default());
        let matcher = SenderMatcher::new(tracked);
        assert!(matcher.is_tracked("boss@co.com"));
        let hit = envelope("hi", "boss@co.com", "");
        assert!(matcher.classify(&hit).is_some());
    }

    #[test]
    fn test_reply_match_in_references() {
        let mut tracked = HashMap::new();
        tracked.insert(
            "<xyz789@mail.gmail.com>".to_string(),
            TrackedMessage {
                subject: "Quarterly numbers".into(),
                ..TrackedMessage::default()
            },
        );
        let matcher = ReplyMatcher::new(tracked);

        let hit = reply_envelope("", "<abc123@mail.gmail.com> <xyz789@mail.gmail.com>");
        let info = matcher.classify(&hit).expect("should match");
        match info.details {
            MatchDetails::Reply { tracked_id, .. } => {
                assert_eq!(tracked_id, "<xyz789@mail.gmail.com>");
            }
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[test]
    fn test_reply_no_match_for_unknown_id() {
        let mut tracked = HashMap::new();
        tracked.insert(
            "<notfound@mail.gmail.com>".to_string(),
            TrackedMessage::default(),
        );
        let matcher = ReplyMatcher::new(tracked);

        let miss = reply_envelope("", "<abc123@mail.gmail.com> <xyz789@mail.gmail.com>");
        assert!(matcher.classify(&miss).is_none());
    }

    #[test]
    fn test_reply_match_in_in_reply_to() {
        let mut tracked = HashMap::new();
        tracked.insert("<abc123@mail.gmail.com>".to_string(), TrackedMessage::default());
        let matcher = ReplyMatcher::new(tracked);

        let hit = reply_envelope("<abc123@mail.gmail.com>", "");
        assert!(matcher.classify(&hit).is_some());
    }

    #[test]
    fn test_reply_empty_headers_never_match() {
        let mut tracked = HashMap::new();
        tracked.insert("<abc@mail.example>".to_string(), TrackedMessage::default());
        let matcher = ReplyMatcher::new(tracked);
        let plain = envelope("hello", "a@example.com", "no reply headers");
        assert!(matcher.classify(&plain).is_none());
    }

    #[test]
    fn test_reply_empty_tracked_id_dropped() {
        let mut tracked = HashMap::new();
        tracked.insert(String::new(), TrackedMessage::default());
        let matcher = ReplyMatcher::new(tracked);
        // An empty key would be contained in every header; it must not match
        let msg = reply_envelope("<whatever@mail.example>", "");
        assert!(matcher.classify(&msg).is_none());
    }

    #[test]
    fn test_mode_policies() {
        let keyword = KeywordMatcher::new(["x"]);
        assert_eq!(keyword.search_filter(), SearchFilter::Unseen);
        assert!(keyword.skips_backlog());

        let sender = SenderMatcher::new(HashMap::new());
        assert_eq!(sender.search_filter(), SearchFilter::All);
        assert!(sender.skips_backlog());

        let reply = ReplyMatcher::new(HashMap::new());
        assert_eq!(reply.search_filter(), SearchFilter::All);
        assert!(!reply.skips_backlog());
    }
}
