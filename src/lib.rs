//! # mail-watch
//!
//! Async IMAP mailbox watcher: polls a mailbox, detects messages matching
//! user-defined criteria, saves them to disk, and pushes a summary
//! notification to Telegram.
//!
//! Three tracking modes run as independent workers, each with its own IMAP
//! connection, dedupe state, and notification throttle:
//!
//! - **Keyword**: any configured phrase appears in the subject, body, or
//!   sender (case-folded substring containment)
//! - **Sender**: the message comes from an address on the tracking list
//! - **Reply**: the message's `In-Reply-To`/`References` chain names a
//!   tracked sent message
//!
//! ## Quick Start
//!
//! ```no_run
//! use mail_watch::matcher::KeywordMatcher;
//! use mail_watch::notify::{NotificationGate, TelegramTransport};
//! use mail_watch::store::FsMailStore;
//! use mail_watch::{ImapMailbox, WatchConfig, WatchLoop};
//! use std::time::Duration;
//!
//! # async fn example() -> mail_watch::Result<()> {
//! let config = WatchConfig::builder()
//!     .email("user@gmail.com")
//!     .password("app-password")  // Use app-specific password for Gmail
//!     .build()?;
//!
//! let mailbox = ImapMailbox::connect(config).await?;
//! let gate = NotificationGate::new(
//!     TelegramTransport::new("bot-token", "chat-id"),
//!     Duration::from_secs(300),
//! );
//!
//! let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);
//! WatchLoop::new(
//!     "keyword",
//!     mailbox,
//!     KeywordMatcher::new(["fatura", "invoice"]),
//!     FsMailStore::new("tracked_keyword_mails"),
//!     gate,
//! )
//! .with_interval(Duration::from_secs(30))
//! .run(stop_rx)
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Running several modes concurrently is the [`Supervisor`]'s job: it
//! spawns one worker per mode, restarts workers that die from retryable
//! errors, and fans a single stop signal out to all of them.
//!
//! ## Settings Document
//!
//! The `mail-watch` binary drives everything from one human-editable JSON
//! document ([`Settings`]): connection credentials, the notification
//! platform and throttle, and the three tracking lists. Missing sections
//! get structural defaults and a malformed document falls back to full
//! defaults, so a hand-edited file never prevents startup.
//!
//! ## Error Handling
//!
//! All errors implement `std::error::Error` and provide context. Use
//! [`Error::is_retryable`] to determine if an operation can be retried:
//!
//! ```
//! use mail_watch::Error;
//!
//! fn handle_error(error: &Error) {
//!     if error.is_retryable() {
//!         println!("Transient error, can retry: {}", error);
//!     } else {
//!         println!("Permanent error: {}", error);
//!     }
//! }
//! ```
//!
//! The supervisor uses the same classification to decide whether a dead
//! worker is restarted (with doubling backoff) or whether its mode stays
//! down until the process restarts.
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation. All major operations emit
//! spans with structured fields.
//!
//! ### Span Naming Convention
//!
//! - `WatchLoop::run` - One tracking mode's poll loop
//! - `ImapMailbox::connect` - Connection and authentication
//! - `ImapMailbox::resolve_sent_folder` - Sent-folder probing
//! - `session::authenticate` - IMAP authentication
//! - `connection::establish_tls` - TLS connection
//!
//! ### Standard Fields
//!
//! - `mode` - Tracking mode name
//! - `email` - Email address
//! - `imap_host` - IMAP server hostname
//! - `folder` - Selected mailbox folder
//! - `uid` - Message UID
//!
//! Credentials are never logged; `Debug` output redacts passwords and bot
//! tokens.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod config;
pub mod envelope;
pub mod error;
pub mod known_servers;
pub mod mailbox;
pub mod matcher;
pub mod notify;
pub mod seen;
pub mod settings;
pub mod store;
pub mod supervisor;
pub mod watch;

// Internal modules
mod connection;
mod session;

// Re-exports for ergonomic API
pub use config::{TimeoutConfig, WatchConfig, WatchConfigBuilder};
pub use email_address::EmailAddress;
pub use envelope::MessageEnvelope;
pub use error::{Error, ErrorCategory, Result};
pub use mailbox::{ImapMailbox, Mailbox, SearchFilter};
pub use matcher::{KeywordMatcher, Matcher, ReplyMatcher, SenderMatcher};
pub use notify::{NotificationGate, NotifyOutcome, TelegramTransport, Transport};
pub use seen::SeenSet;
pub use settings::Settings;
pub use store::{FsMailStore, MailStore, SavedMail};
pub use supervisor::{RestartPolicy, Supervisor};
pub use watch::WatchLoop;
