//! Mailbox access provider.
//!
//! The poll loop talks to a [`Mailbox`] trait so tests can script fetch
//! cycles; [`ImapMailbox`] is the real implementation over one TLS IMAP
//! session. Each worker owns its own connection - IMAP sessions are not
//! safe to share, so connections never cross worker boundaries.

use crate::config::WatchConfig;
use crate::connection;
use crate::error::{Error, Result};
use crate::session::{self, AuthConfig, ImapSession};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Server-side search filter for a poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFilter {
    /// Every message in the folder.
    All,
    /// Only messages without the `\Seen` flag.
    Unseen,
}

impl SearchFilter {
    /// The IMAP SEARCH query for this filter.
    #[must_use]
    pub fn as_query(self) -> &'static str {
        match self {
            SearchFilter::All => "ALL",
            SearchFilter::Unseen => "UNSEEN",
        }
    }
}

/// Access to one mailbox for one worker.
#[async_trait]
pub trait Mailbox: Send {
    /// Selects the folder that subsequent operations act on.
    async fn select_folder(&mut self, folder: &str) -> Result<()>;

    /// Returns the UIDs matching `filter` in the selected folder,
    /// ascending.
    async fn search(&mut self, filter: SearchFilter) -> Result<Vec<u32>>;

    /// Fetches the raw bytes of one message; `None` if it vanished.
    async fn fetch(&mut self, uid: u32) -> Result<Option<Vec<u8>>>;

    /// Best-effort clean disconnect.
    async fn disconnect(&mut self) -> Result<()>;
}

/// Known sent-folder names, probed in order.
///
/// The Gmail entries include the modified-UTF-7 encoded Turkish localization
/// of "Sent Mail" as it actually appears on the wire.
const SENT_FOLDER_CANDIDATES: &[&str] = &[
    "[Gmail]/Sent Mail",
    "[Gmail]/G&APY-nderilmi&AV8- Postalar",
    "Sent",
    "INBOX.Sent",
    "Sent Items",
    "Sent Messages",
];

/// Returns `true` if a listed folder name plausibly holds sent mail.
fn looks_like_sent_folder(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("sent") || lower.contains("gönder") || lower.contains("g&")
}

/// IMAP-backed [`Mailbox`] over one authenticated TLS session.
pub struct ImapMailbox {
    session: Box<ImapSession>,
    config: WatchConfig,
}

impl std::fmt::Debug for ImapMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapMailbox")
            .field("email", &self.config.email())
            .field("imap_host", &self.config.effective_imap_host())
            .finish_non_exhaustive()
    }
}

/// Wraps an IMAP operation future with a timeout.
async fn with_timeout<T, F>(duration: Duration, operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| Error::OperationTimeout {
            operation,
            timeout: duration,
        })?
}

impl ImapMailbox {
    /// Connects and authenticates to the configured IMAP server.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or
    /// authentication fails; such errors are fatal to the worker's current
    /// run (the supervisor decides whether to restart).
    #[instrument(
        name = "ImapMailbox::connect",
        skip_all,
        fields(
            email = %config.email(),
            imap_host = %config.effective_imap_host()
        )
    )]
    pub async fn connect(config: WatchConfig) -> Result<Self> {
        let imap_host = config.effective_imap_host();
        let target_addr = config.server_address();
        let timeouts = &config.timeouts;

        let tls_stream = tokio::time::timeout(
            timeouts.connect,
            connection::establish_tls_connection(&imap_host, &target_addr),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: target_addr.clone(),
            timeout: timeouts.connect,
        })??;

        debug!("TLS connection established");

        let auth_config = AuthConfig {
            email: config.email(),
            password: config.password(),
        };

        let session = tokio::time::timeout(
            timeouts.auth,
            session::authenticate(tls_stream, &auth_config),
        )
        .await
        .map_err(|_| Error::AuthTimeout {
            email: config.email().to_string(),
            timeout: timeouts.auth,
        })??;

        info!("Connected and authenticated");

        Ok(Self {
            session: Box::new(session),
            config,
        })
    }

    /// Lists all folder names on the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the LIST command fails or times out.
    pub async fn list_folders(&mut self) -> Result<Vec<String>> {
        with_timeout(
            self.config.timeouts.search,
            "folder listing",
            session::list_folders(&mut self.session),
        )
        .await
    }

    /// Finds and selects the server's sent-mail folder.
    ///
    /// Known names are probed first; failing that, the folder listing is
    /// scanned for plausible candidates. The winning folder is left
    /// selected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SentFolderNotFound`] if nothing selectable looks
    /// like a sent folder.
    #[instrument(name = "ImapMailbox::resolve_sent_folder", skip(self))]
    pub async fn resolve_sent_folder(&mut self) -> Result<String> {
        for candidate in SENT_FOLDER_CANDIDATES {
            if self.try_select(candidate).await {
                info!(folder = candidate, "Sent folder resolved");
                return Ok((*candidate).to_string());
            }
        }

        let names = self.list_folders().await?;
        for name in names {
            if looks_like_sent_folder(&name) && self.try_select(&name).await {
                info!(folder = %name, "Sent folder resolved from listing");
                return Ok(name);
            }
        }

        Err(Error::SentFolderNotFound)
    }

    async fn try_select(&mut self, folder: &str) -> bool {
        with_timeout(
            self.config.timeouts.select,
            "folder select",
            session::select_folder(&mut self.session, folder),
        )
        .await
        .is_ok()
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn select_folder(&mut self, folder: &str) -> Result<()> {
        with_timeout(
            self.config.timeouts.select,
            "folder select",
            session::select_folder(&mut self.session, folder),
        )
        .await
    }

    async fn search(&mut self, filter: SearchFilter) -> Result<Vec<u32>> {
        with_timeout(
            self.config.timeouts.search,
            "search",
            session::uid_search(&mut self.session, filter.as_query()),
        )
        .await
    }

    async fn fetch(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
        with_timeout(
            self.config.timeouts.fetch,
            "fetch",
            session::fetch_raw(&mut self.session, uid),
        )
        .await
    }

    async fn disconnect(&mut self) -> Result<()> {
        with_timeout(
            self.config.timeouts.logout,
            "logout",
            session::logout(&mut self.session),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_filter_queries() {
        assert_eq!(SearchFilter::All.as_query(), "ALL");
        assert_eq!(SearchFilter::Unseen.as_query(), "UNSEEN");
    }

    #[test]
    fn test_looks_like_sent_folder() {
        assert!(looks_like_sent_folder("[Gmail]/Sent Mail"));
        assert!(looks_like_sent_folder("INBOX.Sent"));
        assert!(looks_like_sent_folder("Gönderilmiş Postalar"));
        assert!(looks_like_sent_folder("[Gmail]/G&APY-nderilmi&AV8- Postalar"));
        assert!(!looks_like_sent_folder("INBOX"));
        assert!(!looks_like_sent_folder("Drafts"));
    }
}
