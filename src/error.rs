//! Error types for the mail-watch crate.
//!
//! All errors implement [`std::error::Error`] and provide context about what went wrong.
//! Errors are categorized by their retryability - see [`Error::is_retryable`].

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while watching a mailbox.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration / validation errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid email address format.
    #[error("invalid email format: {email}")]
    InvalidEmailFormat {
        /// The invalid email address.
        email: String,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Network / connection errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to establish TCP connection.
    #[error("failed to connect to {target}")]
    TcpConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection.
    #[error("failed to establish TLS connection to {target}")]
    TlsConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Timeout errors (RETRYABLE - the server may just be slow)
    // ─────────────────────────────────────────────────────────────────────────
    /// Connection timeout.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Authentication timeout.
    #[error("authentication timeout for {email} after {timeout:?}")]
    AuthTimeout {
        /// The email address used for authentication.
        email: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Timeout on an IMAP operation (select, search, fetch, list).
    #[error("{operation} timeout after {timeout:?}")]
    OperationTimeout {
        /// The operation that timed out.
        operation: &'static str,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IMAP protocol errors (RETRYABLE - could be transient server issues)
    // ─────────────────────────────────────────────────────────────────────────
    /// IMAP login failed.
    #[error("IMAP login failed for {email}")]
    ImapLogin {
        /// The email address used for login.
        email: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to select a mailbox folder.
    #[error("failed to select folder '{folder}'")]
    SelectFolder {
        /// The folder name.
        folder: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// No usable sent-mail folder was found on the server.
    #[error("no sent-mail folder found on server")]
    SentFolderNotFound,

    /// IMAP search failed.
    #[error("IMAP search failed for query '{query}'")]
    ImapSearch {
        /// The search query that failed.
        query: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP fetch failed.
    #[error("IMAP fetch failed for UID {uid}")]
    ImapFetch {
        /// The UID that failed.
        uid: u32,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP LIST command failed.
    #[error("IMAP folder listing failed")]
    ImapList {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP logout failed.
    #[error("IMAP logout failed")]
    ImapLogout {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Message decoding errors (NOT retryable - malformed content won't change)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to parse a fetched message.
    #[error("failed to parse message with UID {uid}")]
    ParseMessage {
        /// The UID of the unparseable message.
        uid: u32,
        /// The underlying parse error.
        #[source]
        source: mailparse::MailParseError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Persistence errors (NOT retryable; logged, notification still attempted)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to write a saved-mail record, raw message, or attachment.
    #[error("failed to save mail to {path}")]
    SaveMail {
        /// The path that could not be written.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize a saved-mail record.
    #[error("failed to encode saved-mail record")]
    EncodeRecord {
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Settings document errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to read or write the settings document.
    #[error("settings file error for {path}")]
    SettingsIo {
        /// The settings file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Notification transport errors (RETRYABLE - next match may go through)
    // ─────────────────────────────────────────────────────────────────────────
    /// The notification endpoint rejected the request.
    #[error("notification transport error: {message}")]
    Notify {
        /// Description of the transport failure.
        message: String,
    },

    /// HTTP request to the notification endpoint failed.
    #[error("notification request failed")]
    NotifyHttp {
        /// The underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },
}

impl Error {
    /// Returns `true` if this error represents a transient failure that might succeed on retry.
    ///
    /// The supervisor uses this to decide whether a dead worker is restarted
    /// or whether that tracking mode shuts down for good:
    ///
    /// ```ignore
    /// if error.is_retryable() {
    ///     // Backoff and restart the worker
    /// } else {
    ///     // Stop this tracking mode permanently
    /// }
    /// ```
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            // RETRYABLE errors: network, timeouts, IMAP operations, notification
            Error::TcpConnect { .. }
            | Error::TlsConnect { .. }
            | Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::OperationTimeout { .. }
            | Error::ImapLogin { .. }
            | Error::SelectFolder { .. }
            | Error::ImapSearch { .. }
            | Error::ImapFetch { .. }
            | Error::ImapList { .. }
            | Error::Notify { .. }
            | Error::NotifyHttp { .. } => true,

            // NOT retryable: config errors, parsing, persistence, settings
            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidDnsName { .. }
            | Error::SentFolderNotFound
            | Error::ImapLogout { .. }
            | Error::ParseMessage { .. }
            | Error::SaveMail { .. }
            | Error::EncodeRecord { .. }
            | Error::SettingsIo { .. } => false,
        }
    }

    /// Returns the error category for metrics/logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidDnsName { .. }
            | Error::SettingsIo { .. } => ErrorCategory::Configuration,

            Error::TcpConnect { .. } | Error::TlsConnect { .. } => ErrorCategory::Network,

            Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::OperationTimeout { .. } => ErrorCategory::Timeout,

            Error::ImapLogin { .. }
            | Error::SelectFolder { .. }
            | Error::SentFolderNotFound
            | Error::ImapSearch { .. }
            | Error::ImapFetch { .. }
            | Error::ImapList { .. }
            | Error::ImapLogout { .. } => ErrorCategory::Protocol,

            Error::ParseMessage { .. } => ErrorCategory::Parse,

            Error::SaveMail { .. } | Error::EncodeRecord { .. } => ErrorCategory::Persistence,

            Error::Notify { .. } | Error::NotifyHttp { .. } => ErrorCategory::Notification,
        }
    }
}

/// Error categories for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or validation errors.
    Configuration,
    /// Network connectivity errors.
    Network,
    /// Timeout errors.
    Timeout,
    /// IMAP protocol errors.
    Protocol,
    /// Message decoding errors.
    Parse,
    /// Saved-mail persistence errors.
    Persistence,
    /// Notification transport errors.
    Notification,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Parse => write!(f, "parse"),
            ErrorCategory::Persistence => write!(f, "persistence"),
            ErrorCategory::Notification => write!(f, "notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        // Configuration errors are not retryable
        let err = Error::InvalidEmailFormat {
            email: "bad".into(),
        };
        assert!(!err.is_retryable());

        // Network errors are retryable
        let err = Error::TcpConnect {
            target: "imap.example.com:993".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.is_retryable());

        // Persistence errors are not retryable
        let err = Error::SaveMail {
            path: "/tmp/x.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!err.is_retryable());

        // Notification errors are retryable
        let err = Error::Notify {
            message: "HTTP 502".into(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_categories() {
        let err = Error::InvalidEmailFormat {
            email: "bad".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = Error::ConnectTimeout {
            target: "imap.example.com:993".into(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.category(), ErrorCategory::Timeout);

        let err = Error::Notify {
            message: "boom".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Notification);
    }
}
