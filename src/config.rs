//! Runtime configuration for one watch session.
//!
//! Use [`WatchConfigBuilder`] to create a configuration with sensible
//! defaults:
//!
//! ```
//! use mail_watch::WatchConfig;
//!
//! let config = WatchConfig::builder()
//!     .email("user@example.com")
//!     .password("app-password")
//!     .build()
//!     .expect("valid config");
//! ```

use crate::error::{Error, Result};
use crate::settings::Settings;
use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Configuration for connecting to and polling an IMAP server.
///
/// Create using [`WatchConfig::builder()`] or derive one from a loaded
/// settings document with [`WatchConfig::from_settings`].
///
/// The `password` field is stored as a [`SecretString`] so credentials never
/// leak into logs; the `email` field is a validated [`EmailAddress`].
#[derive(Clone)]
pub struct WatchConfig {
    /// Email address (used for login and IMAP server discovery).
    email: EmailAddress,
    /// Email password or app-specific password (protected from accidental logging).
    password: SecretString,
    /// IMAP server hostname (auto-discovered from email domain if not set).
    pub imap_host: Option<String>,
    /// IMAP server port (default: 993 for IMAPS).
    pub imap_port: u16,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
    /// Interval between poll ticks.
    pub poll_interval: Duration,
}

impl std::fmt::Debug for WatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchConfig")
            .field("email", &self.email.as_str())
            .field("password", &"[REDACTED]")
            .field("imap_host", &self.imap_host)
            .field("imap_port", &self.imap_port)
            .field("timeouts", &self.timeouts)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl WatchConfig {
    /// Returns the email address as a string slice.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Returns the password as a string slice.
    ///
    /// Only the authentication path should call this; the password is
    /// intentionally not a public field so it cannot end up in logs.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> WatchConfigBuilder {
        WatchConfigBuilder::default()
    }

    /// Builds a runtime config from a loaded settings document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document has no valid email address or an
    /// empty password.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut builder = Self::builder()
            .email(&settings.email_settings.email_address)
            .password(&settings.email_settings.password)
            .poll_interval(Duration::from_secs(settings.email_settings.check_interval));
        if !settings.email_settings.imap_server.is_empty() {
            builder = builder.imap_host(&settings.email_settings.imap_server);
        }
        builder.build()
    }

    /// Returns the effective IMAP host, either explicitly configured or
    /// derived from the email domain.
    #[must_use]
    pub fn effective_imap_host(&self) -> String {
        if let Some(host) = &self.imap_host {
            host.clone()
        } else {
            crate::known_servers::discover_imap_host(self.email.as_str())
        }
    }

    /// Returns the full IMAP server address as "host:port".
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.effective_imap_host(), self.imap_port)
    }
}

/// Timeout configuration for the IMAP operations of one worker.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for IMAP authentication.
    pub auth: Duration,
    /// Timeout for selecting a folder.
    pub select: Duration,
    /// Timeout for a UID search.
    pub search: Duration,
    /// Timeout for fetching one message.
    pub fetch: Duration,
    /// Timeout for the logout on shutdown.
    pub logout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            auth: Duration::from_secs(30),
            select: Duration::from_secs(10),
            search: Duration::from_secs(10),
            fetch: Duration::from_secs(30),
            logout: Duration::from_secs(5),
        }
    }
}

/// Validates an email address format.
fn validate_email(email: &str) -> Result<EmailAddress> {
    EmailAddress::parse_with_options(email, email_address::Options::default()).map_err(|_| {
        Error::InvalidEmailFormat {
            email: email.to_string(),
        }
    })
}

/// Builder for [`WatchConfig`].
#[derive(Debug, Default)]
pub struct WatchConfigBuilder {
    email: Option<String>,
    password: Option<String>,
    imap_host: Option<String>,
    imap_port: Option<u16>,
    timeouts: Option<TimeoutConfig>,
    poll_interval: Option<Duration>,
}

impl WatchConfigBuilder {
    /// Sets the email address (required).
    ///
    /// The email domain is used to auto-discover the IMAP server if no
    /// explicit host is set.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the password (required).
    ///
    /// For Gmail/Outlook, use an app-specific password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the IMAP server hostname explicitly.
    ///
    /// If not set, the server is auto-discovered from the email domain.
    #[must_use]
    pub fn imap_host(mut self, host: impl Into<String>) -> Self {
        self.imap_host = Some(host.into());
        self
    }

    /// Sets the IMAP server port.
    ///
    /// Default is 993 (IMAPS with TLS).
    #[must_use]
    pub fn imap_port(mut self, port: u16) -> Self {
        self.imap_port = Some(port);
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = timeout;
        self
    }

    /// Sets the interval between poll ticks.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn build(self) -> Result<WatchConfig> {
        let email_raw = self.email.ok_or_else(|| Error::InvalidConfig {
            message: "email is required".into(),
        })?;

        let email = validate_email(&email_raw)?;

        let password_raw = self.password.ok_or_else(|| Error::InvalidConfig {
            message: "password is required".into(),
        })?;
        if password_raw.is_empty() {
            return Err(Error::InvalidConfig {
                message: "password is required".into(),
            });
        }

        Ok(WatchConfig {
            email,
            password: SecretString::from(password_raw),
            imap_host: self.imap_host,
            imap_port: self.imap_port.unwrap_or(993),
            timeouts: self.timeouts.unwrap_or_default(),
            poll_interval: self.poll_interval.unwrap_or(Duration::from_secs(30)),
        })
    }
}
