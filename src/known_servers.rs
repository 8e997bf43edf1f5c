//! IMAP server discovery from email domains.
//!
//! The settings document may leave `imap_server` empty, in which case the
//! host is derived from the account's email domain: known providers map to
//! their documented IMAP endpoints, everything else falls back to
//! `imap.{domain}`.
//!
//! # Example
//!
//! ```
//! use mail_watch::known_servers::discover_imap_host;
//!
//! assert_eq!(discover_imap_host("user@gmail.com"), "imap.gmail.com");
//! assert_eq!(discover_imap_host("user@custom.org"), "imap.custom.org");
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

/// Map of email domains to their IMAP server hostnames.
static KNOWN_SERVERS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    // Google
    m.insert("gmail.com", "imap.gmail.com");

    // Yahoo
    m.insert("yahoo.com", "imap.mail.yahoo.com");

    // Microsoft
    m.insert("hotmail.com", "imap-mail.outlook.com");
    m.insert("outlook.com", "imap-mail.outlook.com");
    m.insert("live.com", "imap-mail.outlook.com");

    // Apple
    m.insert("icloud.com", "imap.mail.me.com");
    m.insert("me.com", "imap.mail.me.com");
    m.insert("mac.com", "imap.mail.me.com");

    // AOL
    m.insert("aol.com", "imap.aol.com");

    // Yandex
    m.insert("yandex.ru", "imap.yandex.ru");
    m.insert("yandex.com", "imap.yandex.ru");

    // Mail.ru network
    m.insert("mail.ru", "imap.mail.ru");
    m.insert("bk.ru", "imap.mail.ru");
    m.insert("inbox.ru", "imap.mail.ru");
    m.insert("list.ru", "imap.mail.ru");

    // German providers
    m.insert("web.de", "imap.web.de");
    m.insert("gmx.de", "imap.gmx.net");
    m.insert("gmx.net", "imap.gmx.net");
    m.insert("gmx.com", "imap.gmx.net");
    m.insert("t-online.de", "secureimap.t-online.de");

    m
});

/// Discovers the IMAP hostname for an email address.
///
/// If the domain is known, returns the corresponding IMAP server.
/// Otherwise, returns a default of `imap.{domain}`.
#[must_use]
pub fn discover_imap_host(email: &str) -> String {
    let domain = email.split('@').nth(1).unwrap_or(email).to_lowercase();

    KNOWN_SERVERS
        .get(domain.as_str())
        .map_or_else(|| format!("imap.{domain}"), |&s| s.to_string())
}

/// Returns `true` if the domain has a known IMAP server mapping.
#[must_use]
pub fn is_known_domain(domain: &str) -> bool {
    KNOWN_SERVERS.contains_key(domain.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gmail() {
        assert_eq!(discover_imap_host("user@gmail.com"), "imap.gmail.com");
    }

    #[test]
    fn test_outlook_family() {
        assert_eq!(
            discover_imap_host("user@outlook.com"),
            "imap-mail.outlook.com"
        );
        assert_eq!(
            discover_imap_host("user@hotmail.com"),
            "imap-mail.outlook.com"
        );
    }

    #[test]
    fn test_unknown_domain_falls_back() {
        assert_eq!(discover_imap_host("user@example.com"), "imap.example.com");
        assert_eq!(
            discover_imap_host("user@mycompany.org"),
            "imap.mycompany.org"
        );
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(discover_imap_host("user@GMAIL.COM"), "imap.gmail.com");
    }

    #[test]
    fn test_is_known_domain() {
        assert!(is_known_domain("gmail.com"));
        assert!(is_known_domain("GMAIL.com"));
        assert!(!is_known_domain("example.com"));
    }
}
