//! Internal IMAP session management.
//!
//! This module wraps async-imap operations with proper error handling.

use crate::connection::TlsStream;
use crate::error::{Error, Result};
use async_imap::Session;
use futures::StreamExt;
use tracing::{debug, instrument};

/// Type alias for IMAP session over TLS.
pub(crate) type ImapSession = Session<TlsStream>;

/// Authentication configuration for IMAP.
pub(crate) struct AuthConfig<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Authenticates to IMAP server and returns a session.
#[instrument(
    name = "session::authenticate",
    skip_all,
    fields(email = %config.email)
)]
pub(crate) async fn authenticate(
    tls_stream: TlsStream,
    config: &AuthConfig<'_>,
) -> Result<ImapSession> {
    let client = async_imap::Client::new(tls_stream);

    debug!("Authenticating to IMAP server");

    client
        .login(config.email, config.password)
        .await
        .map_err(|e| Error::ImapLogin {
            email: config.email.to_string(),
            source: e.0,
        })
}

/// Selects a mailbox folder.
#[instrument(name = "session::select", skip(session), fields(folder = %folder))]
pub(crate) async fn select_folder(session: &mut ImapSession, folder: &str) -> Result<()> {
    session
        .select(folder)
        .await
        .map_err(|source| Error::SelectFolder {
            folder: folder.to_string(),
            source,
        })?;

    Ok(())
}

/// Runs a UID search with the given query, returning UIDs in ascending order.
#[instrument(name = "session::uid_search", skip(session), fields(query = %query))]
pub(crate) async fn uid_search(session: &mut ImapSession, query: &str) -> Result<Vec<u32>> {
    // NOOP first so the search sees the server's latest state
    session
        .noop()
        .await
        .map_err(|source| Error::ImapSearch {
            query: query.to_string(),
            source,
        })?;

    let uids = session
        .uid_search(query)
        .await
        .map_err(|source| Error::ImapSearch {
            query: query.to_string(),
            source,
        })?;

    let mut uids: Vec<u32> = uids.into_iter().collect();
    uids.sort_unstable();

    debug!(uid_count = uids.len(), "Search complete");

    Ok(uids)
}

/// Fetches the raw RFC822 bytes of a single message by UID.
///
/// Returns `None` if the message disappeared between search and fetch.
#[instrument(name = "session::fetch_raw", skip(session), fields(uid))]
pub(crate) async fn fetch_raw(session: &mut ImapSession, uid: u32) -> Result<Option<Vec<u8>>> {
    let uid_str = uid.to_string();
    let mut stream = session
        .uid_fetch(&uid_str, "BODY[]")
        .await
        .map_err(|source| Error::ImapFetch { uid, source })?;

    let mut raw = None;
    while let Some(item) = stream.next().await {
        let fetch = item.map_err(|source| Error::ImapFetch { uid, source })?;
        if let Some(body) = fetch.body() {
            raw = Some(body.to_vec());
        }
    }

    if raw.is_none() {
        debug!(uid, "Message had no body in fetch response");
    }

    Ok(raw)
}

/// Lists all folder names on the server.
#[instrument(name = "session::list_folders", skip(session))]
pub(crate) async fn list_folders(session: &mut ImapSession) -> Result<Vec<String>> {
    let mut stream = session
        .list(Some(""), Some("*"))
        .await
        .map_err(|source| Error::ImapList { source })?;

    let mut names = Vec::new();
    while let Some(item) = stream.next().await {
        let name = item.map_err(|source| Error::ImapList { source })?;
        names.push(name.name().to_string());
    }

    debug!(folder_count = names.len(), "Listed folders");

    Ok(names)
}

/// Logs out from IMAP session.
#[instrument(name = "session::logout", skip(session))]
pub(crate) async fn logout(session: &mut ImapSession) -> Result<()> {
    debug!("Logging out");

    session
        .logout()
        .await
        .map_err(|source| Error::ImapLogout { source })?;

    Ok(())
}
