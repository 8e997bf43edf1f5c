//! The per-mode poll loop.
//!
//! A [`WatchLoop`] repeatedly fetches messages from one folder, classifies
//! them with its [`Matcher`], and persists + notifies on matches, deduping
//! through a [`SeenSet`] so a message is reported at most once per run.
//!
//! The loop moves through `Idle → Baselining → Polling ⟲ → Stopped`. The
//! baseline step marks the pre-existing backlog as seen without reporting
//! it (for the modes that want that), so starting the watcher against a
//! full mailbox does not flood notifications. Transient errors never leave
//! the `Polling` state: a failed tick is logged, abandoned, and retried
//! after the next sleep.

use crate::envelope::decode_envelope;
use crate::error::Result;
use crate::mailbox::Mailbox;
use crate::matcher::Matcher;
use crate::notify::{NotificationGate, Transport};
use crate::seen::SeenSet;
use crate::store::MailStore;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// States of one poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    /// Constructed, not yet started.
    Idle,
    /// Marking the pre-existing backlog as seen.
    Baselining,
    /// Ticking: fetch, classify, report, sleep.
    Polling,
    /// Cancelled; connection released.
    Stopped,
}

/// What one tick did, for logging.
#[derive(Debug, Default)]
struct TickReport {
    fresh: usize,
    matched: usize,
}

/// One tracking mode's poll loop.
///
/// Owns its mailbox connection, matcher, store, notification gate, and
/// seen-set; nothing is shared with other modes except the stop signal.
pub struct WatchLoop<M, S, P, T> {
    mode: String,
    mailbox: M,
    matcher: S,
    store: P,
    gate: NotificationGate<T>,
    folder: String,
    interval: Duration,
    seen: SeenSet,
    state: LoopState,
}

impl<M, S, P, T> WatchLoop<M, S, P, T>
where
    M: Mailbox,
    S: Matcher,
    P: MailStore,
    T: Transport,
{
    /// Creates a loop watching `INBOX` with a 30 second tick interval.
    #[must_use]
    pub fn new(
        mode: impl Into<String>,
        mailbox: M,
        matcher: S,
        store: P,
        gate: NotificationGate<T>,
    ) -> Self {
        Self {
            mode: mode.into(),
            mailbox,
            matcher,
            store,
            gate,
            folder: "INBOX".to_string(),
            interval: Duration::from_secs(30),
            seen: SeenSet::new(),
            state: LoopState::Idle,
        }
    }

    /// Sets the folder to watch.
    #[must_use]
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    /// Sets the interval between ticks.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn set_state(&mut self, next: LoopState) {
        debug!(from = ?self.state, to = ?next, "State transition");
        self.state = next;
    }

    /// Runs until `stop` flips to `true` (or its sender is dropped).
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok(())` after a clean stop; transient
    /// errors are absorbed inside the loop. The `Result` leaves room for
    /// implementations of the collaborator traits to become fatal later.
    #[instrument(name = "WatchLoop::run", skip_all, fields(mode = %self.mode, folder = %self.folder))]
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Result<()> {
        info!(
            matcher = %self.matcher.description(),
            interval_secs = self.interval.as_secs(),
            "Watch loop starting"
        );

        if self.matcher.skips_backlog() {
            self.set_state(LoopState::Baselining);
            self.run_baseline().await;
        }

        self.set_state(LoopState::Polling);

        while !*stop.borrow() {
            match self.tick(&stop).await {
                Ok(report) => {
                    if report.fresh > 0 {
                        info!(
                            fresh = report.fresh,
                            matched = report.matched,
                            seen_total = self.seen.len(),
                            "Tick complete"
                        );
                    } else {
                        debug!("No new messages");
                    }
                }
                // Transient errors abandon the tick; the loop sleeps and
                // retries indefinitely rather than giving up the mode.
                Err(error) => {
                    warn!(
                        category = %error.category(),
                        error = %error,
                        "Tick failed, will retry next interval"
                    );
                }
            }

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                _ = stop.changed() => {}
            }
        }

        self.set_state(LoopState::Stopped);
        if let Err(error) = self.mailbox.disconnect().await {
            debug!(error = %error, "Disconnect failed during shutdown");
        }
        info!("Watch loop stopped");

        Ok(())
    }

    /// Marks everything currently matching the mode's filter as seen.
    ///
    /// A failed baseline is not fatal: the loop proceeds with an empty
    /// seen-set, accepting possible duplicate reports on the first real
    /// poll over silently losing matches.
    async fn run_baseline(&mut self) {
        let result = async {
            self.mailbox.select_folder(&self.folder).await?;
            self.mailbox.search(self.matcher.search_filter()).await
        }
        .await;

        match result {
            Ok(uids) => {
                info!(
                    skipped = uids.len(),
                    "Baseline complete; existing messages will not be reported"
                );
                self.seen.absorb(uids);
            }
            Err(error) => {
                warn!(
                    category = %error.category(),
                    error = %error,
                    "Baseline fetch failed, continuing with empty seen-set"
                );
            }
        }
    }

    /// One poll tick: fetch fresh UIDs, classify, report matches.
    async fn tick(&mut self, stop: &watch::Receiver<bool>) -> Result<TickReport> {
        self.mailbox.select_folder(&self.folder).await?;
        let uids = self.mailbox.search(self.matcher.search_filter()).await?;

        let fresh: Vec<u32> = uids
            .into_iter()
            .filter(|uid| !self.seen.contains(*uid))
            .collect();

        let mut report = TickReport {
            fresh: fresh.len(),
            ..TickReport::default()
        };

        for uid in fresh {
            if *stop.borrow() {
                break;
            }
            if self.process_message(uid).await {
                report.matched += 1;
            }
            // Matched or not, the message is never reconsidered
            self.seen.mark(uid);
        }

        Ok(report)
    }

    /// Fetches, decodes, and classifies one message. Returns `true` on match.
    ///
    /// Per-message failures are logged and treated as no-match so the tick
    /// continues with the remaining messages.
    async fn process_message(&mut self, uid: u32) -> bool {
        let raw = match self.mailbox.fetch(uid).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(uid, "Message gone before fetch, skipping");
                return false;
            }
            Err(error) => {
                warn!(uid, error = %error, "Fetch failed, skipping message");
                return false;
            }
        };

        let envelope = match decode_envelope(uid, &raw) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(uid, error = %error, "Undecodable message, skipping");
                return false;
            }
        };

        let Some(info) = self.matcher.classify(&envelope) else {
            return false;
        };

        info!(
            uid,
            source = %info.source,
            subject = %envelope.subject,
            from = %envelope.sender_display,
            "Match found"
        );

        // Persistence and notification are independent best-effort steps:
        // a failed save still notifies (with no attachment paths).
        let attachment_paths = match self.store.save(&envelope, &raw, &info) {
            Ok(saved) => {
                debug!(
                    record = %saved.record_path.display(),
                    raw = %saved.raw_path.display(),
                    "Match persisted"
                );
                saved.attachment_paths
            }
            Err(error) => {
                warn!(uid, error = %error, "Persistence failed, still notifying");
                Vec::new()
            }
        };

        self.gate
            .notify(&envelope, &info.source, &attachment_paths)
            .await;

        true
    }
}
