//! mail-watch daemon binary.
//!
//! With no arguments, runs one watch loop per tracking mode enabled in the
//! settings document and stops on Ctrl-C. The maintenance commands edit the
//! tracking lists in the same document.

use mail_watch::mailbox::SearchFilter;
use mail_watch::matcher::{KeywordMatcher, Matcher, ReplyMatcher, SenderMatcher};
use mail_watch::notify::{NotificationGate, TelegramTransport};
use mail_watch::settings::{NotificationSettings, Settings, DEFAULT_SETTINGS_FILE};
use mail_watch::store::FsMailStore;
use mail_watch::supervisor::{RestartPolicy, Supervisor};
use mail_watch::watch::WatchLoop;
use mail_watch::{ImapMailbox, Mailbox, WatchConfig};
use mailparse::MailHeaderMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

/// Grace period for workers to wind down after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let path = settings_path();

    match args.first().map(String::as_str) {
        None | Some("run") => run_watcher(&path).await,
        Some("add-sender") => add_sender_cmd(&path, &args[1..]),
        Some("track-reply") => track_reply_cmd(&path, &args[1..]),
        Some("track-sent") => track_last_sent(&path).await,
        Some("help" | "--help" | "-h") => {
            print_usage();
            ExitCode::SUCCESS
        }
        Some(other) => {
            eprintln!("Unknown command: {other}\n");
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mail_watch=info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn settings_path() -> PathBuf {
    std::env::var("MAIL_WATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_FILE))
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  mail-watch [run]                                   run the watcher");
    eprintln!("  mail-watch add-sender <address> [name] [subject]   track a sender");
    eprintln!("  mail-watch track-reply <message-id> [subject] [recipient]");
    eprintln!("                                                     watch for replies to a sent mail");
    eprintln!("  mail-watch track-sent                              watch for replies to your latest sent mail");
    eprintln!();
    eprintln!("Settings file: ./{DEFAULT_SETTINGS_FILE} (override with MAIL_WATCH_CONFIG)");
}

/// Runs the watcher until Ctrl-C.
async fn run_watcher(path: &Path) -> ExitCode {
    let settings = Settings::load(path);
    let config = match WatchConfig::from_settings(&settings) {
        Ok(config) => config,
        Err(error) => {
            error!(error = %error, "Settings do not contain usable credentials");
            return ExitCode::FAILURE;
        }
    };

    let mut supervisor = Supervisor::new();

    if settings.keyword_tracking.enabled {
        spawn_mode(
            &mut supervisor,
            "keyword",
            &config,
            KeywordMatcher::new(settings.keyword_tracking.keywords.clone()),
            &settings.keyword_tracking.save_folder,
            &settings.notification_settings,
        );
    }
    if settings.sender_tracking.enabled {
        spawn_mode(
            &mut supervisor,
            "sender",
            &config,
            SenderMatcher::new(settings.sender_tracking.tracked_senders.clone()),
            &settings.sender_tracking.save_folder,
            &settings.notification_settings,
        );
    }
    if settings.reply_tracking.enabled {
        spawn_mode(
            &mut supervisor,
            "reply",
            &config,
            ReplyMatcher::new(settings.reply_tracking.tracked_message_ids.clone()),
            &settings.reply_tracking.save_folder,
            &settings.notification_settings,
        );
    }

    if supervisor.worker_count() == 0 {
        warn!(
            path = %path.display(),
            "No tracking modes enabled; edit the settings file and restart"
        );
        return ExitCode::SUCCESS;
    }

    info!(
        workers = supervisor.worker_count(),
        "Watcher running; press Ctrl-C to stop"
    );

    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(error = %error, "Could not listen for the shutdown signal");
    }

    supervisor.shutdown(SHUTDOWN_GRACE).await;
    ExitCode::SUCCESS
}

/// Spawns one supervised watch loop; the factory reconnects on restart.
fn spawn_mode<S>(
    supervisor: &mut Supervisor,
    mode: &'static str,
    config: &WatchConfig,
    matcher: S,
    save_folder: &str,
    notification: &NotificationSettings,
) where
    S: Matcher + Clone + 'static,
{
    let config = config.clone();
    let interval = config.poll_interval;
    let save_folder = save_folder.to_string();
    let notification = notification.clone();

    supervisor.spawn(mode, RestartPolicy::default(), move |stop| {
        let config = config.clone();
        let matcher = matcher.clone();
        let store = FsMailStore::new(save_folder.clone());
        let gate = build_gate(&notification);
        async move {
            let mailbox = ImapMailbox::connect(config).await?;
            WatchLoop::new(mode, mailbox, matcher, store, gate)
                .with_interval(interval)
                .run(stop)
                .await
        }
    });
}

/// Builds a notification gate from the settings, disabled when the selected
/// platform cannot deliver.
fn build_gate(settings: &NotificationSettings) -> NotificationGate<TelegramTransport> {
    let throttle = Duration::from_secs(settings.throttle_seconds);
    match settings.platform.as_str() {
        "telegram" => {
            let telegram = &settings.telegram;
            if !telegram.enabled {
                info!("Telegram notifications disabled in settings");
                return NotificationGate::disabled();
            }
            if telegram.bot_token.is_empty() || telegram.chat_id.is_empty() {
                warn!("Telegram enabled but bot_token or chat_id missing; notifications disabled");
                return NotificationGate::disabled();
            }
            NotificationGate::new(
                TelegramTransport::new(&telegram.bot_token, &telegram.chat_id),
                throttle,
            )
        }
        "whatsapp" => {
            warn!("WhatsApp delivery is not supported; notifications disabled");
            NotificationGate::disabled()
        }
        other => {
            warn!(platform = other, "Unknown notification platform; notifications disabled");
            NotificationGate::disabled()
        }
    }
}

/// Adds a sender to the tracking list and enables sender tracking.
fn add_sender_cmd(path: &Path, args: &[String]) -> ExitCode {
    let Some(address) = args.first() else {
        eprintln!("add-sender needs an email address\n");
        print_usage();
        return ExitCode::FAILURE;
    };
    let name = args.get(1).cloned().unwrap_or_else(|| address.clone());
    let sample_subject = args.get(2).cloned().unwrap_or_default();

    let mut settings = Settings::load(path);
    settings.add_sender(address.clone(), name, sample_subject);

    match settings.save(path) {
        Ok(()) => {
            println!("Now tracking {address}; saved to {}", path.display());
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("Could not save settings: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Adds a sent message's Message-ID to the reply-tracking list.
fn track_reply_cmd(path: &Path, args: &[String]) -> ExitCode {
    let Some(message_id) = args.first() else {
        eprintln!("track-reply needs the Message-ID of the sent mail\n");
        print_usage();
        return ExitCode::FAILURE;
    };
    let subject = args.get(1).cloned().unwrap_or_default();
    let recipient = args.get(2).cloned().unwrap_or_default();

    let mut settings = Settings::load(path);
    settings.add_reply_tracking(
        message_id.clone(),
        subject,
        recipient,
        chrono::Local::now().to_rfc3339(),
    );

    match settings.save(path) {
        Ok(()) => {
            println!(
                "Now watching for replies to {message_id}; saved to {}",
                path.display()
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("Could not save settings: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Looks up the most recent message in the sent folder and starts watching
/// for replies to it.
async fn track_last_sent(path: &Path) -> ExitCode {
    let mut settings = Settings::load(path);
    let config = match WatchConfig::from_settings(&settings) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Settings do not contain usable credentials: {error}");
            return ExitCode::FAILURE;
        }
    };

    let mut mailbox = match ImapMailbox::connect(config).await {
        Ok(mailbox) => mailbox,
        Err(error) => {
            eprintln!("Connection failed: {error}");
            return ExitCode::FAILURE;
        }
    };

    let result = fetch_latest_sent(&mut mailbox).await;
    let _ = mailbox.disconnect().await;

    let (message_id, subject, recipient, date) = match result {
        Ok(details) => details,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    println!("Latest sent message: {subject}");
    println!("  Message-ID: {message_id}");
    println!("  To: {recipient}");

    settings.add_reply_tracking(message_id.clone(), subject, recipient, date);
    match settings.save(path) {
        Ok(()) => {
            println!(
                "Now watching for replies to {message_id}; saved to {}",
                path.display()
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("Could not save settings: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `(message_id, subject, recipient, date)` of the newest sent mail.
async fn fetch_latest_sent(
    mailbox: &mut ImapMailbox,
) -> Result<(String, String, String, String), String> {
    let folder = mailbox
        .resolve_sent_folder()
        .await
        .map_err(|error| format!("Could not find the sent folder: {error}"))?;
    let uids = mailbox
        .search(SearchFilter::All)
        .await
        .map_err(|error| format!("Search failed: {error}"))?;
    let uid = *uids
        .last()
        .ok_or_else(|| format!("No messages in {folder}"))?;
    let raw = mailbox
        .fetch(uid)
        .await
        .map_err(|error| format!("Fetch failed: {error}"))?
        .ok_or_else(|| "Latest sent message vanished before fetch".to_string())?;

    let parsed = mailparse::parse_mail(&raw)
        .map_err(|error| format!("Could not parse the latest sent message: {error}"))?;
    let header = |name: &str| parsed.headers.get_first_value(name).unwrap_or_default();

    let message_id = header("Message-ID").trim().to_string();
    if message_id.is_empty() {
        return Err("Latest sent message carries no Message-ID".to_string());
    }

    Ok((message_id, header("Subject"), header("To"), header("Date")))
}
