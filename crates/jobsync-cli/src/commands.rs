//! CLI command implementations.

use anyhow::{bail, Context, Result};
use jobsync_client::{FileTokenProvider, StoredSession};
use jobsync_realtime::{ChatMessage, ConnectionStatus, Notification, SyncService};
use jobsync_types::{Role, SessionIdentity};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::CliConfig;

fn open_tokens(config: &CliConfig) -> Result<FileTokenProvider> {
    let provider = match &config.credentials_path {
        Some(path) => FileTokenProvider::open(path.clone()),
        None => FileTokenProvider::open_default(),
    };
    provider.context("failed to open credentials")
}

/// Resolve the subject for `role`: explicit, or from the stored session.
fn subject_for(tokens: &FileTokenProvider, role: Role, subject: Option<String>) -> Result<String> {
    if let Some(subject) = subject {
        return Ok(subject);
    }
    match tokens.identity(role) {
        Some(identity) => Ok(identity.subject_id),
        None => bail!("no stored session for {role}; run `jobsync token set` first"),
    }
}

fn service(config: &CliConfig, tokens: Arc<FileTokenProvider>) -> Result<SyncService> {
    let collaborators = jobsync_client::collaborators(&config.api_url, &config.ws_url, tokens)
        .context("failed to build portal client")?;
    Ok(SyncService::new(config.realtime.clone(), collaborators))
}

/// Matches the server's echo of a message `identity` sends.
///
/// The id is assigned by the server, so the echo is recognized by sender,
/// conversation and content.
fn echo_of(
    identity: SessionIdentity,
    conversation_id: &str,
    content: &str,
) -> impl Fn(&ChatMessage) -> bool + Send + Sync + 'static {
    let conversation_id = conversation_id.to_string();
    let content = content.to_string();
    move |message| {
        identity.is_sender(&message.sender_id, message.sender_type)
            && message.conversation_id == conversation_id
            && message.content == content
    }
}

fn print_message(message: &ChatMessage) {
    println!(
        "[message] conversation={} from={}:{} id={} {}",
        message.conversation_id, message.sender_type, message.sender_id, message.id, message.content
    );
}

fn print_notification(notification: &Notification) {
    println!(
        "[notification] id={} type={} {}",
        notification.id, notification.kind, notification.title
    );
}

fn print_summary(service: &SyncService) {
    println!(
        "[summary] status={} unread_conversations={} unread_notifications={}",
        service.status(),
        service.unread_total(),
        service.unread_count()
    );
}

/// Connect as `role` and print live events until interrupted.
pub async fn watch(config: &CliConfig, role: Role, subject: Option<String>) -> Result<()> {
    let tokens = Arc::new(open_tokens(config)?);
    let subject = subject_for(&tokens, role, subject)?;
    let service = service(config, tokens)?;

    let messages = service.subscribe_to_messages(print_message);
    let notifications = service.subscribe_to_notifications(print_notification);
    let mut status = service.watch_status();

    tracing::info!(role = %role, subject = %subject, "Watching");
    service.set_identity(subject, role).await;

    let mut summary = tokio::time::interval(Duration::from_secs(30));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                println!("[status] {current}");
            }
            _ = summary.tick() => print_summary(&service),
            _ = &mut ctrl_c => break,
        }
    }

    print_summary(&service);
    messages.unsubscribe();
    notifications.unsubscribe();
    service.disconnect().await;
    Ok(())
}

/// Connect as `role`, send one chat message and wait for its echo.
pub async fn send(
    config: &CliConfig,
    role: Role,
    subject: Option<String>,
    conversation_id: &str,
    content: &str,
    wait: Duration,
) -> Result<()> {
    let tokens = Arc::new(open_tokens(config)?);
    let subject = subject_for(&tokens, role, subject)?;
    let service = service(config, tokens)?;

    let (echo_tx, mut echo_rx) = mpsc::unbounded_channel();
    let is_echo = echo_of(SessionIdentity::new(subject.clone(), role), conversation_id, content);
    let echoes = service.subscribe_to_messages(move |message| {
        if is_echo(message) {
            let _ = echo_tx.send(message.id.clone());
        }
    });

    service.set_identity(subject, role).await;

    let mut status = service.watch_status();
    tokio::time::timeout(
        wait,
        status.wait_for(|s| *s == ConnectionStatus::Connected),
    )
    .await
    .context("timed out connecting")?
    .context("connection closed")?;

    service.send_chat_message(conversation_id, content)?;

    match tokio::time::timeout(wait, echo_rx.recv()).await {
        Ok(Some(id)) => println!("sent message {id}"),
        _ => {
            tracing::warn!("No echo received; the message was queued but not confirmed");
            println!("queued");
        }
    }

    echoes.unsubscribe();
    service.disconnect().await;
    Ok(())
}

/// Store a session for `role`.
pub fn token_set(config: &CliConfig, role: Role, subject: String, token: String) -> Result<()> {
    if token.trim().is_empty() {
        bail!("token must not be empty");
    }
    let tokens = open_tokens(config)?;
    tokens.store(
        role,
        StoredSession {
            subject_id: subject,
            access_token: token,
        },
    )?;
    println!("stored {role} session in {}", tokens.path().display());
    Ok(())
}

/// Remove the session for `role`.
pub fn token_clear(config: &CliConfig, role: Role) -> Result<()> {
    let tokens = open_tokens(config)?;
    if tokens.remove(role)? {
        println!("removed {role} session");
    } else {
        println!("no {role} session stored");
    }
    Ok(())
}

/// List stored sessions without revealing tokens.
pub fn token_show(config: &CliConfig) -> Result<()> {
    let tokens = open_tokens(config)?;
    println!("credentials: {}", tokens.path().display());
    for role in Role::all() {
        match tokens.session(role) {
            Some(session) => println!(
                "  {role}: subject={} token={}",
                session.subject_id,
                redact(&session.access_token)
            ),
            None => println!("  {role}: -"),
        }
    }
    Ok(())
}

/// Print the effective configuration.
pub fn show_config(config: &CliConfig) -> Result<()> {
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}

fn redact(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    format!("{visible}…({} chars)", token.chars().count())
}
