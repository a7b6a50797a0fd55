#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Result;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task;
use tokio_util::sync::CancellationToken;
use yansi::Paint;

use super::cli::RunMode;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::create_id;
use crate::domain::models::Action;
use crate::domain::models::BackendBox;
use crate::domain::models::BackendName;
use crate::domain::models::ContextRef;
use crate::domain::models::Event;
use crate::domain::models::InboundEvent;
use crate::domain::models::Notification;
use crate::domain::models::NotificationLevel;
use crate::domain::models::SendRequest;
use crate::domain::services::actions::ActionsService;
use crate::domain::services::events::EventsService;
use crate::domain::services::run_countdown;
use crate::domain::services::ChatStore;
use crate::domain::services::Countdown;
use crate::domain::services::EventRegistry;
use crate::domain::services::SystemClock;
use crate::infrastructure::backends::replay::Replay;
use crate::infrastructure::backends::BackendManager;

const COUNTDOWN_INTERVAL: Duration = Duration::from_millis(250);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn session_id() -> String {
    let session_id = Config::get(ConfigKey::SessionID);
    if session_id.is_empty() {
        return create_id("session");
    }

    return session_id;
}

/// One user prompt and the assistant response it should produce.
#[derive(Clone, Debug)]
pub struct ChatTurn {
    pub session_id: String,
    pub prompt: String,
    pub context_refs: Vec<ContextRef>,
    pub assistant_message_id: String,
    pub response_timeout: Option<chrono::Duration>,
}

/// Parses a timeout in whole seconds. Zero disables it.
fn response_timeout(secs: &str) -> Result<Option<chrono::Duration>> {
    let secs = secs
        .parse::<u64>()
        .map_err(|err| return anyhow!("Invalid {}: {err}", ConfigKey::ResponseTimeoutSecs))?;
    if secs == 0 {
        return Ok(None);
    }

    let timeout = chrono::Duration::from_std(Duration::from_secs(secs))
        .map_err(|err| return anyhow!("Invalid {}: {err}", ConfigKey::ResponseTimeoutSecs))?;
    return Ok(Some(timeout));
}

impl ChatTurn {
    pub fn new(prompt: &str, context_refs: Vec<ContextRef>) -> Result<ChatTurn> {
        return Ok(ChatTurn {
            session_id: session_id(),
            prompt: prompt.to_string(),
            context_refs,
            assistant_message_id: create_id("msg"),
            response_timeout: response_timeout(&Config::get(ConfigKey::ResponseTimeoutSecs))?,
        });
    }
}

fn spawn_countdown(
    background: &mut task::JoinSet<Result<()>>,
    timeout: chrono::Duration,
    cancel: CancellationToken,
    event_tx: mpsc::UnboundedSender<Event>,
    action_tx: mpsc::UnboundedSender<Action>,
    turn: &ChatTurn,
) {
    let session_id = turn.session_id.to_string();
    let message_id = turn.assistant_message_id.to_string();

    background.spawn(async move {
        run_countdown(
            Countdown::new(timeout),
            Arc::new(SystemClock::default()),
            COUNTDOWN_INTERVAL,
            cancel,
            move || {
                if let Err(err) = event_tx.send(Event::Timeout()) {
                    tracing::warn!(error = %err, "Failed to report timeout");
                }
                if let Err(err) = action_tx.send(Action::AbortStream(session_id, message_id)) {
                    tracing::warn!(error = %err, "Failed to request stream cancellation");
                }
            },
        )
        .await;

        return Ok(());
    });
}

/// Sends one prompt and folds the streamed response into a fresh store.
/// Returns once the assistant message settles, the turn times out, or the
/// event stream ends. The first stream to start is taken as the response,
/// even when the backend picked its own message id.
pub async fn run_chat(backend: BackendBox, turn: ChatTurn) -> Result<ChatStore> {
    backend.health_check().await?;

    let mut store = ChatStore::new(&turn.session_id);
    for context_ref in turn.context_refs.iter() {
        store.add_context_ref(context_ref.clone())?;
    }
    let enabled_tools = store.enabled_tools();
    let user_message_id = store.add_user_message(&turn.prompt)?;
    let context_refs = store
        .message(&user_message_id)
        .map(|message| return message.context_refs.clone())
        .unwrap_or_default();

    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();
    let mut events = EventsService::new(event_rx, EventRegistry::with_defaults());

    let listen_backend = backend.clone();
    let listen_tx = event_tx.clone();
    let (ready_tx, ready_rx) = oneshot::channel::<()>();
    let mut listener = tokio::spawn(async move {
        return listen_backend.listen(&listen_tx, ready_tx).await;
    });

    // Anything streamed before the subscription is live would be lost.
    if ready_rx.await.is_err() {
        listener.await??;
        bail!("The event stream closed before it was ready");
    }

    let mut background = task::JoinSet::new();
    let actions_tx = event_tx.clone();
    background.spawn(async move {
        return ActionsService::start(backend, actions_tx, &mut action_rx).await;
    });

    let cancel = CancellationToken::new();
    if let Some(timeout) = turn.response_timeout {
        spawn_countdown(
            &mut background,
            timeout,
            cancel.clone(),
            event_tx.clone(),
            action_tx.clone(),
            &turn,
        );
    }

    action_tx.send(Action::SendMessage(SendRequest {
        session_id: turn.session_id.to_string(),
        user_message_id,
        assistant_message_id: turn.assistant_message_id.to_string(),
        content: turn.prompt.to_string(),
        context_refs,
        enabled_tools,
    }))?;

    let mut response_id = turn.assistant_message_id.to_string();
    let mut response_started = false;
    loop {
        tokio::select! {
            biased;
            event = events.next() => {
                let event = event?;
                let finished = match &event {
                    Event::Timeout() => true,
                    Event::BackendFailure(Some(message_id), _) => {
                        *message_id == turn.assistant_message_id
                    }
                    Event::Inbound(InboundEvent::StreamStart { message_id }) if !response_started => {
                        if *message_id != response_id {
                            tracing::debug!(
                                requested = response_id.as_str(),
                                streamed = message_id.as_str(),
                                "Backend answered under its own message id"
                            );
                            response_id = message_id.to_string();
                        }
                        response_started = true;
                        false
                    }
                    _ => false,
                };

                events.handle(&mut store, event);
                let settled = store
                    .message(&response_id)
                    .map(|message| return message.is_finalized())
                    .unwrap_or(false);

                if finished || settled {
                    break;
                }
            }
            res = &mut listener => {
                res??;
                tracing::warn!("Event stream ended before the response completed");
                events.handle(
                    &mut store,
                    Event::BackendFailure(
                        Some(response_id.to_string()),
                        "The event stream ended before the response completed".to_string(),
                    ),
                );
                break;
            }
        }
    }

    listener.abort();
    cancel.cancel();
    drop(action_tx);

    let drain = async {
        while let Some(res) = background.join_next().await {
            res??;
        }
        return Ok::<(), anyhow::Error>(());
    };
    match tokio::time::timeout(SHUTDOWN_GRACE, drain).await {
        Ok(res) => res?,
        Err(_) => tracing::warn!("Background tasks did not stop in time"),
    }

    return Ok(store);
}

/// Feeds a backend's recorded event stream through the pipeline with nothing
/// sent.
pub async fn run_replay(backend: BackendBox) -> Result<ChatStore> {
    backend.health_check().await?;

    let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();
    let (ready_tx, _ready_rx) = oneshot::channel::<()>();
    let mut events = EventsService::new(event_rx, EventRegistry::with_defaults());
    backend.listen(&event_tx, ready_tx).await?;
    drop(event_tx);

    let mut store = ChatStore::new(&session_id());
    while let Ok(event) = events.next().await {
        events.handle(&mut store, event);
    }

    return Ok(store);
}

fn notification_line(notification: &Notification) -> String {
    return format!("[{}] {}", notification.level, notification.text);
}

fn print_report(store: &mut ChatStore) {
    println!("{}", store.transcript());

    for notification in store.take_notifications() {
        let line = notification_line(&notification);
        match notification.level {
            NotificationLevel::Info => eprintln!("{}", Paint::blue(line)),
            NotificationLevel::Warning => eprintln!("{}", Paint::yellow(line)),
            NotificationLevel::Error => eprintln!("{}", Paint::red(line)),
        }
    }
}

pub async fn start(mode: RunMode) -> Result<()> {
    let mut store = match mode {
        RunMode::Chat {
            prompt,
            context_refs,
        } => {
            let backend_name = BackendName::parse(Config::get(ConfigKey::Backend))
                .ok_or_else(|| return anyhow!("Unknown backend {}", Config::get(ConfigKey::Backend)))?;
            let backend = BackendManager::get(backend_name)?;
            run_chat(backend, ChatTurn::new(&prompt, context_refs)?).await?
        }
        RunMode::Replay { events_file } => run_replay(Arc::new(Replay::new(&events_file))).await?,
    };

    print_report(&mut store);
    return Ok(());
}
