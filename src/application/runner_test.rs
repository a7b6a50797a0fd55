use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use serde_json::Value;
use test_utils::events_fixture;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use super::response_timeout;
use super::run_chat;
use super::run_replay;
use super::ChatTurn;
use crate::domain::models::Backend;
use crate::domain::models::BackendName;
use crate::domain::models::ContextRef;
use crate::domain::models::Event;
use crate::domain::models::InboundEvent;
use crate::domain::models::NotificationLevel;
use crate::domain::models::CANCEL_COMMAND;
use crate::domain::models::SEND_COMMAND;
use crate::infrastructure::backends::replay::Replay;

fn recording(contents: &str) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    return Ok(file);
}

fn turn(response_timeout: Option<chrono::Duration>) -> ChatTurn {
    return ChatTurn {
        session_id: "s1".to_string(),
        prompt: "Explain the chain rule".to_string(),
        context_refs: vec![ContextRef::new("note-1", "note", "h1")],
        assistant_message_id: "m-assistant".to_string(),
        response_timeout,
    };
}

/// Accepts commands but never streams anything back.
#[derive(Default)]
struct SilentBackend {
    fail_sends: bool,
    commands: Mutex<Vec<String>>,
}

impl SilentBackend {
    fn commands(&self) -> Vec<String> {
        return self.commands.lock().unwrap().clone();
    }
}

#[async_trait]
impl Backend for SilentBackend {
    fn name(&self) -> BackendName {
        return BackendName::Bridge;
    }

    async fn health_check(&self) -> Result<()> {
        return Ok(());
    }

    async fn invoke(&self, command: &str, _args: Value) -> Result<Value> {
        self.commands.lock().unwrap().push(command.to_string());
        if self.fail_sends && command == SEND_COMMAND {
            bail!("bridge refused the request");
        }

        return Ok(json!({}));
    }

    async fn listen<'a>(
        &self,
        _tx: &'a mpsc::UnboundedSender<Event>,
        ready: oneshot::Sender<()>,
    ) -> Result<()> {
        ready.send(()).unwrap();
        futures::future::pending::<()>().await;
        return Ok(());
    }
}

/// Streams the recorded turn in response to a send, but only to subscribers
/// that connected before it. Subscribing takes a while.
#[derive(Default)]
struct LiveBackend {
    subscriber: Mutex<Option<mpsc::UnboundedSender<Event>>>,
}

#[async_trait]
impl Backend for LiveBackend {
    fn name(&self) -> BackendName {
        return BackendName::Bridge;
    }

    async fn health_check(&self) -> Result<()> {
        return Ok(());
    }

    async fn invoke(&self, command: &str, _args: Value) -> Result<Value> {
        if command != SEND_COMMAND {
            return Ok(json!({}));
        }

        if let Some(tx) = self.subscriber.lock().unwrap().as_ref() {
            for line in events_fixture().lines() {
                if let Ok(event) = InboundEvent::decode(line) {
                    tx.send(Event::Inbound(event))?;
                }
            }
        }
        return Ok(json!({}));
    }

    async fn listen<'a>(
        &self,
        tx: &'a mpsc::UnboundedSender<Event>,
        ready: oneshot::Sender<()>,
    ) -> Result<()> {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        *self.subscriber.lock().unwrap() = Some(tx.clone());
        ready.send(()).unwrap();
        futures::future::pending::<()>().await;
        return Ok(());
    }
}

#[tokio::test]
async fn it_replays_recordings() -> Result<()> {
    let file = recording(events_fixture())?;
    let backend = Arc::new(Replay::new(&file.path().to_string_lossy()));

    let store = run_replay(backend.clone()).await?;

    assert!(backend.commands().is_empty());
    assert!(store.can_send());
    insta::assert_snapshot!(store.transcript(), @r###"
    assistant:
    [thinking] Recall the chain rule.
    [tool_call notes_search: success]
    [memory_retrieval: success]
    The derivative of sin(x^2) is 2x cos(x^2).
    "###);
    return Ok(());
}

#[tokio::test]
async fn it_runs_a_chat_turn() -> Result<()> {
    let file = recording(events_fixture())?;
    let backend = Arc::new(Replay::new(&file.path().to_string_lossy()));

    let store = run_chat(backend.clone(), turn(None)).await?;

    assert_eq!(backend.commands(), vec![SEND_COMMAND]);
    assert_eq!(
        store.messages()[0].context_refs,
        vec![ContextRef::new("note-1", "note", "h1")]
    );
    assert!(store.pending_context_refs().is_empty());
    assert!(store.message("m-assistant").unwrap().is_finalized());
    insta::assert_snapshot!(store.transcript(), @r###"
    user:
    Explain the chain rule

    assistant:
    [thinking] Recall the chain rule.
    [tool_call notes_search: success]
    [memory_retrieval: success]
    The derivative of sin(x^2) is 2x cos(x^2).
    "###);
    return Ok(());
}

#[tokio::test]
async fn it_subscribes_before_sending() -> Result<()> {
    let backend = Arc::new(LiveBackend::default());

    let store = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        run_chat(backend, turn(None)),
    )
    .await??;

    assert!(store.message("m-assistant").unwrap().is_finalized());
    assert!(store.notifications().is_empty());
    assert_eq!(
        store.message_content("m-assistant").unwrap(),
        "[thinking] Recall the chain rule.\n[tool_call notes_search: success]\n[memory_retrieval: success]\nThe derivative of sin(x^2) is 2x cos(x^2)."
    );
    return Ok(());
}

#[tokio::test]
async fn it_follows_the_message_id_the_backend_streams() -> Result<()> {
    let file = recording(events_fixture())?;
    let backend = Arc::new(Replay::new(&file.path().to_string_lossy()));
    let mut chat_turn = turn(None);
    chat_turn.assistant_message_id = "msg-local".to_string();

    let store = run_chat(backend, chat_turn).await?;

    assert!(store.notifications().is_empty());
    assert!(store.message("m-assistant").unwrap().is_finalized());
    assert!(store.message("msg-local").is_none());
    assert!(store.can_send());
    return Ok(());
}

#[tokio::test]
async fn it_fails_turns_when_the_stream_ends_early() -> Result<()> {
    let file = recording(
        r#"{"kind":"stream_start","messageId":"m-assistant"}
{"kind":"block","type":"text","phase":"start","messageId":"m-assistant","blockId":"b1"}
{"kind":"block","type":"text","phase":"chunk","blockId":"b1","chunk":"Partial"}
"#,
    )?;
    let backend = Arc::new(Replay::new(&file.path().to_string_lossy()));

    let store = run_chat(backend, turn(None)).await?;

    assert!(store.message("m-assistant").unwrap().is_finalized());
    assert_eq!(
        store.message_content("m-assistant").unwrap(),
        "Partial\n[error: The event stream ended before the response completed]\n"
    );
    assert_eq!(store.notifications()[0].level, NotificationLevel::Error);
    return Ok(());
}

#[tokio::test]
async fn it_times_out_and_cancels_silent_streams() -> Result<()> {
    let backend = Arc::new(SilentBackend::default());

    let mut store = run_chat(
        backend.clone(),
        turn(Some(chrono::Duration::milliseconds(50))),
    )
    .await?;

    let notifications = store.take_notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].level, NotificationLevel::Warning);
    assert_eq!(
        notifications[0].text,
        "Response timed out, 0 block(s) cancelled"
    );
    assert!(backend.commands().contains(&CANCEL_COMMAND.to_string()));
    assert!(store.can_send());
    return Ok(());
}

#[tokio::test]
async fn it_reports_failed_sends() -> Result<()> {
    let backend = Arc::new(SilentBackend {
        fail_sends: true,
        ..SilentBackend::default()
    });

    let store = run_chat(backend, turn(None)).await?;

    assert_eq!(store.notifications().len(), 1);
    assert_eq!(
        store.notifications()[0].text,
        "The backend failed with the following error: bridge refused the request"
    );
    assert!(store.can_send());
    return Ok(());
}

#[test]
fn it_parses_response_timeouts() -> Result<()> {
    assert_eq!(response_timeout("0")?, None);
    assert_eq!(response_timeout("30")?, Some(chrono::Duration::seconds(30)));

    let err = response_timeout("99999999999999999").unwrap_err();
    assert!(err.to_string().starts_with("Invalid response-timeout-secs"));
    assert!(response_timeout("-5").is_err());
    return Ok(());
}
