#[cfg(test)]
#[path = "actions_test.rs"]
mod tests;

use anyhow::Result;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::models::Action;
use crate::domain::models::BackendBox;
use crate::domain::models::Event;
use crate::domain::models::SendRequest;
use crate::domain::models::CANCEL_COMMAND;
use crate::domain::models::SEND_COMMAND;

async fn send_message(
    backend: BackendBox,
    request: SendRequest,
    tx: mpsc::UnboundedSender<Event>,
) -> Result<()> {
    let message_id = request.assistant_message_id.to_string();
    let res = backend.invoke(SEND_COMMAND, serde_json::to_value(request)?).await;

    if let Err(err) = res {
        tracing::warn!(message_id = message_id.as_str(), error = %err, "Send failed");
        tx.send(Event::BackendFailure(
            Some(message_id),
            format!("The backend failed with the following error: {err}"),
        ))?;
    }

    return Ok(());
}

async fn abort_stream(
    backend: &BackendBox,
    tx: &mpsc::UnboundedSender<Event>,
    session_id: &str,
    message_id: &str,
) -> Result<()> {
    let args = json!({ "sessionId": session_id, "messageId": message_id });
    if let Err(err) = backend.invoke(CANCEL_COMMAND, args).await {
        tx.send(Event::BackendFailure(
            None,
            format!("Failed to cancel the stream: {err}"),
        ))?;
    }

    return Ok(());
}

pub struct ActionsService {}

impl ActionsService {
    /// Runs outbound actions against the backend until the action channel
    /// closes. Backend failures come back as events rather than errors.
    pub async fn start(
        backend: BackendBox,
        tx: mpsc::UnboundedSender<Event>,
        rx: &mut mpsc::UnboundedReceiver<Action>,
    ) -> Result<()> {
        let mut workers: Vec<JoinHandle<Result<()>>> = vec![];

        while let Some(action) = rx.recv().await {
            match action {
                Action::SendMessage(request) => {
                    tracing::debug!(
                        message_id = request.assistant_message_id.as_str(),
                        tools = request.enabled_tools.len(),
                        "Sending message"
                    );
                    workers.push(tokio::spawn(send_message(
                        backend.clone(),
                        request,
                        tx.clone(),
                    )));
                }
                Action::AbortStream(session_id, message_id) => {
                    // The in-flight send keeps running; the backend decides
                    // when the stream actually stops.
                    abort_stream(&backend, &tx, &session_id, &message_id).await?;
                }
                Action::Invoke(command, args) => {
                    if let Err(err) = backend.invoke(&command, args).await {
                        tx.send(Event::BackendFailure(
                            None,
                            format!("{command} failed: {err}"),
                        ))?;
                    }
                }
            }

            workers.retain(|worker| return !worker.is_finished());
        }

        for worker in workers {
            worker.await??;
        }

        return Ok(());
    }
}
