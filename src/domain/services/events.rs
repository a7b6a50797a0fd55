#[cfg(test)]
#[path = "events_test.rs"]
mod tests;

use anyhow::bail;
use anyhow::Result;
use tokio::sync::mpsc;

use super::BlockStart;
use super::ChatStore;
use super::EventRegistry;
use crate::domain::models::BlockEvent;
use crate::domain::models::BlockPhase;
use crate::domain::models::BlockStatus;
use crate::domain::models::ChatResult;
use crate::domain::models::Event;
use crate::domain::models::InboundEvent;
use crate::domain::models::NotificationLevel;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied,
    Dropped,
}

fn outcome(res: ChatResult<()>, event_type: &str) -> DispatchOutcome {
    if let Err(err) = res {
        tracing::warn!(event_type = event_type, error = %err, "Dropped event");
        return DispatchOutcome::Dropped;
    }

    return DispatchOutcome::Applied;
}

fn owned_by(store: &ChatStore, block_id: &str, event_type: &str) -> bool {
    return match store.block(block_id) {
        Some(block) if block.event_type() != event_type => {
            tracing::warn!(
                block_id = block_id,
                event_type = event_type,
                owner = block.event_type(),
                "Dropped event for a block of another type"
            );
            false
        }
        _ => true,
    };
}

fn apply_block(store: &mut ChatStore, registry: &EventRegistry, event: BlockEvent) -> DispatchOutcome {
    let handler = match registry.get(&event.event_type) {
        Ok(handler) => handler,
        Err(err) => {
            tracing::warn!(event_type = event.event_type.as_str(), error = %err, "Dropped event");
            return DispatchOutcome::Dropped;
        }
    };

    let event_type = event.event_type.as_str();
    let res = match event.phase {
        BlockPhase::Start {
            message_id,
            block_id,
            payload,
        } => {
            let start = BlockStart {
                block_id: block_id.as_deref(),
                payload: &payload,
            };
            handler
                .on_start(store, &message_id, &start)
                .and_then(|block_id| return store.set_block_event_type(&block_id, event_type))
        }
        BlockPhase::Chunk { block_id, chunk } => {
            if !owned_by(store, &block_id, event_type) {
                return DispatchOutcome::Dropped;
            }
            handler.on_chunk(store, &block_id, &chunk)
        }
        BlockPhase::End { block_id, result } => {
            if !owned_by(store, &block_id, event_type) {
                return DispatchOutcome::Dropped;
            }
            handler.on_end(store, &block_id, result.as_ref())
        }
        BlockPhase::Error { block_id, error } => {
            if !owned_by(store, &block_id, event_type) {
                return DispatchOutcome::Dropped;
            }
            handler.on_error(store, &block_id, &error)
        }
    };

    return outcome(res, event_type);
}

fn complete_message(store: &mut ChatStore, message_id: &str) -> ChatResult<()> {
    let lingering = store
        .message_blocks(message_id)
        .iter()
        .filter(|block| return !block.status().is_terminal())
        .map(|block| return block.id.to_string())
        .collect::<Vec<String>>();

    for block_id in lingering.iter() {
        tracing::debug!(block_id = block_id.as_str(), "Settling block left open at stream end");
        store.update_block_status(block_id, BlockStatus::Success)?;
    }

    return store.finalize_message(message_id);
}

/// Receives events from the backend side of the channel and folds them into a
/// chat store.
pub struct EventsService {
    events: mpsc::UnboundedReceiver<Event>,
    registry: EventRegistry,
}

impl EventsService {
    pub fn new(events: mpsc::UnboundedReceiver<Event>, registry: EventRegistry) -> EventsService {
        return EventsService { events, registry };
    }

    pub fn registry(&self) -> &EventRegistry {
        return &self.registry;
    }

    pub async fn next(&mut self) -> Result<Event> {
        return match self.events.recv().await {
            Some(event) => Ok(event),
            None => bail!("Event channel closed"),
        };
    }

    /// Applies one inbound event. Unregistered types and events the store
    /// cannot place are dropped with a warning; nothing here fails.
    pub fn apply(
        store: &mut ChatStore,
        registry: &EventRegistry,
        event: InboundEvent,
    ) -> DispatchOutcome {
        return match event {
            InboundEvent::Block(block_event) => apply_block(store, registry, block_event),
            InboundEvent::StreamStart { message_id } => outcome(
                store
                    .begin_assistant_message(Some(&message_id))
                    .map(|_| return ()),
                "stream_start",
            ),
            InboundEvent::StreamComplete { message_id } => {
                outcome(complete_message(store, &message_id), "stream_complete")
            }
            InboundEvent::StreamError { message_id, error } => {
                outcome(store.fail_message(&message_id, &error), "stream_error")
            }
            InboundEvent::StreamCancelled { message_id } => {
                if store.streaming_message_id() != Some(message_id.as_str()) {
                    tracing::warn!(message_id = message_id.as_str(), "Cancelled a stream that is not active");
                    return DispatchOutcome::Dropped;
                }
                store.abort_stream("Stream cancelled");
                DispatchOutcome::Applied
            }
        };
    }

    /// Applies any event from the channel, including local failures and
    /// timeouts raised by callers.
    pub fn handle(&self, store: &mut ChatStore, event: Event) -> DispatchOutcome {
        match event {
            Event::Inbound(inbound) => {
                return EventsService::apply(store, &self.registry, inbound);
            }
            Event::BackendFailure(Some(message_id), error) => {
                let res = store.fail_message(&message_id, &error);
                if res.is_err() {
                    store.push_notification(NotificationLevel::Error, &error);
                }
                return outcome(res, "backend_failure");
            }
            Event::BackendFailure(None, error) => {
                store.push_notification(NotificationLevel::Error, &error);
                return DispatchOutcome::Applied;
            }
            Event::Timeout() => {
                let aborted = store.abort_stream("Response timed out");
                store.push_notification(
                    NotificationLevel::Warning,
                    &format!("Response timed out, {} block(s) cancelled", aborted.len()),
                );
                return DispatchOutcome::Applied;
            }
        }
    }
}
