#[cfg(test)]
#[path = "event_registry_test.rs"]
mod tests;

use std::collections::HashMap;

use serde_json::Value;
use snafu::OptionExt;
use strum::IntoEnumIterator;

use super::ChatStore;
use crate::domain::models::error::UnregisteredEventTypeSnafu;
use crate::domain::models::BlockStatus;
use crate::domain::models::BlockType;
use crate::domain::models::ChatResult;

/// What a start event carries besides the owning message.
pub struct BlockStart<'a> {
    pub block_id: Option<&'a str>,
    pub payload: &'a Value,
}

/// Block lifecycle callbacks for one event type.
///
/// Every operation has a default, so a handler only overrides the phases it
/// cares about. Handlers mutate the store and nothing else. A malformed
/// payload must land as a block in `Error` status, not as a returned error;
/// returned errors are reserved for events the store cannot place at all.
pub trait EventHandler: Send + Sync {
    fn block_type(&self) -> BlockType;

    fn on_start(
        &self,
        store: &mut ChatStore,
        message_id: &str,
        start: &BlockStart,
    ) -> ChatResult<String> {
        return store.create_block(message_id, self.block_type(), start.block_id);
    }

    fn on_chunk(&self, store: &mut ChatStore, block_id: &str, chunk: &str) -> ChatResult<()> {
        return store.update_block_content(block_id, chunk);
    }

    fn on_end(&self, store: &mut ChatStore, block_id: &str, result: Option<&Value>) -> ChatResult<()> {
        return match result {
            Some(result) => store.set_block_result(block_id, result.clone()),
            None => store.update_block_status(block_id, BlockStatus::Success),
        };
    }

    fn on_error(&self, store: &mut ChatStore, block_id: &str, message: &str) -> ChatResult<()> {
        return store.set_block_error(block_id, message);
    }
}

/// Text and thinking blocks: plain streamed content.
pub struct StreamingTextHandler {
    block_type: BlockType,
}

impl StreamingTextHandler {
    pub fn new(block_type: BlockType) -> StreamingTextHandler {
        return StreamingTextHandler { block_type };
    }
}

impl EventHandler for StreamingTextHandler {
    fn block_type(&self) -> BlockType {
        return self.block_type;
    }
}

pub struct ToolCallHandler {}

impl EventHandler for ToolCallHandler {
    fn block_type(&self) -> BlockType {
        return BlockType::ToolCall;
    }

    fn on_start(
        &self,
        store: &mut ChatStore,
        message_id: &str,
        start: &BlockStart,
    ) -> ChatResult<String> {
        let block_id = store.create_block(message_id, self.block_type(), start.block_id)?;
        let tool_name = start
            .payload
            .get("toolName")
            .and_then(|name| return name.as_str())
            .filter(|name| return !name.trim().is_empty());

        match tool_name {
            Some(tool_name) => store.set_block_tool_name(&block_id, tool_name)?,
            None => {
                tracing::warn!(block_id = block_id.as_str(), payload = %start.payload, "Tool call without a tool name");
                store.set_block_error(&block_id, "Malformed tool_call payload: missing toolName")?;
            }
        }

        return Ok(block_id);
    }
}

pub struct ImageGenHandler {}

impl EventHandler for ImageGenHandler {
    fn block_type(&self) -> BlockType {
        return BlockType::ImageGen;
    }

    fn on_end(&self, store: &mut ChatStore, block_id: &str, result: Option<&Value>) -> ChatResult<()> {
        let valid = result
            .map(|result| {
                let has_url = result.get("url").and_then(|url| return url.as_str()).is_some();
                let has_images = result
                    .get("images")
                    .and_then(|images| return images.as_array())
                    .map(|images| return !images.is_empty())
                    .unwrap_or(false);
                return has_url || has_images;
            })
            .unwrap_or(false);

        return finish(
            store,
            block_id,
            result,
            valid,
            "Malformed image_gen result: expected url or images",
        );
    }
}

/// Memory, RAG and web search lookups. Each must end with an array of hits
/// under its own field.
pub struct RetrievalHandler {
    block_type: BlockType,
    field: &'static str,
}

impl RetrievalHandler {
    pub fn new(block_type: BlockType, field: &'static str) -> RetrievalHandler {
        return RetrievalHandler { block_type, field };
    }
}

impl EventHandler for RetrievalHandler {
    fn block_type(&self) -> BlockType {
        return self.block_type;
    }

    fn on_end(&self, store: &mut ChatStore, block_id: &str, result: Option<&Value>) -> ChatResult<()> {
        let valid = result
            .and_then(|result| return result.get(self.field))
            .map(|hits| return hits.is_array())
            .unwrap_or(false);

        return finish(
            store,
            block_id,
            result,
            valid,
            &format!(
                "Malformed {} result: expected a '{}' array",
                self.block_type, self.field
            ),
        );
    }
}

fn finish(
    store: &mut ChatStore,
    block_id: &str,
    result: Option<&Value>,
    valid: bool,
    error: &str,
) -> ChatResult<()> {
    if !valid {
        tracing::warn!(block_id = block_id, error = error, "Rejected block result");
        return store.set_block_error(block_id, error);
    }

    return match result {
        Some(result) => store.set_block_result(block_id, result.clone()),
        None => store.update_block_status(block_id, BlockStatus::Success),
    };
}

/// Dispatch table from event type to block lifecycle handler.
pub struct EventRegistry {
    handlers: HashMap<String, Box<dyn EventHandler>>,
}

impl Default for EventRegistry {
    fn default() -> EventRegistry {
        return EventRegistry::with_defaults();
    }
}

impl EventRegistry {
    pub fn empty() -> EventRegistry {
        return EventRegistry {
            handlers: HashMap::new(),
        };
    }

    /// A registry with a handler for every built-in block type.
    pub fn with_defaults() -> EventRegistry {
        let mut registry = EventRegistry::empty();
        for block_type in BlockType::iter() {
            let handler: Box<dyn EventHandler> = match block_type {
                BlockType::Text | BlockType::Thinking => {
                    Box::new(StreamingTextHandler::new(block_type))
                }
                BlockType::ToolCall => Box::new(ToolCallHandler {}),
                BlockType::ImageGen => Box::new(ImageGenHandler {}),
                BlockType::MemoryRetrieval => {
                    Box::new(RetrievalHandler::new(block_type, "memories"))
                }
                BlockType::RagRetrieval => Box::new(RetrievalHandler::new(block_type, "chunks")),
                BlockType::WebSearch => Box::new(RetrievalHandler::new(block_type, "results")),
            };

            registry.register(&block_type.to_string(), handler);
        }

        return registry;
    }

    /// Registers a handler, replacing any previous one for the type.
    pub fn register(&mut self, event_type: &str, handler: Box<dyn EventHandler>) {
        self.handlers.insert(event_type.to_string(), handler);
    }

    pub fn get(&self, event_type: &str) -> ChatResult<&dyn EventHandler> {
        return self
            .handlers
            .get(event_type)
            .map(|handler| return handler.as_ref())
            .context(UnregisteredEventTypeSnafu { event_type });
    }

    pub fn event_types(&self) -> Vec<String> {
        let mut types = self.handlers.keys().cloned().collect::<Vec<String>>();
        types.sort();
        return types;
    }
}
