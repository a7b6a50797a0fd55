#[cfg(test)]
#[path = "chat_store_test.rs"]
mod tests;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;

use serde_json::Value;
use snafu::OptionExt;

use super::ContextTypeRegistry;
use crate::domain::models::create_id;
use crate::domain::models::error::BlockLockedSnafu;
use crate::domain::models::error::BlockNotFoundSnafu;
use crate::domain::models::error::DuplicateBlockSnafu;
use crate::domain::models::error::MessageFinalizedSnafu;
use crate::domain::models::error::MessageLockedSnafu;
use crate::domain::models::error::MessageNotFoundSnafu;
use crate::domain::models::error::SessionClosedSnafu;
use crate::domain::models::error::StreamInProgressSnafu;
use crate::domain::models::Block;
use crate::domain::models::BlockStatus;
use crate::domain::models::BlockType;
use crate::domain::models::ChatResult;
use crate::domain::models::ContextRef;
use crate::domain::models::Message;
use crate::domain::models::MessageRole;
use crate::domain::models::Notification;
use crate::domain::models::NotificationLevel;

/// Single source of truth for one session's conversation.
///
/// Every mutation goes through a guarded method taking `&mut self`, so
/// updates are serialized by whoever owns the store. Nothing in here talks to
/// the backend.
pub struct ChatStore {
    session_id: String,
    closed: bool,
    messages: Vec<Message>,
    blocks: HashMap<String, Block>,
    active_blocks: HashSet<String>,
    pending_context_refs: Vec<ContextRef>,
    panels: BTreeMap<String, bool>,
    streaming_message_id: Option<String>,
    notifications: Vec<Notification>,
    context_types: ContextTypeRegistry,
}

impl ChatStore {
    pub fn new(session_id: &str) -> ChatStore {
        return ChatStore::with_context_types(session_id, ContextTypeRegistry::default());
    }

    pub fn with_context_types(session_id: &str, context_types: ContextTypeRegistry) -> ChatStore {
        return ChatStore {
            session_id: session_id.to_string(),
            closed: false,
            messages: vec![],
            blocks: HashMap::new(),
            active_blocks: HashSet::new(),
            pending_context_refs: vec![],
            panels: BTreeMap::new(),
            streaming_message_id: None,
            notifications: vec![],
            context_types,
        };
    }

    pub fn session_id(&self) -> &str {
        return &self.session_id;
    }

    pub fn is_closed(&self) -> bool {
        return self.closed;
    }

    pub fn messages(&self) -> &[Message] {
        return &self.messages;
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        return self.messages.iter().find(|msg| return msg.id == message_id);
    }

    pub fn block(&self, block_id: &str) -> Option<&Block> {
        return self.blocks.get(block_id);
    }

    pub fn message_blocks(&self, message_id: &str) -> Vec<&Block> {
        return match self.message(message_id) {
            Some(msg) => msg
                .block_ids
                .iter()
                .filter_map(|block_id| return self.blocks.get(block_id))
                .collect(),
            None => vec![],
        };
    }

    pub fn active_block_ids(&self) -> Vec<String> {
        let mut ids = self.active_blocks.iter().cloned().collect::<Vec<String>>();
        ids.sort();
        return ids;
    }

    pub fn streaming_message_id(&self) -> Option<&str> {
        return self.streaming_message_id.as_deref();
    }

    pub fn notifications(&self) -> &[Notification] {
        return &self.notifications;
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        return std::mem::take(&mut self.notifications);
    }

    pub fn push_notification(&mut self, level: NotificationLevel, text: &str) {
        self.notifications.push(Notification::new(level, text));
    }

    fn ensure_open(&self) -> ChatResult<()> {
        if self.closed {
            return SessionClosedSnafu {
                session_id: self.session_id.to_string(),
            }
            .fail();
        }

        return Ok(());
    }

    fn message_mut(&mut self, message_id: &str) -> ChatResult<&mut Message> {
        return self
            .messages
            .iter_mut()
            .find(|msg| return msg.id == message_id)
            .context(MessageNotFoundSnafu { message_id });
    }

    /// A block that may still change: it exists and has not finished.
    fn open_block_mut(&mut self, block_id: &str) -> ChatResult<&mut Block> {
        self.ensure_open()?;
        let block = self
            .blocks
            .get_mut(block_id)
            .context(BlockNotFoundSnafu { block_id })?;

        if block.status().is_terminal() {
            return BlockLockedSnafu {
                block_id,
                status: block.status().to_string(),
            }
            .fail();
        }

        return Ok(block);
    }

    /// Records the user's turn. Pending context refs move onto the message.
    pub fn add_user_message(&mut self, text: &str) -> ChatResult<String> {
        self.ensure_open()?;
        if let Some(streaming_id) = &self.streaming_message_id {
            return StreamInProgressSnafu {
                message_id: streaming_id.to_string(),
            }
            .fail();
        }

        let context_refs = std::mem::take(&mut self.pending_context_refs);
        return Ok(self.push_text_message(MessageRole::User, text, context_refs));
    }

    /// Opens the assistant message a response streams into. Opening the
    /// message that is already streaming is a no-op.
    pub fn begin_assistant_message(&mut self, message_id: Option<&str>) -> ChatResult<String> {
        self.ensure_open()?;
        if let Some(streaming_id) = &self.streaming_message_id {
            if message_id == Some(streaming_id.as_str()) {
                return Ok(streaming_id.to_string());
            }
            return StreamInProgressSnafu {
                message_id: streaming_id.to_string(),
            }
            .fail();
        }

        let message_id = message_id
            .map(|id| return id.to_string())
            .unwrap_or_else(|| return create_id("msg"));

        match self.message(&message_id).map(|msg| return msg.is_finalized()) {
            Some(true) => return MessageFinalizedSnafu { message_id }.fail(),
            Some(false) => (),
            None => self
                .messages
                .push(Message::new(&message_id, MessageRole::Assistant)),
        }

        self.streaming_message_id = Some(message_id.to_string());
        return Ok(message_id);
    }

    pub fn add_system_message(&mut self, text: &str) -> ChatResult<String> {
        self.ensure_open()?;
        return Ok(self.push_text_message(MessageRole::System, text, vec![]));
    }

    fn push_text_message(
        &mut self,
        role: MessageRole,
        text: &str,
        context_refs: Vec<ContextRef>,
    ) -> String {
        let mut message = Message::new(&create_id("msg"), role);
        message.context_refs = context_refs;

        let mut block = Block::new(&create_id("blk"), &message.id, BlockType::Text);
        block.append(text);
        block.set_status(BlockStatus::Success);

        message.block_ids.push(block.id.to_string());
        message.finalize();

        let message_id = message.id.to_string();
        self.blocks.insert(block.id.to_string(), block);
        self.messages.push(message);

        return message_id;
    }

    pub fn create_block(
        &mut self,
        message_id: &str,
        block_type: BlockType,
        block_id: Option<&str>,
    ) -> ChatResult<String> {
        self.ensure_open()?;
        let block_id = block_id
            .map(|id| return id.to_string())
            .unwrap_or_else(|| return create_id("blk"));

        if self.blocks.contains_key(&block_id) {
            return DuplicateBlockSnafu { block_id }.fail();
        }

        let message = self.message_mut(message_id)?;
        if message.is_finalized() {
            return MessageFinalizedSnafu { message_id }.fail();
        }
        message.block_ids.push(block_id.to_string());

        self.blocks.insert(
            block_id.to_string(),
            Block::new(&block_id, message_id, block_type),
        );
        self.active_blocks.insert(block_id.to_string());

        tracing::debug!(
            message_id = message_id,
            block_id = block_id.as_str(),
            block_type = %block_type,
            "Created block"
        );

        return Ok(block_id);
    }

    pub fn update_block_content(&mut self, block_id: &str, chunk: &str) -> ChatResult<()> {
        let block = self.open_block_mut(block_id)?;
        block.append(chunk);
        if block.status() == BlockStatus::Pending {
            block.set_status(BlockStatus::Streaming);
        }

        return Ok(());
    }

    pub fn update_block_status(&mut self, block_id: &str, status: BlockStatus) -> ChatResult<()> {
        let block = self.open_block_mut(block_id)?;
        block.set_status(status);
        if status.is_terminal() {
            self.active_blocks.remove(block_id);
        }

        return Ok(());
    }

    pub fn set_block_result(&mut self, block_id: &str, result: Value) -> ChatResult<()> {
        let block = self.open_block_mut(block_id)?;
        block.set_result(result);
        block.set_status(BlockStatus::Success);
        self.active_blocks.remove(block_id);

        return Ok(());
    }

    pub fn set_block_error(&mut self, block_id: &str, error: &str) -> ChatResult<()> {
        let block = self.open_block_mut(block_id)?;
        block.set_error(error);
        block.set_status(BlockStatus::Error);
        self.active_blocks.remove(block_id);

        tracing::debug!(block_id = block_id, error = error, "Block failed");
        return Ok(());
    }

    pub(crate) fn set_block_tool_name(&mut self, block_id: &str, tool_name: &str) -> ChatResult<()> {
        let block = self.open_block_mut(block_id)?;
        block.tool_name = Some(tool_name.to_string());
        return Ok(());
    }

    pub(crate) fn set_block_event_type(&mut self, block_id: &str, event_type: &str) -> ChatResult<()> {
        let block = self
            .blocks
            .get_mut(block_id)
            .context(BlockNotFoundSnafu { block_id })?;
        block.set_event_type(event_type);
        return Ok(());
    }

    /// Freezes a message once every block has finished.
    pub fn finalize_message(&mut self, message_id: &str) -> ChatResult<()> {
        self.ensure_open()?;
        if self.is_message_locked(message_id) {
            return MessageLockedSnafu { message_id }.fail();
        }

        self.message_mut(message_id)?.finalize();
        if self.streaming_message_id.as_deref() == Some(message_id) {
            self.streaming_message_id = None;
        }

        return Ok(());
    }

    fn fail_active_blocks(&mut self, message_id: Option<&str>, error: &str) -> Vec<String> {
        let block_ids = self
            .active_block_ids()
            .into_iter()
            .filter(|block_id| {
                return match message_id {
                    Some(message_id) => self
                        .blocks
                        .get(block_id)
                        .map(|block| return block.message_id == message_id)
                        .unwrap_or(false),
                    None => true,
                };
            })
            .collect::<Vec<String>>();

        for block_id in block_ids.iter() {
            if let Some(block) = self.blocks.get_mut(block_id) {
                block.set_error(error);
                block.set_status(BlockStatus::Error);
            }
            self.active_blocks.remove(block_id);
        }

        return block_ids;
    }

    /// Moves every active block to a terminal error and closes the streaming
    /// message. The backend call itself is left alone; the native side decides
    /// when it actually stops.
    pub fn abort_stream(&mut self, reason: &str) -> Vec<String> {
        if self.closed {
            return vec![];
        }

        let aborted = self.fail_active_blocks(None, reason);
        if let Some(message_id) = self.streaming_message_id.take() {
            if let Ok(message) = self.message_mut(&message_id) {
                message.finalize();
            }
        }

        tracing::debug!(blocks = aborted.len(), reason = reason, "Aborted stream");
        return aborted;
    }

    /// Surfaces a failed backend call on the message it belongs to.
    pub fn fail_message(&mut self, message_id: &str, error: &str) -> ChatResult<()> {
        self.ensure_open()?;
        let message = self.message_mut(message_id)?;
        let has_blocks = !message.block_ids.is_empty();
        if message.is_finalized() {
            self.push_notification(NotificationLevel::Error, error);
            return Ok(());
        }

        self.fail_active_blocks(Some(message_id), error);
        if !has_blocks {
            let block_id = self.create_block(message_id, BlockType::Text, None)?;
            self.set_block_error(&block_id, error)?;
        }

        self.message_mut(message_id)?.finalize();
        if self.streaming_message_id.as_deref() == Some(message_id) {
            self.streaming_message_id = None;
        }
        self.push_notification(NotificationLevel::Error, error);

        return Ok(());
    }

    pub fn can_send(&self) -> bool {
        return !self.closed && self.streaming_message_id.is_none() && self.active_blocks.is_empty();
    }

    pub fn can_edit(&self, message_id: &str) -> bool {
        return match self.message(message_id) {
            Some(msg) => {
                msg.role == MessageRole::User
                    && !self.is_message_locked(message_id)
                    && self.can_send()
            }
            None => false,
        };
    }

    pub fn is_block_locked(&self, block_id: &str) -> bool {
        return self
            .blocks
            .get(block_id)
            .map(|block| return !block.status().is_terminal())
            .unwrap_or(false);
    }

    pub fn is_message_locked(&self, message_id: &str) -> bool {
        return self
            .message_blocks(message_id)
            .iter()
            .any(|block| return !block.status().is_terminal());
    }

    /// Ordered concatenation of the message's rendered blocks.
    pub fn message_content(&self, message_id: &str) -> Option<String> {
        self.message(message_id)?;
        return Some(
            self.message_blocks(message_id)
                .iter()
                .map(|block| return block.rendered())
                .collect::<Vec<String>>()
                .join(""),
        );
    }

    pub fn transcript(&self) -> String {
        return self
            .messages
            .iter()
            .map(|msg| {
                let content = self.message_content(&msg.id).unwrap_or_default();
                return format!("{}:\n{}", msg.role, content.trim_end());
            })
            .collect::<Vec<String>>()
            .join("\n\n");
    }

    pub fn set_panel(&mut self, panel: &str, open: bool) {
        self.panels.insert(panel.to_string(), open);
    }

    pub fn toggle_panel(&mut self, panel: &str) -> bool {
        let open = !self.is_panel_open(panel);
        self.set_panel(panel, open);
        return open;
    }

    pub fn is_panel_open(&self, panel: &str) -> bool {
        return self.panels.get(panel).copied().unwrap_or(false);
    }

    pub fn pending_context_refs(&self) -> &[ContextRef] {
        return &self.pending_context_refs;
    }

    /// Adds a ref, or updates the hash and type of the ref already pending for
    /// the same resource.
    pub fn add_context_ref(&mut self, context_ref: ContextRef) -> ChatResult<()> {
        self.ensure_open()?;
        if let Some(existing) = self
            .pending_context_refs
            .iter_mut()
            .find(|e| return e.resource_id == context_ref.resource_id)
        {
            existing.hash = context_ref.hash;
            existing.type_id = context_ref.type_id;
            return Ok(());
        }

        self.pending_context_refs.push(context_ref);
        return Ok(());
    }

    pub fn remove_context_ref(&mut self, resource_id: &str) -> ChatResult<bool> {
        self.ensure_open()?;
        let before = self.pending_context_refs.len();
        self.pending_context_refs
            .retain(|e| return e.resource_id != resource_id);

        return Ok(self.pending_context_refs.len() != before);
    }

    pub fn clear_context_refs(&mut self, type_id: Option<&str>) -> ChatResult<()> {
        self.ensure_open()?;
        match type_id {
            Some(type_id) => self
                .pending_context_refs
                .retain(|e| return e.type_id != type_id),
            None => self.pending_context_refs.clear(),
        }

        return Ok(());
    }

    /// Tools to enable on the backend for the next turn, in first-seen order.
    pub fn enabled_tools(&self) -> Vec<String> {
        let mut seen_types: HashSet<&str> = HashSet::new();
        let mut seen_tools: HashSet<&str> = HashSet::new();
        let mut tools: Vec<String> = vec![];

        for context_ref in self.pending_context_refs.iter() {
            if !seen_types.insert(context_ref.type_id.as_str()) {
                continue;
            }

            for tool in self.context_types.tools_for(&context_ref.type_id) {
                if seen_tools.insert(tool.as_str()) {
                    tools.push(tool.to_string());
                }
            }
        }

        return tools;
    }

    /// Switches the store to another session, dropping all conversation state.
    pub fn reset(&mut self, session_id: &str) {
        tracing::debug!(from = self.session_id.as_str(), to = session_id, "Switching session");

        self.session_id = session_id.to_string();
        self.closed = false;
        self.clear_state();
    }

    pub fn close(&mut self) {
        tracing::debug!(session_id = self.session_id.as_str(), "Closing session");

        self.closed = true;
        self.clear_state();
    }

    fn clear_state(&mut self) {
        self.messages.clear();
        self.blocks.clear();
        self.active_blocks.clear();
        self.pending_context_refs.clear();
        self.panels.clear();
        self.streaming_message_id = None;
        self.notifications.clear();
    }
}
