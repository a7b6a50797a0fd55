#[cfg(test)]
#[path = "block_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::Value;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    EnumVariantNames,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BlockType {
    Text,
    Thinking,
    ToolCall,
    ImageGen,
    MemoryRetrieval,
    RagRetrieval,
    WebSearch,
}

impl BlockType {
    pub fn parse(text: &str) -> Option<BlockType> {
        return BlockType::iter().find(|e| return e.to_string() == text);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BlockStatus {
    Pending,
    Streaming,
    Success,
    Error,
}

impl BlockStatus {
    pub fn is_terminal(&self) -> bool {
        return matches!(self, BlockStatus::Success | BlockStatus::Error);
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,
    pub message_id: String,
    pub block_type: BlockType,
    pub tool_name: Option<String>,
    event_type: String,
    status: BlockStatus,
    content: String,
    result: Option<Value>,
    error: Option<String>,
}

impl Block {
    pub fn new(id: &str, message_id: &str, block_type: BlockType) -> Block {
        return Block {
            id: id.to_string(),
            message_id: message_id.to_string(),
            block_type,
            tool_name: None,
            event_type: block_type.to_string(),
            status: BlockStatus::Pending,
            content: "".to_string(),
            result: None,
            error: None,
        };
    }

    /// The event type whose handler owns this block's lifecycle.
    pub fn event_type(&self) -> &str {
        return &self.event_type;
    }

    pub fn status(&self) -> BlockStatus {
        return self.status;
    }

    pub fn content(&self) -> &str {
        return &self.content;
    }

    pub fn result(&self) -> Option<&Value> {
        return self.result.as_ref();
    }

    pub fn error(&self) -> Option<&str> {
        return self.error.as_deref();
    }

    pub(crate) fn set_event_type(&mut self, event_type: &str) {
        self.event_type = event_type.to_string();
    }

    pub(crate) fn set_status(&mut self, status: BlockStatus) {
        self.status = status;
    }

    pub(crate) fn append(&mut self, chunk: &str) {
        self.content += chunk;
    }

    pub(crate) fn set_result(&mut self, result: Value) {
        self.result = Some(result);
    }

    pub(crate) fn set_error(&mut self, error: &str) {
        self.error = Some(error.to_string());
    }

    /// The block's share of its message's visible content.
    pub fn rendered(&self) -> String {
        let mut res = match self.block_type {
            BlockType::Text => self.content.to_string(),
            BlockType::Thinking => format!("[thinking] {}\n", self.content.trim()),
            BlockType::ToolCall => format!(
                "[tool_call {}: {}]\n",
                self.tool_name.as_deref().unwrap_or("unknown"),
                self.status
            ),
            _ => format!("[{}: {}]\n", self.block_type, self.status),
        };

        if let Some(error) = &self.error {
            if !res.is_empty() && !res.ends_with('\n') {
                res.push('\n');
            }
            res += &format!("[error: {error}]\n");
        }

        return res;
    }
}
