#[cfg(test)]
#[path = "event_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::Value;
use snafu::ResultExt;

use super::error::MalformedEventSnafu;
use super::ChatResult;

/// Lifecycle phase of a single block within a streamed response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum BlockPhase {
    #[serde(rename_all = "camelCase")]
    Start {
        message_id: String,
        #[serde(default)]
        block_id: Option<String>,
        #[serde(default)]
        payload: Value,
    },
    #[serde(rename_all = "camelCase")]
    Chunk { block_id: String, chunk: String },
    #[serde(rename_all = "camelCase")]
    End {
        block_id: String,
        #[serde(default)]
        result: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    Error { block_id: String, error: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(flatten)]
    pub phase: BlockPhase,
}

/// Events streamed from the native bridge, decoded at the boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundEvent {
    Block(BlockEvent),
    #[serde(rename_all = "camelCase")]
    StreamStart { message_id: String },
    #[serde(rename_all = "camelCase")]
    StreamComplete { message_id: String },
    #[serde(rename_all = "camelCase")]
    StreamError { message_id: String, error: String },
    #[serde(rename_all = "camelCase")]
    StreamCancelled { message_id: String },
}

impl InboundEvent {
    pub fn decode(line: &str) -> ChatResult<InboundEvent> {
        return serde_json::from_str(line).context(MalformedEventSnafu);
    }
}

#[derive(Clone, Debug)]
pub enum Event {
    Inbound(InboundEvent),
    /// An outbound call failed. Carries the assistant message it was for, if
    /// one was opened.
    BackendFailure(Option<String>, String),
    Timeout(),
}
