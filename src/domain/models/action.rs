use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::Value;

use super::ContextRef;

/// Arguments of the backend's send command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub session_id: String,
    pub user_message_id: String,
    pub assistant_message_id: String,
    pub content: String,
    pub context_refs: Vec<ContextRef>,
    pub enabled_tools: Vec<String>,
}

#[derive(Clone, Debug)]
pub enum Action {
    SendMessage(SendRequest),
    /// Session id and assistant message id of the stream to cancel.
    AbortStream(String, String),
    /// Any other backend command, fire and forget.
    Invoke(String, Value),
}
