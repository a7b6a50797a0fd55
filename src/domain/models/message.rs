#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use chrono::DateTime;
use chrono::Utc;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use uuid::Uuid;

use super::ContextRef;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Generates a short prefixed id, e.g. `msg-1a2b3c4d-5e6f`.
pub fn create_id(prefix: &str) -> String {
    let id = Uuid::new_v4()
        .to_string()
        .split('-')
        .take(2)
        .collect::<Vec<&str>>()
        .join("-");

    return format!("{prefix}-{id}");
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub block_ids: Vec<String>,
    pub context_refs: Vec<ContextRef>,
    pub created_at: DateTime<Utc>,
    finalized: bool,
}

impl Message {
    pub fn new(id: &str, role: MessageRole) -> Message {
        return Message {
            id: id.to_string(),
            role,
            block_ids: vec![],
            context_refs: vec![],
            created_at: Utc::now(),
            finalized: false,
        };
    }

    pub fn is_finalized(&self) -> bool {
        return self.finalized;
    }

    pub(crate) fn finalize(&mut self) {
        self.finalized = true;
    }
}
