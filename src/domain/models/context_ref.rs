#[cfg(test)]
#[path = "context_ref_test.rs"]
mod tests;

use anyhow::bail;
use anyhow::Result;
use serde_derive::Deserialize;
use serde_derive::Serialize;

/// A resource (note, card, file, skill) attached to the next outgoing message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRef {
    pub resource_id: String,
    pub type_id: String,
    pub hash: String,
}

impl ContextRef {
    pub fn new(resource_id: &str, type_id: &str, hash: &str) -> ContextRef {
        return ContextRef {
            resource_id: resource_id.to_string(),
            type_id: type_id.to_string(),
            hash: hash.to_string(),
        };
    }

    /// Parses the `type:resource_id:hash` form used on the command line.
    pub fn parse(text: &str) -> Result<ContextRef> {
        let parts = text.trim().splitn(3, ':').collect::<Vec<&str>>();
        if parts.len() != 3 || parts.iter().any(|part| return part.is_empty()) {
            bail!(format!(
                "Invalid context ref '{text}', expected the form type:resource_id:hash"
            ));
        }

        return Ok(ContextRef::new(parts[1], parts[0], parts[2]));
    }
}
