pub mod bridge;
pub mod replay;

use std::sync::Arc;

use anyhow::bail;
use anyhow::Result;
use tokio::sync::mpsc;

use crate::domain::models::BackendBox;
use crate::domain::models::BackendName;
use crate::domain::models::Event;
use crate::domain::models::InboundEvent;

pub struct BackendManager {}

impl BackendManager {
    pub fn get(name: BackendName) -> Result<BackendBox> {
        if name == BackendName::Bridge {
            return Ok(Arc::<bridge::Bridge>::default());
        }

        if name == BackendName::Replay {
            return Ok(Arc::<replay::Replay>::default());
        }

        bail!(format!("No backend implemented for {name}"))
    }
}

/// Decodes one line of an NDJSON event stream into the event channel. Blank
/// and undecodable lines are skipped.
pub(crate) fn forward_line(line: &str, tx: &mpsc::UnboundedSender<Event>) -> Result<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }

    match InboundEvent::decode(line) {
        Ok(event) => tx.send(Event::Inbound(event))?,
        Err(err) => {
            tracing::warn!(line = line, error = %err, "Dropped undecodable event");
        }
    }

    return Ok(());
}
