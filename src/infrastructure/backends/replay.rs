#[cfg(test)]
#[path = "replay_test.rs"]
mod tests;

use std::path;
use std::sync::Mutex;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use super::forward_line;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Backend;
use crate::domain::models::BackendName;
use crate::domain::models::Event;

/// Plays back a recorded NDJSON event log. Commands are accepted and
/// remembered, never executed.
pub struct Replay {
    events_file: String,
    commands: Mutex<Vec<String>>,
}

impl Default for Replay {
    fn default() -> Replay {
        return Replay::new(&Config::get(ConfigKey::EventsFile));
    }
}

impl Replay {
    pub fn new(events_file: &str) -> Replay {
        return Replay {
            events_file: events_file.to_string(),
            commands: Mutex::new(vec![]),
        };
    }

    /// Commands received so far, oldest first.
    pub fn commands(&self) -> Vec<String> {
        return self
            .commands
            .lock()
            .map(|commands| return commands.clone())
            .unwrap_or_default();
    }
}

#[async_trait]
impl Backend for Replay {
    fn name(&self) -> BackendName {
        return BackendName::Replay;
    }

    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        if self.events_file.is_empty() {
            bail!("The replay backend needs an events file, set {}", ConfigKey::EventsFile);
        }

        if !path::Path::new(&self.events_file).exists() {
            bail!("Events file {} does not exist", self.events_file);
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn invoke(&self, command: &str, args: Value) -> Result<Value> {
        tracing::debug!(command = command, args = %args, "Replay received command");
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command.to_string());
        }

        return Ok(json!({}));
    }

    #[allow(clippy::implicit_return)]
    async fn listen<'a>(
        &self,
        tx: &'a mpsc::UnboundedSender<Event>,
        ready: oneshot::Sender<()>,
    ) -> Result<()> {
        self.health_check().await?;

        let file = fs::File::open(&self.events_file).await?;
        if ready.send(()).is_err() {
            tracing::debug!("Nobody is waiting on the replay subscription");
        }

        let mut lines_reader = BufReader::new(file).lines();
        while let Some(line) = lines_reader.next_line().await? {
            forward_line(&line, tx)?;
        }

        return Ok(());
    }
}
