use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use super::Event;

pub const SEND_COMMAND: &str = "chat_v2_send_message";
pub const CANCEL_COMMAND: &str = "chat_v2_cancel_stream";

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BackendName {
    Bridge,
    Replay,
}

impl BackendName {
    pub fn parse(text: String) -> Option<BackendName> {
        return BackendName::iter().find(|e| return e.to_string() == text);
    }
}

#[async_trait]
pub trait Backend {
    fn name(&self) -> BackendName;

    /// Used at startup to verify the native side is reachable.
    async fn health_check(&self) -> Result<()>;

    /// Calls a named backend command with a serializable request. Call sites
    /// must tolerate arbitrary latency, and the native side may fail.
    async fn invoke(&self, command: &str, args: Value) -> Result<Value>;

    /// Subscribes to the backend's event stream, forwarding every decoded
    /// event into the channel until the stream ends. `ready` fires once the
    /// subscription is live; it is dropped unsent if subscribing fails.
    ///
    /// Lines that fail to decode are dropped with a warning rather than
    /// ending the subscription.
    async fn listen<'a>(
        &self,
        tx: &'a mpsc::UnboundedSender<Event>,
        ready: oneshot::Sender<()>,
    ) -> Result<()>;
}

pub type BackendBox = Arc<dyn Backend + Send + Sync>;
