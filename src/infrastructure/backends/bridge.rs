#[cfg(test)]
#[path = "bridge_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::io::StreamReader;

use super::forward_line;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Backend;
use crate::domain::models::BackendName;
use crate::domain::models::Event;

fn convert_err(err: reqwest::Error) -> std::io::Error {
    let err_msg = err.to_string();
    return std::io::Error::new(std::io::ErrorKind::Interrupted, err_msg);
}

/// HTTP bridge to the native study backend. Commands are posted as JSON and
/// events arrive as a newline delimited JSON stream.
pub struct Bridge {
    url: String,
    timeout: String,
}

impl Default for Bridge {
    fn default() -> Bridge {
        return Bridge {
            url: Config::get(ConfigKey::BridgeURL),
            timeout: Config::get(ConfigKey::BackendHealthCheckTimeout),
        };
    }
}

#[async_trait]
impl Backend for Bridge {
    fn name(&self) -> BackendName {
        return BackendName::Bridge;
    }

    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        let res = reqwest::Client::new()
            .get(format!("{url}/health", url = self.url))
            .timeout(Duration::from_millis(self.timeout.parse::<u64>()?))
            .send()
            .await;

        let res = match res {
            Ok(res) => res,
            Err(err) => {
                tracing::error!(error = ?err, "Bridge is not running");
                bail!("Bridge is not running at {}", self.url);
            }
        };

        if !res.status().is_success() {
            tracing::error!(status = res.status().as_u16(), "Bridge health check failed");
            bail!("Bridge health check failed");
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn invoke(&self, command: &str, args: Value) -> Result<Value> {
        let res = reqwest::Client::new()
            .post(format!("{url}/invoke/{command}", url = self.url))
            .json(&args)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            tracing::error!(
                command = command,
                status = status.as_u16(),
                body = body.as_str(),
                "Bridge command failed"
            );
            bail!("{command} failed with status {}: {}", status.as_u16(), body.trim());
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        return Ok(serde_json::from_str(&body)?);
    }

    #[allow(clippy::implicit_return)]
    async fn listen<'a>(
        &self,
        tx: &'a mpsc::UnboundedSender<Event>,
        ready: oneshot::Sender<()>,
    ) -> Result<()> {
        let res = reqwest::Client::new()
            .get(format!("{url}/events", url = self.url))
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(status = res.status().as_u16(), "Failed to subscribe to bridge events");
            bail!("Failed to subscribe to bridge events");
        }

        if ready.send(()).is_err() {
            tracing::debug!("Nobody is waiting on the bridge subscription");
        }

        let stream = res.bytes_stream().map_err(convert_err);
        let mut lines_reader = StreamReader::new(stream).lines();

        while let Some(line) = lines_reader.next_line().await? {
            forward_line(&line, tx)?;
        }

        tracing::debug!("Bridge event stream ended");
        return Ok(());
    }
}
