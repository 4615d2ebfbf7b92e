//! Notification transports. Every backend takes the same composed message; they
//! differ only in how it leaves the process.

use super::{DeliveryError, OutboundMessage};
use crate::config::BackendConfig;
use crate::error::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[async_trait::async_trait]
pub trait NotificationBackend: Send + Sync {
    /// Channel name reported in `AlertOutcome::channel_used`
    fn name(&self) -> &str;

    async fn send(&self, message: &OutboundMessage) -> std::result::Result<(), DeliveryError>;
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .build()?)
}

async fn post_json<T: Serialize + ?Sized>(
    request: reqwest::RequestBuilder,
    body: &T,
) -> std::result::Result<(), DeliveryError> {
    let res = request.json(body).send().await?;
    let status = res.status();
    if !status.is_success() {
        let text = res.text().await.unwrap_or_default();
        return Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body: text.chars().take(200).collect(),
        });
    }
    Ok(())
}

#[derive(Serialize)]
struct EmailPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

/// Transactional email service reached over HTTP (JSON body, optional bearer key).
pub struct EmailApiBackend {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    from: String,
    client: reqwest::Client,
}

impl EmailApiBackend {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key,
            from: from.into(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait::async_trait]
impl NotificationBackend for EmailApiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &OutboundMessage) -> std::result::Result<(), DeliveryError> {
        let payload = EmailPayload {
            from: &self.from,
            to: [message.to.as_str()],
            subject: &message.subject,
            html: &message.html_body,
            text: &message.text_body,
        };
        let mut request = self.client.post(&self.endpoint);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        post_json(request, &payload).await
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    mine_id: &'a str,
    level: &'a str,
    probability: f64,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Generic JSON webhook (chat relay, paging gateway, serverless mail function).
pub struct WebhookBackend {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl WebhookBackend {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            url: url.into(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait::async_trait]
impl NotificationBackend for WebhookBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &OutboundMessage) -> std::result::Result<(), DeliveryError> {
        let payload = WebhookPayload {
            mine_id: &message.mine_id,
            level: message.level.as_str(),
            probability: message.probability,
            to: &message.to,
            subject: &message.subject,
            text: &message.text_body,
        };
        post_json(self.client.post(&self.url), &payload).await
    }
}

/// Appends each message as one JSON line to a local file, for later relay or audit.
pub struct OutboxBackend {
    name: String,
    path: PathBuf,
}

impl OutboxBackend {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl NotificationBackend for OutboxBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &OutboundMessage) -> std::result::Result<(), DeliveryError> {
        let mut line = serde_json::to_string(message)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        line.push('\n');
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        debug!(path = %self.path.display(), "message appended to outbox");
        Ok(())
    }
}

/// Instantiate the configured backends in order. Relative outbox paths resolve against `data_dir`.
pub fn build_backends(
    configs: &[BackendConfig],
    data_dir: &Path,
    timeout: Duration,
) -> Result<Vec<Box<dyn NotificationBackend>>> {
    let mut out: Vec<Box<dyn NotificationBackend>> = Vec::with_capacity(configs.len());
    for config in configs {
        let backend: Box<dyn NotificationBackend> = match config {
            BackendConfig::EmailApi {
                name,
                endpoint,
                api_key,
                from,
            } => Box::new(EmailApiBackend::new(
                name.clone(),
                endpoint.clone(),
                api_key.clone(),
                from.clone(),
                timeout,
            )?),
            BackendConfig::Webhook { name, url } => {
                Box::new(WebhookBackend::new(name.clone(), url.clone(), timeout)?)
            }
            BackendConfig::Outbox { name, path } => {
                let path = if path.is_absolute() {
                    path.clone()
                } else {
                    data_dir.join(path)
                };
                Box::new(OutboxBackend::new(name.clone(), path))
            }
        };
        out.push(backend);
    }
    Ok(out)
}
