//! Telegram Bot API client
//!
//! Maps HTTP 429 flood-control responses (with their `retry_after` hint) and
//! request timeouts onto the [`SendError`] taxonomy the pipeline retries on.

use super::{MediaItem, MediaTransport, SendError};
use crate::config::TelegramConfig;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub struct TelegramBot {
    client: Client,
    api_base: Url,
    token: String,
}

#[derive(Serialize)]
struct SendMediaGroupRequest<'a> {
    chat_id: &'a str,
    media: Vec<InputMedia<'a>>,
}

#[derive(Serialize)]
struct InputMedia<'a> {
    #[serde(rename = "type")]
    kind: super::MediaKind,
    media: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

impl TelegramBot {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: Url::parse(&config.api_base)
                .map_err(|e| crate::error::AdcastError::Validation(format!("api_base: {e}")))?,
            token: config.bot_token.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}bot{}/{}", self.api_base, self.token, method)
    }

    async fn call<T: Serialize>(
        &self,
        method: &str,
        payload: &T,
    ) -> std::result::Result<(), SendError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SendError::Timeout
                } else {
                    SendError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body: ApiResponse = response
            .json()
            .await
            .unwrap_or(ApiResponse {
                ok: status.is_success(),
                description: None,
                parameters: None,
            });

        if body.ok {
            debug!("Telegram {} delivered", method);
            return Ok(());
        }

        // Flood control carries a server-suggested wait
        if let Some(retry_after) = body.parameters.and_then(|p| p.retry_after) {
            return Err(SendError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        Err(SendError::Transport(format!(
            "HTTP {}: {}",
            status,
            body.description.unwrap_or_else(|| "unknown error".to_string())
        )))
    }
}

#[async_trait]
impl MediaTransport for TelegramBot {
    async fn send_media_group(
        &self,
        chat_id: &str,
        media: &[MediaItem],
    ) -> std::result::Result<(), SendError> {
        let payload = SendMediaGroupRequest {
            chat_id,
            media: media
                .iter()
                .map(|item| InputMedia {
                    kind: item.kind,
                    media: item.url.as_str(),
                    caption: item.caption.as_deref(),
                })
                .collect(),
        };
        self.call("sendMediaGroup", &payload).await
    }

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
    ) -> std::result::Result<(), SendError> {
        let payload = SendMessageRequest { chat_id, text };
        self.call("sendMessage", &payload).await
    }
}
