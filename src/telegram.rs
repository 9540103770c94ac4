//! Minimal Telegram Bot API client: long-poll `getUpdates`, `sendMessage`.
//!
//! Only the handful of fields the bot reads are modelled; everything else in
//! an update is ignored by serde. Every Bot API response is wrapped in an
//! `{ok, result, description}` envelope, and `ok: false` is reported as
//! [`Vatlib2PdfError::Transport`] with Telegram's description.
//!
//! The token is part of every request URL, so reqwest errors are stripped of
//! their URL before they are logged or returned.

use crate::config::BotConfig;
use crate::error::Vatlib2PdfError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// One incoming update. Only message updates are used.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl User {
    /// First and last name joined by a space.
    pub fn full_name(&self) -> String {
        match self.last_name.as_deref() {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// Where the bot sends its replies.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn reply(&self, chat_id: i64, text: &str) -> Result<(), Vatlib2PdfError>;
}

/// Bot API client bound to one token.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    /// `{api_base}/bot{token}`; never logged.
    endpoint: String,
    poll_timeout_secs: u64,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(config: &BotConfig) -> Result<Self, Vatlib2PdfError> {
        // The HTTP timeout has to outlast the long poll.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
            .build()
            .map_err(|e| Vatlib2PdfError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!(
                "{}/bot{}",
                config.api_base.trim_end_matches('/'),
                config.token
            ),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    /// Long-poll for updates with `update_id >= offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, Vatlib2PdfError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), Vatlib2PdfError> {
        let _: serde_json::Value = self
            .call("sendMessage", &json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, Vatlib2PdfError> {
        let transport = |reason: String| Vatlib2PdfError::Transport { reason };
        debug!("Bot API call: {}", method);

        let response = self
            .http
            .post(format!("{}/{}", self.endpoint, method))
            .json(body)
            .send()
            .await
            .map_err(|e| transport(format!("{method}: {}", e.without_url())))?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| transport(format!("{method}: invalid response: {}", e.without_url())))?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(transport(format!(
                "{method}: {}",
                description.unwrap_or_else(|| "request rejected".into())
            ))),
        }
    }
}

#[async_trait]
impl ChatSink for TelegramClient {
    async fn reply(&self, chat_id: i64, text: &str) -> Result<(), Vatlib2PdfError> {
        self.send_message(chat_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TelegramClient {
        let mut config = BotConfig::new("123:secret").unwrap();
        config.api_base = server.uri();
        config.poll_timeout_secs = 1;
        TelegramClient::new(&config).unwrap()
    }

    #[test]
    fn full_name_joins_parts() {
        let mut user = User {
            id: 1,
            first_name: "Ada".into(),
            last_name: Some("Lovelace".into()),
        };
        assert_eq!(user.full_name(), "Ada Lovelace");
        user.last_name = None;
        assert_eq!(user.full_name(), "Ada");
    }

    #[test]
    fn update_parses_with_unknown_fields() {
        let raw = r#"{
            "update_id": 10,
            "message": {
                "message_id": 5,
                "date": 1700000000,
                "chat": { "id": 99, "type": "private" },
                "from": { "id": 42, "is_bot": false, "first_name": "Ada" },
                "text": "https://digi.vatlib.it/view/MSS_Vat.lat.3225"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let msg = update.message.unwrap();
        assert_eq!(msg.chat.id, 99);
        assert_eq!(msg.from.unwrap().id, 42);
        assert!(msg.text.unwrap().contains("vatlib"));
    }

    #[tokio::test]
    async fn get_updates_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:secret/getUpdates"))
            .and(body_partial_json(json!({ "offset": 7 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    { "update_id": 7, "message": { "message_id": 1, "chat": { "id": 3 }, "text": "/start" } },
                    { "update_id": 8, "edited_message": {} }
                ]
            })))
            .mount(&server)
            .await;

        let updates = client_for(&server).get_updates(7).await.unwrap();
        assert_eq!(updates.len(), 2);
        assert!(updates[0].message.is_some());
        assert!(updates[1].message.is_none());
    }

    #[tokio::test]
    async fn rejected_call_is_transport_error_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:secret/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).reply(1, "hi").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("chat not found"), "got: {msg}");
        assert!(!msg.contains("secret"), "token leaked: {msg}");
        assert_eq!(err.stage(), "transport");
    }
}
