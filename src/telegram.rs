//! Telegram Bot API connector.
//!
//! Only the three methods the relay needs are implemented: `getUpdates`
//! (long polling), `sendMessage` and `sendChatAction`.

use std::time::Duration;

use reqwest::Client as ReqwestClient;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{Error, Result};
use crate::messenger::Messenger;
use crate::types::ChatId;
use crate::types::telegram::{
    ApiResponse, GetUpdatesParams, SendChatActionParams, SendMessageParams, Update,
};

const DEFAULT_API_URL: &str = "https://api.telegram.org/";

/// Seconds the server holds a `getUpdates` call open when there is nothing new.
pub const LONG_POLL_SECS: u64 = 30;

/// Client for the Telegram Bot API.
#[derive(Clone)]
pub struct Telegram {
    client: ReqwestClient,
    bot_url: Url,
}

impl std::fmt::Debug for Telegram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The bot URL embeds the token.
        f.debug_struct("Telegram").finish_non_exhaustive()
    }
}

impl Telegram {
    /// Create a new client for the public Bot API.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_API_URL)
    }

    /// Create a new client against a self-hosted Bot API server.
    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() || token.contains('/') {
            return Err(Error::invalid_configuration("malformed Telegram bot token"));
        }
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let bot_url = Url::parse(&format!("{base}bot{token}/"))?;

        // Requests must outlive the long poll.
        let client = ReqwestClient::builder()
            .timeout(Duration::from_secs(LONG_POLL_SECS + 15))
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self { client, bot_url })
    }

    fn method_url(&self, method: &str) -> Result<Url> {
        Ok(self.bot_url.join(method)?)
    }

    async fn call<P, T>(&self, method: &str, params: &P) -> Result<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.method_url(method)?)
            .json(params)
            .send()
            .await
            .map_err(|e| Error::from_transport(e.without_url(), None))?;

        // Telegram reports failures inside the JSON envelope, with a matching
        // HTTP status; the envelope is the authoritative source.
        let body = response
            .text()
            .await
            .map_err(|e| Error::from_transport(e.without_url(), None))?;
        parse_envelope(method, &body)
    }

    /// Long-polls for updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>> {
        let params = GetUpdatesParams {
            offset,
            timeout: LONG_POLL_SECS,
            allowed_updates: vec!["message"],
        };
        self.call("getUpdates", &params).await
    }
}

#[async_trait::async_trait]
impl Messenger for Telegram {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<()> {
        let params = SendMessageParams {
            chat_id: chat.0,
            text,
        };
        let _: serde_json::Value = self.call("sendMessage", &params).await?;
        Ok(())
    }

    async fn send_typing(&self, chat: ChatId) -> Result<()> {
        let params = SendChatActionParams {
            chat_id: chat.0,
            action: "typing",
        };
        let _: bool = self.call("sendChatAction", &params).await?;
        Ok(())
    }
}

/// Unwraps a Bot API response envelope.
pub(crate) fn parse_envelope<T: DeserializeOwned>(method: &str, body: &str) -> Result<T> {
    let envelope: ApiResponse<T> = serde_json::from_str(body).map_err(|e| {
        Error::serialization(
            format!("{method}: unreadable response: {e}"),
            Some(Box::new(e)),
        )
    })?;
    if !envelope.ok {
        let description = envelope
            .description
            .unwrap_or_else(|| "request failed".to_string());
        return Err(Error::messaging(
            format!("{method}: {description}"),
            envelope.error_code,
        ));
    }
    envelope
        .result
        .ok_or_else(|| Error::malformed_response(format!("{method}: ok response without result")))
}
