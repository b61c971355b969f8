//! Wire types for the subset of the Telegram Bot API the relay speaks.

use serde::{Deserialize, Serialize};

use crate::types::{ChatId, InboundMessage, UserId};

/// Envelope wrapping every Bot API response.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ApiResponse<T> {
    /// Whether the call succeeded.
    pub ok: bool,

    /// Payload, present when `ok` is true.
    pub result: Option<T>,

    /// Human-readable failure description.
    #[serde(default)]
    pub description: Option<String>,

    /// Numeric failure code.
    #[serde(default)]
    pub error_code: Option<i64>,
}

/// An incoming update from `getUpdates`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Update {
    /// Monotonic update identifier, used to acknowledge updates.
    pub update_id: i64,

    /// New incoming message, if this update carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<TelegramMessage>,
}

/// A message as delivered by Telegram.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelegramMessage {
    /// Identifier unique within the chat.
    pub message_id: i64,

    /// Sender; absent for channel posts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<TelegramUser>,

    /// Conversation the message belongs to.
    pub chat: TelegramChat,

    /// Text of the message; absent for stickers, photos and the like.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A Telegram user or bot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelegramUser {
    /// Unique identifier.
    pub id: i64,

    /// True for bots.
    #[serde(default)]
    pub is_bot: bool,

    /// First name.
    #[serde(default)]
    pub first_name: String,

    /// Username without the leading `@`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// A Telegram chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelegramChat {
    /// Unique identifier.
    pub id: i64,
}

impl Update {
    /// Converts this update into an inbound text event.
    ///
    /// Returns `None` for updates the relay does not handle: edits, non-text
    /// messages, and messages from bots.
    pub fn into_inbound(self) -> Option<InboundMessage> {
        let message = self.message?;
        let text = message.text?;
        let chat_id = ChatId(message.chat.id);
        let user_id = match message.from {
            Some(user) if user.is_bot => return None,
            Some(user) => UserId(user.id),
            None => UserId(message.chat.id),
        };
        Some(InboundMessage::new(user_id, chat_id, text))
    }
}

/// Body of `sendMessage`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SendMessageParams<'a> {
    /// Target chat.
    pub chat_id: i64,

    /// Text to send.
    pub text: &'a str,
}

/// Body of `sendChatAction`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SendChatActionParams {
    /// Target chat.
    pub chat_id: i64,

    /// Action to display, e.g. `typing`.
    pub action: &'static str,
}

/// Body of `getUpdates`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GetUpdatesParams {
    /// First update to return; acknowledges everything before it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,

    /// Long-poll timeout in seconds.
    pub timeout: u64,

    /// Restrict to the update kinds the relay handles.
    pub allowed_updates: Vec<&'static str>,
}
