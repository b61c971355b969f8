//! Outbound side of the messaging platform.

use crate::error::Result;
use crate::types::ChatId;

/// Operations the relay needs from the messaging platform.
///
/// [`crate::telegram::Telegram`] is the production implementation; tests
/// record calls instead.
#[async_trait::async_trait]
pub trait Messenger: Send + Sync {
    /// Sends `text` to `chat` as a plain message.
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<()>;

    /// Shows the transient "typing…" cue in `chat`.
    async fn send_typing(&self, chat: ChatId) -> Result<()>;
}
