// Public modules
pub mod chat_completion;
pub mod inbound;
pub mod telegram;
pub mod turn;

// Re-exports
pub use chat_completion::{
    ChatCompletion, ChatCompletionParams, Choice, ChoiceMessage, CompletionUsage,
};
pub use inbound::{ChatId, InboundMessage, UserId};
pub use turn::{Role, Turn};
