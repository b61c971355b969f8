// Public modules
pub mod bot;
pub mod chunker;
pub mod client;
pub mod error;
pub mod history;
pub mod messenger;
pub mod requester;
pub mod telegram;
pub mod types;

mod observability;

// Re-exports
pub use chunker::{Pacer, ReplyPacer, TokioPacer, chunk_words};
pub use client::{Completer, OpenAi};
pub use error::{Error, FailureKind, Result};
pub use history::HistoryStore;
pub use messenger::Messenger;
pub use observability::{init_logging, register_biometrics};
pub use requester::CompletionRequester;
pub use telegram::Telegram;
pub use types::*;
