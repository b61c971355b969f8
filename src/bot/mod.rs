//! The Telegram relay built on top of the chatrelay client library.
//!
//! Every inbound text message runs through the same pipeline:
//!
//! - Slash commands reset the conversation or print help
//! - Plain text is appended to the sender's history and sent to the model
//! - The reply is recorded and delivered in paced, word-bounded chunks
//!
//! # Architecture
//!
//! - [`config`]: CLI arguments, YAML overrides and credentials
//! - [`commands`]: slash command parsing
//! - [`controller`]: the per-message session pipeline
//! - [`dispatcher`]: per-user ordering and the Telegram polling loop

mod commands;
mod config;
mod controller;
mod dispatcher;

pub use commands::{BotCommand, help_text, parse_command};
pub use config::{
    BotArgs, BotConfig, Credentials, DEFAULT_ERROR_NOTICE, DEFAULT_GREETING, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT, FileConfig, OPENAI_API_KEY_VAR, TELEGRAM_TOKEN_VAR,
};
pub use controller::{SessionController, TurnOutcome, TurnState};
pub use dispatcher::{Dispatcher, WORKER_IDLE, run_polling};
