//! The per-message session pipeline.
//!
//! [`SessionController::handle`] takes one inbound message through
//! `Received → HistoryUpdated → Requesting → Delivering → Done`, or through
//! `Failed` when the completion cannot be obtained.  Commands short-circuit
//! straight to `Done`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::bot::commands::{BotCommand, help_text, parse_command};
use crate::bot::config::BotConfig;
use crate::chunker::{Pacer, ReplyPacer, TokioPacer};
use crate::client::Completer;
use crate::error::{FailureKind, Result};
use crate::history::HistoryStore;
use crate::messenger::Messenger;
use crate::observability::{COMPLETION_FAILURES, COMPLETION_RETRIES, INBOUND_MESSAGES, SESSION_RESETS};
use crate::requester::CompletionRequester;
use crate::types::{InboundMessage, Turn};

const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Where a message is in the pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TurnState {
    /// The message has arrived.
    Received,
    /// The user turn is in the history store.
    HistoryUpdated,
    /// Waiting on the completion API.
    Requesting,
    /// Sending reply chunks.
    Delivering,
    /// The completion could not be obtained.
    Failed,
    /// Nothing left to do.
    Done,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Received => "received",
            TurnState::HistoryUpdated => "history_updated",
            TurnState::Requesting => "requesting",
            TurnState::Delivering => "delivering",
            TurnState::Failed => "failed",
            TurnState::Done => "done",
        };
        f.write_str(name)
    }
}

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// History was cleared and the greeting sent.
    Reset,
    /// Help text was sent.
    Help,
    /// An unknown command; nothing was sent.
    Ignored,
    /// The model replied and the reply went out in `chunks` messages.
    Replied {
        /// Number of chunks delivered.
        chunks: usize,
    },
    /// The completion failed and the error notice was sent.
    Failed(FailureKind),
}

/// Orchestrates history, completion and delivery for each inbound message.
///
/// The controller is shared by every user worker.  It relies on the caller
/// to hand it one user's messages one at a time.
pub struct SessionController {
    history: Arc<HistoryStore>,
    requester: CompletionRequester,
    replies: ReplyPacer,
    messenger: Arc<dyn Messenger>,
    pacer: Arc<dyn Pacer>,
    greeting: String,
    error_notice: String,
    typing_before_request: bool,
    completion_retries: u32,
}

impl SessionController {
    /// Creates a controller that paces on the tokio timer.
    pub fn new(
        config: &BotConfig,
        history: Arc<HistoryStore>,
        completer: Arc<dyn Completer>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self::with_pacer(config, history, completer, messenger, Arc::new(TokioPacer))
    }

    /// Creates a controller with a custom [`Pacer`] for chunk pacing and
    /// retry backoff.
    pub fn with_pacer(
        config: &BotConfig,
        history: Arc<HistoryStore>,
        completer: Arc<dyn Completer>,
        messenger: Arc<dyn Messenger>,
        pacer: Arc<dyn Pacer>,
    ) -> Self {
        let requester = CompletionRequester::new(
            completer,
            config.model.clone(),
            config.system_prompt.clone(),
            config.max_tokens,
        );
        let replies = ReplyPacer::with_pacer(config.chunk_words, config.chunk_delay, pacer.clone());
        Self {
            history,
            requester,
            replies,
            messenger,
            pacer,
            greeting: config.greeting.clone(),
            error_notice: config.error_notice.clone(),
            typing_before_request: config.typing_before_request,
            completion_retries: config.completion_retries,
        }
    }

    /// The history store this controller writes to.
    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Runs one inbound message to completion.
    ///
    /// Completion failures are handled here: the user gets the error notice
    /// and the outcome is [`TurnOutcome::Failed`].
    ///
    /// # Errors
    ///
    /// Only messaging failures (a send that the platform rejected) are
    /// returned.
    pub async fn handle(&self, message: InboundMessage) -> Result<TurnOutcome> {
        INBOUND_MESSAGES.click();
        let span = tracing::info_span!("turn", user = %message.user_id, chat = %message.chat_id);
        self.run(message).instrument(span).await
    }

    async fn run(&self, message: InboundMessage) -> Result<TurnOutcome> {
        let InboundMessage {
            user_id,
            chat_id,
            text,
        } = message;
        self.transition(TurnState::Received);
        tracing::info!(chars = text.chars().count(), "inbound message");

        if let Some(command) = parse_command(&text) {
            let outcome = match command {
                BotCommand::Start | BotCommand::Reset => {
                    self.history.reset(user_id);
                    SESSION_RESETS.click();
                    self.messenger.send_text(chat_id, &self.greeting).await?;
                    TurnOutcome::Reset
                }
                BotCommand::Help => {
                    self.messenger.send_text(chat_id, help_text()).await?;
                    TurnOutcome::Help
                }
                BotCommand::Unknown(name) => {
                    tracing::debug!(command = %name, "ignoring unknown command");
                    TurnOutcome::Ignored
                }
            };
            self.transition(TurnState::Done);
            return Ok(outcome);
        }

        self.history.append(user_id, Turn::user(text));
        self.transition(TurnState::HistoryUpdated);

        if self.typing_before_request {
            if let Err(err) = self.messenger.send_typing(chat_id).await {
                tracing::warn!(error = %err, "could not show typing cue");
            }
        }

        self.transition(TurnState::Requesting);
        let history = self.history.get(user_id);
        let mut attempt = 0u32;
        let reply = loop {
            match self.requester.request(user_id, &history).await {
                Ok(reply) => break Ok(reply),
                Err(err) if err.is_retryable() && attempt < self.completion_retries => {
                    let backoff = RETRY_BACKOFF * 2u32.pow(attempt.min(6));
                    attempt += 1;
                    COMPLETION_RETRIES.click();
                    tracing::warn!(error = %err, attempt, ?backoff, "retrying completion");
                    self.pacer.pause(backoff).await;
                }
                Err(err) => break Err(err),
            }
        };

        match reply {
            Ok(reply) => {
                self.history.append(user_id, Turn::assistant(reply.clone()));
                self.transition(TurnState::Delivering);
                let chunks = self
                    .replies
                    .deliver(self.messenger.as_ref(), chat_id, &reply)
                    .await?;
                self.transition(TurnState::Done);
                Ok(TurnOutcome::Replied { chunks })
            }
            Err(err) => {
                let kind = err.failure_kind();
                COMPLETION_FAILURES.click();
                tracing::error!(
                    error = %err,
                    kind = %kind,
                    model = %self.requester.model(),
                    "completion failed"
                );
                self.transition(TurnState::Failed);
                self.messenger.send_text(chat_id, &self.error_notice).await?;
                self.transition(TurnState::Done);
                Ok(TurnOutcome::Failed(kind))
            }
        }
    }

    fn transition(&self, state: TurnState) {
        tracing::trace!(state = %state, "turn state");
    }
}
