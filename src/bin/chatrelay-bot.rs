//! Telegram bot that relays every conversation to a chat-completion model.
//!
//! # Usage
//!
//! ```bash
//! export TELEGRAM_TOKEN=123456:ABC...
//! export OPENAI_API_KEY=sk-...
//!
//! # Defaults: gpt-4o-mini, 30-word chunks half a second apart
//! chatrelay-bot
//!
//! # Settings file, overridden by flags
//! chatrelay-bot --config bot.yaml --model gpt-4o --chunk-words 50
//!
//! # Forget conversations idle for an hour
//! chatrelay-bot --session-ttl-secs 3600
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use arrrg::CommandLine;
use tokio::sync::watch;

use chatrelay::bot::{BotArgs, BotConfig, Credentials, SessionController, run_polling};
use chatrelay::{HistoryStore, OpenAi, Telegram, init_logging};

#[tokio::main]
async fn main() -> ExitCode {
    let (args, _) = BotArgs::from_command_line_relaxed("chatrelay-bot [OPTIONS]");
    init_logging(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "chatrelay-bot stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: BotArgs) -> chatrelay::Result<()> {
    let config = BotConfig::resolve(args)?;
    let credentials = Credentials::from_env()?;

    let completer = OpenAi::with_options(
        &credentials.openai_api_key,
        Some(&config.api_base),
        Some(config.request_timeout),
    )?;
    tracing::debug!(api = %completer.base_url(), "completion endpoint");
    let telegram = Arc::new(Telegram::new(&credentials.telegram_token)?);
    let history = Arc::new(HistoryStore::new(config.history_limit));
    let controller = Arc::new(SessionController::new(
        &config,
        history,
        Arc::new(completer),
        telegram.clone(),
    ));

    let (shutdown, stopped) = watch::channel(false);
    ctrlc::set_handler(move || {
        shutdown.send_replace(true);
    })
    .map_err(|err| chatrelay::Error::invalid_configuration(format!("signal handler: {err}")))?;

    tracing::info!(
        model = %config.model,
        chunk_words = config.chunk_words,
        history_limit = config.history_limit,
        "starting chatrelay-bot"
    );
    run_polling(telegram, controller, config.session_ttl, stopped).await?;
    tracing::info!("chatrelay-bot shut down cleanly");
    Ok(())
}
