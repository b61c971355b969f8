//! Slash command parsing for the bot.
//!
//! Messages that start with `/` control the session and are never sent to
//! the model.

/// A parsed bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Start over: clear the history and greet.
    Start,

    /// Clear the history; same effect as [`BotCommand::Start`].
    Reset,

    /// Show the command list.
    Help,

    /// A slash command the bot does not know.  It is ignored.
    Unknown(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(BotCommand)` if the input is a command, or `None` if it
/// should be treated as a regular message.  Telegram group chats address
/// commands as `/start@SomeBot`; the suffix is ignored.
///
/// # Examples
///
/// ```
/// # use chatrelay::bot::{BotCommand, parse_command};
/// assert_eq!(parse_command("/start"), Some(BotCommand::Start));
/// assert_eq!(parse_command("/reset@relay_bot"), Some(BotCommand::Reset));
/// assert!(parse_command("Hello!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<BotCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let word = rest.split_whitespace().next().unwrap_or("");
    let command = word.split('@').next().unwrap_or("").to_lowercase();

    let result = match command.as_str() {
        "start" => BotCommand::Start,
        "reset" | "clear" | "new" => BotCommand::Reset,
        "help" => BotCommand::Help,
        _ => BotCommand::Unknown(command),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Send me any message and I will answer.

Commands:
  /start   Start a new conversation
  /reset   Forget everything we talked about
  /help    Show this help message"#
}
