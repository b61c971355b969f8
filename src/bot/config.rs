//! Configuration for the relay bot.
//!
//! Settings come from three layers, later layers winning: built-in defaults,
//! an optional YAML file, and command-line flags parsed with `arrrg`.
//! Credentials come only from the environment.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::Deserialize;

use crate::chunker::{DEFAULT_CHUNK_DELAY, DEFAULT_CHUNK_WORDS};
use crate::client::DEFAULT_API_URL;
use crate::error::{Error, Result};
use crate::history::DEFAULT_HISTORY_LIMIT;

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default cap on reply length, in tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Default persona sent as the system turn of every request.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly Telegram assistant bot.";

/// Default reply to `/start` and reset commands.
pub const DEFAULT_GREETING: &str = "👋 Hi! I'm a ChatGPT bot. Send me a message and I'll reply!";

/// Default notice sent when a completion fails.
pub const DEFAULT_ERROR_NOTICE: &str =
    "⚠️ Something went wrong while contacting the model. Please try again.";

/// Environment variable holding the Telegram bot token.
pub const TELEGRAM_TOKEN_VAR: &str = "TELEGRAM_TOKEN";

/// Environment variable holding the completion API key.
pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Command-line arguments for the chatrelay-bot binary.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct BotArgs {
    /// YAML file with bot settings.
    #[arrrg(optional, "YAML settings file", "FILE")]
    pub config: Option<String>,

    /// Model to use.
    #[arrrg(optional, "Model to use (default: gpt-4o-mini)", "MODEL")]
    pub model: Option<String>,

    /// System prompt framing every conversation.
    #[arrrg(optional, "System prompt for every conversation", "PROMPT")]
    pub system: Option<String>,

    /// Maximum tokens per response.
    #[arrrg(optional, "Max tokens per response (default: 1024)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Words per delivered chunk.
    #[arrrg(optional, "Max words per reply chunk (default: 30)", "WORDS")]
    pub chunk_words: Option<usize>,

    /// Pause between chunks.
    #[arrrg(optional, "Pause between reply chunks in ms (default: 500)", "MS")]
    pub chunk_delay_ms: Option<u64>,

    /// Turns kept per user.
    #[arrrg(optional, "Turns of history kept per user (default: 40)", "TURNS")]
    pub history_limit: Option<usize>,

    /// Forget users after this much inactivity.
    #[arrrg(optional, "Forget idle conversations after SECS", "SECS")]
    pub session_ttl_secs: Option<u64>,

    /// Retries of transient completion failures.
    #[arrrg(optional, "Retries for transient completion failures (default: 0)", "N")]
    pub completion_retries: Option<u32>,

    /// Root of the completion API.
    #[arrrg(optional, "Completion API base URL", "URL")]
    pub api_base: Option<String>,

    /// HTTP timeout for completion calls.
    #[arrrg(optional, "Completion request timeout in seconds (default: 60)", "SECS")]
    pub request_timeout_secs: Option<u64>,

    /// Skip the typing cue shown while waiting for the model.
    #[arrrg(flag, "Do not show typing while waiting for the model")]
    pub no_typing: bool,

    /// Log at debug level.
    #[arrrg(flag, "Verbose logging")]
    pub verbose: bool,
}

/// Bot settings as they may appear in a YAML file.
#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Model identifier.
    pub model: Option<String>,
    /// System prompt.
    pub system_prompt: Option<String>,
    /// Reply length cap.
    pub max_tokens: Option<u32>,
    /// Words per chunk.
    pub chunk_words: Option<usize>,
    /// Pause between chunks in milliseconds.
    pub chunk_delay_ms: Option<u64>,
    /// Turns kept per user.
    pub history_limit: Option<usize>,
    /// Idle TTL in seconds.
    pub session_ttl_secs: Option<u64>,
    /// Transient-failure retries.
    pub completion_retries: Option<u32>,
    /// Completion API root.
    pub api_base: Option<String>,
    /// Completion request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Typing cue while waiting for the model.
    pub typing_before_request: Option<bool>,
    /// Reply to `/start`.
    pub greeting: Option<String>,
    /// Reply to a failed completion.
    pub error_notice: Option<String>,
}

impl FileConfig {
    /// Parses settings from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads settings from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        Self::from_yaml(&content)
    }
}

/// Resolved bot configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BotConfig {
    /// Model identifier sent with each request.
    pub model: String,

    /// System prompt prepended to every request.
    pub system_prompt: String,

    /// Maximum tokens per response.
    pub max_tokens: u32,

    /// Maximum words per delivered chunk.
    pub chunk_words: usize,

    /// Pause before each chunk after the first.
    pub chunk_delay: Duration,

    /// Turns of history retained per user.
    pub history_limit: usize,

    /// Idle sessions older than this are dropped; `None` keeps them forever.
    pub session_ttl: Option<Duration>,

    /// Retries for transient completion failures.
    pub completion_retries: u32,

    /// Completion API root.
    pub api_base: String,

    /// HTTP timeout for completion calls.
    pub request_timeout: Duration,

    /// Show a typing cue while the completion request is in flight.
    pub typing_before_request: bool,

    /// Reply to `/start` and reset commands.
    pub greeting: String,

    /// Reply sent when a completion fails.
    pub error_notice: String,

    /// Log at debug level.
    pub verbose: bool,
}

impl BotConfig {
    /// Creates a new BotConfig with default values.
    pub fn new() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            chunk_words: DEFAULT_CHUNK_WORDS,
            chunk_delay: DEFAULT_CHUNK_DELAY,
            history_limit: DEFAULT_HISTORY_LIMIT,
            session_ttl: None,
            completion_retries: 0,
            api_base: DEFAULT_API_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            typing_before_request: true,
            greeting: DEFAULT_GREETING.to_string(),
            error_notice: DEFAULT_ERROR_NOTICE.to_string(),
            verbose: false,
        }
    }

    /// Resolves defaults, the optional settings file and flags into a
    /// validated configuration.
    pub fn resolve(args: BotArgs) -> Result<Self> {
        let mut config = Self::new();
        if let Some(path) = args.config.as_deref() {
            config.apply_file(FileConfig::from_file(path)?);
        }
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Overlays the values present in `file`.
    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(model) = file.model {
            self.model = model;
        }
        if let Some(prompt) = file.system_prompt {
            self.system_prompt = prompt;
        }
        if let Some(max_tokens) = file.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(words) = file.chunk_words {
            self.chunk_words = words;
        }
        if let Some(ms) = file.chunk_delay_ms {
            self.chunk_delay = Duration::from_millis(ms);
        }
        if let Some(limit) = file.history_limit {
            self.history_limit = limit;
        }
        if let Some(secs) = file.session_ttl_secs {
            self.session_ttl = Some(Duration::from_secs(secs));
        }
        if let Some(retries) = file.completion_retries {
            self.completion_retries = retries;
        }
        if let Some(base) = file.api_base {
            self.api_base = base;
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(typing) = file.typing_before_request {
            self.typing_before_request = typing;
        }
        if let Some(greeting) = file.greeting {
            self.greeting = greeting;
        }
        if let Some(notice) = file.error_notice {
            self.error_notice = notice;
        }
    }

    /// Overlays the values given on the command line.
    pub fn apply_args(&mut self, args: BotArgs) {
        if let Some(model) = args.model {
            self.model = model;
        }
        if let Some(prompt) = args.system {
            self.system_prompt = prompt;
        }
        if let Some(max_tokens) = args.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(words) = args.chunk_words {
            self.chunk_words = words;
        }
        if let Some(ms) = args.chunk_delay_ms {
            self.chunk_delay = Duration::from_millis(ms);
        }
        if let Some(limit) = args.history_limit {
            self.history_limit = limit;
        }
        if let Some(secs) = args.session_ttl_secs {
            self.session_ttl = Some(Duration::from_secs(secs));
        }
        if let Some(retries) = args.completion_retries {
            self.completion_retries = retries;
        }
        if let Some(base) = args.api_base {
            self.api_base = base;
        }
        if let Some(secs) = args.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if args.no_typing {
            self.typing_before_request = false;
        }
        self.verbose |= args.verbose;
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::invalid_configuration("model must not be empty"));
        }
        if self.max_tokens == 0 {
            return Err(Error::invalid_configuration("max_tokens must be at least 1"));
        }
        if self.chunk_words == 0 {
            return Err(Error::invalid_configuration("chunk_words must be at least 1"));
        }
        if self.history_limit < 2 {
            return Err(Error::invalid_configuration(
                "history_limit must keep at least one exchange (2 turns)",
            ));
        }
        if self.session_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(Error::invalid_configuration("session_ttl_secs must be positive"));
        }
        Ok(())
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the maximum tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the chunk size and pacing delay.
    pub fn with_chunking(mut self, words: usize, delay: Duration) -> Self {
        self.chunk_words = words;
        self.chunk_delay = delay;
        self
    }

    /// Sets the per-user history limit.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Sets the idle-session TTL.
    pub fn with_session_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Sets the number of retries for transient failures.
    pub fn with_completion_retries(mut self, retries: u32) -> Self {
        self.completion_retries = retries;
        self
    }

    /// Enables or disables the typing cue before the completion request.
    pub fn with_typing_before_request(mut self, enabled: bool) -> Self {
        self.typing_before_request = enabled;
        self
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Secrets needed to talk to both services.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Telegram bot token.
    pub telegram_token: String,
    /// Completion API key.
    pub openai_api_key: String,
}

impl Credentials {
    /// Reads both credentials from the process environment.
    ///
    /// # Errors
    ///
    /// [`Error::ConfigurationMissing`] naming the first variable that is
    /// unset or blank.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads both credentials through `lookup`.  Values are trimmed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| Error::configuration_missing(name))
        };
        Ok(Self {
            telegram_token: require(TELEGRAM_TOKEN_VAR)?,
            openai_api_key: require(OPENAI_API_KEY_VAR)?,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("telegram_token", &"<redacted>")
            .field("openai_api_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config() {
        let config = BotConfig::new();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.chunk_words, 30);
        assert_eq!(config.chunk_delay, Duration::from_millis(500));
        assert_eq!(config.history_limit, 40);
        assert!(config.session_ttl.is_none());
        assert_eq!(config.completion_retries, 0);
        assert!(config.typing_before_request);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_from_args_defaults() {
        let config = BotConfig::resolve(BotArgs::default()).unwrap();
        assert_eq!(config, BotConfig::new());
    }

    #[test]
    fn config_from_args_custom() {
        let args = BotArgs {
            model: Some("gpt-4o".to_string()),
            system: Some("You are terse.".to_string()),
            max_tokens: Some(200),
            chunk_words: Some(10),
            chunk_delay_ms: Some(0),
            session_ttl_secs: Some(3600),
            no_typing: true,
            verbose: true,
            ..BotArgs::default()
        };
        let config = BotConfig::resolve(args).unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.system_prompt, "You are terse.");
        assert_eq!(config.max_tokens, 200);
        assert_eq!(config.chunk_words, 10);
        assert_eq!(config.chunk_delay, Duration::ZERO);
        assert_eq!(config.session_ttl, Some(Duration::from_secs(3600)));
        assert!(!config.typing_before_request);
        assert!(config.verbose);
    }

    #[test]
    fn file_then_flags() {
        let file = FileConfig::from_yaml(
            "model: gpt-4.1-mini\nchunk_words: 12\ngreeting: Hello!\ntyping_before_request: false\n",
        )
        .unwrap();
        let mut config = BotConfig::new();
        config.apply_file(file);
        config.apply_args(BotArgs {
            chunk_words: Some(20),
            ..BotArgs::default()
        });

        assert_eq!(config.model, "gpt-4.1-mini");
        assert_eq!(config.chunk_words, 20);
        assert_eq!(config.greeting, "Hello!");
        assert!(!config.typing_before_request);
    }

    #[test]
    fn config_file_on_disk() {
        let path = std::env::temp_dir().join(format!("chatrelay-config-{}.yaml", std::process::id()));
        std::fs::write(&path, "history_limit: 10\ncompletion_retries: 2\n").unwrap();

        let config = BotConfig::resolve(BotArgs {
            config: Some(path.to_string_lossy().into_owned()),
            ..BotArgs::default()
        });
        std::fs::remove_file(&path).unwrap();

        let config = config.unwrap();
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.completion_retries, 2);
    }

    #[test]
    fn missing_config_file_is_io_error() {
        let err = BotConfig::resolve(BotArgs {
            config: Some("/nonexistent/chatrelay.yaml".to_string()),
            ..BotArgs::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(FileConfig::from_yaml("modle: typo\n").is_err());
    }

    #[test]
    fn validation() {
        assert!(BotConfig::new().with_chunking(0, Duration::ZERO).validate().is_err());
        assert!(BotConfig::new().with_history_limit(1).validate().is_err());
        assert!(BotConfig::new().with_max_tokens(0).validate().is_err());
        assert!(BotConfig::new().with_model(" ").validate().is_err());
        assert!(
            BotConfig::new()
                .with_session_ttl(Some(Duration::ZERO))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn credentials_from_lookup() {
        let env: HashMap<&str, &str> = [
            (TELEGRAM_TOKEN_VAR, " 123:abc\n"),
            (OPENAI_API_KEY_VAR, "sk-test"),
        ]
        .into_iter()
        .collect();
        let creds = Credentials::from_lookup(|name| env.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(creds.telegram_token, "123:abc");
        assert_eq!(creds.openai_api_key, "sk-test");
        assert!(!format!("{creds:?}").contains("sk-test"));
    }

    #[test]
    fn credentials_missing() {
        let err = Credentials::from_lookup(|name| {
            (name == TELEGRAM_TOKEN_VAR).then(|| "123:abc".to_string())
        })
        .unwrap_err();
        assert!(err.is_configuration_missing());
        assert!(err.to_string().contains(OPENAI_API_KEY_VAR));

        let err = Credentials::from_lookup(|_| Some("   ".to_string())).unwrap_err();
        assert!(err.to_string().contains(TELEGRAM_TOKEN_VAR));
    }
}
