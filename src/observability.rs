use biometrics::{Collector, Counter, Moments};
use tracing_subscriber::EnvFilter;

pub(crate) static INBOUND_MESSAGES: Counter = Counter::new("chatrelay.session.inbound_messages");
pub(crate) static SESSION_RESETS: Counter = Counter::new("chatrelay.session.resets");
pub(crate) static SESSIONS_EVICTED: Counter = Counter::new("chatrelay.session.evicted");

pub(crate) static COMPLETION_REQUESTS: Counter = Counter::new("chatrelay.completion.requests");
pub(crate) static COMPLETION_REQUEST_ERRORS: Counter =
    Counter::new("chatrelay.completion.request_errors");
pub(crate) static COMPLETION_FAILURES: Counter = Counter::new("chatrelay.completion.failures");
pub(crate) static COMPLETION_RETRIES: Counter = Counter::new("chatrelay.completion.retries");
pub(crate) static COMPLETION_DURATION: Moments =
    Moments::new("chatrelay.completion.duration_seconds");

pub(crate) static CHUNKS_SENT: Counter = Counter::new("chatrelay.delivery.chunks_sent");
pub(crate) static TYPING_CUES: Counter = Counter::new("chatrelay.delivery.typing_cues");
pub(crate) static DELIVERY_ERRORS: Counter = Counter::new("chatrelay.delivery.errors");
pub(crate) static REPLY_WORDS: Moments = Moments::new("chatrelay.delivery.reply_words");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&INBOUND_MESSAGES);
    collector.register_counter(&SESSION_RESETS);
    collector.register_counter(&SESSIONS_EVICTED);

    collector.register_counter(&COMPLETION_REQUESTS);
    collector.register_counter(&COMPLETION_REQUEST_ERRORS);
    collector.register_counter(&COMPLETION_FAILURES);
    collector.register_counter(&COMPLETION_RETRIES);
    collector.register_moments(&COMPLETION_DURATION);

    collector.register_counter(&CHUNKS_SENT);
    collector.register_counter(&TYPING_CUES);
    collector.register_counter(&DELIVERY_ERRORS);
    collector.register_moments(&REPLY_WORDS);
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level is `debug` when `verbose`
/// and `info` when not.  Calling this twice is harmless: the second
/// installation is ignored.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
