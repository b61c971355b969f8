//! Splitting replies into word-bounded chunks and pacing their delivery.

use std::str::SplitWhitespace;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::messenger::Messenger;
use crate::observability::{CHUNKS_SENT, REPLY_WORDS, TYPING_CUES};
use crate::types::ChatId;

/// Default maximum number of words per chunk.
pub const DEFAULT_CHUNK_WORDS: usize = 30;

/// Default pause between chunks.
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(500);

/// Lazy iterator over the chunks of a reply.
///
/// Each chunk holds at most `max_words` whitespace-delimited words joined by
/// single spaces.  Word order is preserved and no word is dropped.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    words: SplitWhitespace<'a>,
    max_words: usize,
}

impl Iterator for Chunks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let first = self.words.next()?;
        let mut chunk = String::from(first);
        for word in self.words.by_ref().take(self.max_words - 1) {
            chunk.push(' ');
            chunk.push_str(word);
        }
        Some(chunk)
    }
}

/// Splits `text` into chunks of at most `max_words` words.
///
/// A `max_words` of zero is treated as one.
pub fn chunk_words(text: &str, max_words: usize) -> Chunks<'_> {
    Chunks {
        words: text.split_whitespace(),
        max_words: max_words.max(1),
    }
}

/// Something that can suspend the current task for a while.
///
/// Production code sleeps on the tokio timer; tests record the requested
/// delays instead of waiting for them.
#[async_trait::async_trait]
pub trait Pacer: Send + Sync {
    /// Suspends for `delay`.
    async fn pause(&self, delay: Duration);
}

/// [`Pacer`] backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPacer;

#[async_trait::async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Delivers a reply as a paced sequence of chunks.
///
/// The first chunk goes out immediately.  Every later chunk is preceded by a
/// typing cue and a pause of `delay`.
#[derive(Clone)]
pub struct ReplyPacer {
    max_words: usize,
    delay: Duration,
    pacer: Arc<dyn Pacer>,
}

impl ReplyPacer {
    /// Creates a pacer that sleeps on the tokio timer.
    pub fn new(max_words: usize, delay: Duration) -> Self {
        Self::with_pacer(max_words, delay, Arc::new(TokioPacer))
    }

    /// Creates a pacer with a custom [`Pacer`].
    pub fn with_pacer(max_words: usize, delay: Duration, pacer: Arc<dyn Pacer>) -> Self {
        Self {
            max_words: max_words.max(1),
            delay,
            pacer,
        }
    }

    /// Sends `text` to `chat` chunk by chunk.
    ///
    /// Text without words produces no messages.  Returns the number of
    /// chunks sent.
    ///
    /// # Errors
    ///
    /// The first failed send aborts delivery; later chunks are not sent.
    pub async fn deliver(&self, messenger: &dyn Messenger, chat: ChatId, text: &str) -> Result<usize> {
        REPLY_WORDS.add(text.split_whitespace().count() as f64);
        let mut sent = 0usize;
        for chunk in chunk_words(text, self.max_words) {
            if sent > 0 {
                messenger.send_typing(chat).await?;
                TYPING_CUES.click();
                self.pacer.pause(self.delay).await;
            }
            messenger.send_text(chat, &chunk).await?;
            CHUNKS_SENT.click();
            sent += 1;
        }
        Ok(sent)
    }
}

impl Default for ReplyPacer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_WORDS, DEFAULT_CHUNK_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Text(String),
        Typing,
        Pause(Duration),
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
        fail_on_text: Option<usize>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Messenger for Recorder {
        async fn send_text(&self, _: ChatId, text: &str) -> Result<()> {
            let mut events = self.events.lock().unwrap();
            let texts = events.iter().filter(|e| matches!(e, Event::Text(_))).count();
            if self.fail_on_text == Some(texts) {
                return Err(Error::messaging("chat not found", Some(400)));
            }
            events.push(Event::Text(text.to_string()));
            Ok(())
        }

        async fn send_typing(&self, _: ChatId) -> Result<()> {
            self.events.lock().unwrap().push(Event::Typing);
            Ok(())
        }
    }

    struct PauseLog(Arc<Recorder>);

    #[async_trait::async_trait]
    impl Pacer for PauseLog {
        async fn pause(&self, delay: Duration) {
            self.0.events.lock().unwrap().push(Event::Pause(delay));
        }
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn chunk_counts() {
        for (w, t) in [(0, 30), (1, 30), (30, 30), (31, 30), (65, 30), (7, 1), (10, 3)] {
            let text = words(w);
            let chunks: Vec<String> = chunk_words(&text, t).collect();
            assert_eq!(chunks.len(), w.div_ceil(t), "W={w} T={t}");
            for chunk in &chunks {
                assert!(chunk.split(' ').count() <= t);
            }
            let rebuilt: Vec<&str> = chunks.iter().flat_map(|c| c.split(' ')).collect();
            let original: Vec<&str> = text.split_whitespace().collect();
            assert_eq!(rebuilt, original);
        }
    }

    #[test]
    fn chunks_normalize_whitespace() {
        let chunks: Vec<String> = chunk_words("  one\ttwo\n\nthree   four ", 3).collect();
        assert_eq!(chunks, vec!["one two three", "four"]);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert_eq!(chunk_words("", 30).count(), 0);
        assert_eq!(chunk_words(" \n\t ", 30).count(), 0);
    }

    #[test]
    fn zero_threshold_is_one_word() {
        let chunks: Vec<String> = chunk_words("a b", 0).collect();
        assert_eq!(chunks, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn single_chunk_has_no_typing_cue() {
        let recorder = Arc::new(Recorder::default());
        let pacer = ReplyPacer::with_pacer(30, DEFAULT_CHUNK_DELAY, Arc::new(PauseLog(recorder.clone())));

        let sent = pacer.deliver(recorder.as_ref(), ChatId(1), "hi there").await.unwrap();
        assert_eq!(sent, 1);
        assert_eq!(recorder.events(), vec![Event::Text("hi there".to_string())]);
    }

    #[tokio::test]
    async fn sixty_five_words_in_three_paced_chunks() {
        let recorder = Arc::new(Recorder::default());
        let delay = Duration::from_millis(500);
        let pacer = ReplyPacer::with_pacer(30, delay, Arc::new(PauseLog(recorder.clone())));
        let text = words(65);

        let sent = pacer.deliver(recorder.as_ref(), ChatId(1), &text).await.unwrap();
        assert_eq!(sent, 3);

        let expected: Vec<String> = chunk_words(&text, 30).collect();
        assert_eq!(
            recorder.events(),
            vec![
                Event::Text(expected[0].clone()),
                Event::Typing,
                Event::Pause(delay),
                Event::Text(expected[1].clone()),
                Event::Typing,
                Event::Pause(delay),
                Event::Text(expected[2].clone()),
            ]
        );
        assert_eq!(expected[2].split(' ').count(), 5);
    }

    #[tokio::test]
    async fn empty_reply_sends_nothing() {
        let recorder = Arc::new(Recorder::default());
        let pacer = ReplyPacer::with_pacer(30, DEFAULT_CHUNK_DELAY, Arc::new(PauseLog(recorder.clone())));
        let sent = pacer.deliver(recorder.as_ref(), ChatId(1), "   ").await.unwrap();
        assert_eq!(sent, 0);
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn failed_send_stops_delivery() {
        let recorder = Arc::new(Recorder {
            fail_on_text: Some(1),
            ..Recorder::default()
        });
        let pacer = ReplyPacer::with_pacer(2, Duration::ZERO, Arc::new(PauseLog(recorder.clone())));

        let err = pacer
            .deliver(recorder.as_ref(), ChatId(1), "a b c d e f")
            .await
            .unwrap_err();
        assert!(err.is_messaging());
        let texts = recorder
            .events()
            .into_iter()
            .filter(|e| matches!(e, Event::Text(_)))
            .count();
        assert_eq!(texts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_pacer_waits_on_the_clock() {
        let recorder = Recorder::default();
        let pacer = ReplyPacer::new(1, Duration::from_millis(500));
        let start = tokio::time::Instant::now();

        pacer.deliver(&recorder, ChatId(1), "one two three").await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1100), "{elapsed:?}");
    }
}
