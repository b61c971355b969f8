//! Turns a conversation window into a completion.

use std::sync::Arc;

use crate::client::Completer;
use crate::error::{Error, Result};
use crate::types::{ChatCompletionParams, Turn, UserId};

/// Builds completion requests from history and runs them.
///
/// The requester prepends the configured system prompt, calls the
/// [`Completer`] once, and returns the trimmed reply.  It never retries and
/// never touches the history store.
#[derive(Clone)]
pub struct CompletionRequester {
    completer: Arc<dyn Completer>,
    model: String,
    system_prompt: String,
    max_tokens: u32,
}

impl CompletionRequester {
    /// Creates a requester for `model` that frames every request with `system_prompt`.
    pub fn new(
        completer: Arc<dyn Completer>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            completer,
            model: model.into(),
            system_prompt: system_prompt.into(),
            max_tokens,
        }
    }

    /// The model identifier sent with each request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Assembles the request: system prompt first, then history in order.
    pub fn build_params(&self, history: &[Turn]) -> ChatCompletionParams {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Turn::system(self.system_prompt.clone()));
        messages.extend(history.iter().cloned());
        ChatCompletionParams::new(self.model.clone(), messages, self.max_tokens)
    }

    /// Requests a completion for `history`, which must already end with the
    /// new user turn.
    ///
    /// # Errors
    ///
    /// Any transport, provider or decoding failure.  A response without
    /// usable text is reported as [`Error::MalformedResponse`].
    pub async fn request(&self, user: UserId, history: &[Turn]) -> Result<String> {
        let params = self.build_params(history);
        tracing::debug!(
            user = %user,
            model = %self.model,
            turns = params.messages.len(),
            "requesting completion"
        );
        let completion = self.completer.complete(params).await?;
        if let Some(usage) = completion.usage {
            tracing::debug!(
                user = %user,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion usage"
            );
        }
        let text = completion
            .text()
            .map(str::trim)
            .ok_or_else(|| Error::malformed_response("completion carried no message content"))?;
        if text.is_empty() {
            return Err(Error::malformed_response("completion text is empty"));
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::types::{ChatCompletion, Choice, ChoiceMessage, Role};
    use std::sync::Mutex;

    struct Canned {
        reply: Result<ChatCompletion>,
        seen: Mutex<Vec<ChatCompletionParams>>,
    }

    impl Canned {
        fn new(reply: Result<ChatCompletion>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl Completer for Canned {
        async fn complete(&self, params: ChatCompletionParams) -> Result<ChatCompletion> {
            self.seen.lock().unwrap().push(params);
            self.reply.clone()
        }
    }

    fn completion(content: Option<&str>) -> ChatCompletion {
        ChatCompletion {
            id: "chatcmpl-1".to_string(),
            model: "gpt-4o-mini".to_string(),
            choices: vec![Choice {
                index: 0,
                message: ChoiceMessage {
                    role: Role::Assistant,
                    content: content.map(String::from),
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        }
    }

    #[test]
    fn system_prompt_comes_first() {
        let canned = Canned::new(Ok(completion(Some("ok"))));
        let requester = CompletionRequester::new(canned, "gpt-4o-mini", "Be friendly.", 128);
        let history = vec![
            Turn::user("hello"),
            Turn::assistant("hi"),
            Turn::user("how are you?"),
        ];

        let params = requester.build_params(&history);
        assert_eq!(params.model, "gpt-4o-mini");
        assert_eq!(params.max_tokens, 128);
        assert_eq!(params.messages[0], Turn::system("Be friendly."));
        assert_eq!(&params.messages[1..], &history[..]);
    }

    #[tokio::test]
    async fn reply_is_trimmed() {
        let canned = Canned::new(Ok(completion(Some("\n  hi there  \n"))));
        let requester = CompletionRequester::new(canned.clone(), "m", "s", 64);

        let reply = requester
            .request(UserId(1), &[Turn::user("hello")])
            .await
            .unwrap();
        assert_eq!(reply, "hi there");
        assert_eq!(canned.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_content_is_malformed() {
        for content in [None, Some("   ")] {
            let canned = Canned::new(Ok(completion(content)));
            let requester = CompletionRequester::new(canned, "m", "s", 64);
            let err = requester
                .request(UserId(1), &[Turn::user("hello")])
                .await
                .unwrap_err();
            assert_eq!(err.failure_kind(), FailureKind::Malformed);
        }
    }

    #[tokio::test]
    async fn provider_errors_pass_through_once() {
        let canned = Canned::new(Err(Error::service_unavailable("overloaded", None)));
        let requester = CompletionRequester::new(canned.clone(), "m", "s", 64);

        let err = requester
            .request(UserId(1), &[Turn::user("hello")])
            .await
            .unwrap_err();
        assert!(err.is_server_error());
        assert_eq!(canned.seen.lock().unwrap().len(), 1);
    }
}
