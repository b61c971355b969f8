use serde::{Deserialize, Serialize};

use crate::types::{Role, Turn};

/// Request body for a chat-completion call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionParams {
    /// Model identifier, e.g. `gpt-4o-mini`.
    pub model: String,

    /// Ordered conversation, system prompt first.
    pub messages: Vec<Turn>,

    /// Cap on the length of the generated reply, in tokens.
    pub max_tokens: u32,
}

impl ChatCompletionParams {
    /// Create a new `ChatCompletionParams`.
    pub fn new(model: impl Into<String>, messages: Vec<Turn>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens,
        }
    }
}

/// The message carried by a completion choice.
///
/// `content` is optional because providers return `null` for refusals and
/// tool-only replies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChoiceMessage {
    /// Role of the generated message; always `assistant` in practice.
    pub role: Role,

    /// Generated text, if any.
    #[serde(default)]
    pub content: Option<String>,
}

/// One candidate completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    /// Position of this choice in the response.
    #[serde(default)]
    pub index: u32,

    /// The generated message.
    pub message: ChoiceMessage,

    /// Why generation stopped (`stop`, `length`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Token accounting for a completion call.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CompletionUsage {
    /// Tokens in the request.
    pub prompt_tokens: u64,

    /// Tokens in the reply.
    pub completion_tokens: u64,

    /// Sum of the two.
    pub total_tokens: u64,
}

/// Response body of a successful chat-completion call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    /// Provider-assigned identifier.
    #[serde(default)]
    pub id: String,

    /// Model that actually served the request.
    #[serde(default)]
    pub model: String,

    /// Candidate completions; the relay only ever reads the first.
    #[serde(default)]
    pub choices: Vec<Choice>,

    /// Token usage, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<CompletionUsage>,
}

impl ChatCompletion {
    /// Text of the first choice, if the provider returned any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn params_serialization() {
        let params = ChatCompletionParams::new(
            "gpt-4o-mini",
            vec![Turn::system("Be friendly."), Turn::user("hello")],
            256,
        );

        assert_eq!(
            to_value(&params).unwrap(),
            json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "Be friendly."},
                    {"role": "user", "content": "hello"}
                ],
                "max_tokens": 256
            })
        );
    }

    #[test]
    fn completion_deserialization() {
        let completion: ChatCompletion = serde_json::from_value(json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "  hi there \n"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }))
        .unwrap();

        assert_eq!(completion.text(), Some("  hi there \n"));
        assert_eq!(completion.usage.map(|u| u.total_tokens), Some(15));
        assert_eq!(completion.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn completion_without_content() {
        let completion: ChatCompletion = serde_json::from_value(json!({
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": null}
            }]
        }))
        .unwrap();
        assert_eq!(completion.text(), None);

        let completion: ChatCompletion = serde_json::from_value(json!({"choices": []})).unwrap();
        assert_eq!(completion.text(), None);
    }
}
