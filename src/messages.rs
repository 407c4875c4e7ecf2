//! Minimal message types the call wrapper needs for token estimation and redaction.
//!
//! Trimmed from the teacher's `core_types::messages` module: the control plane
//! does not need tool-call content or caching metadata, only enough structure
//! to estimate tokens and extract redactable text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a message within a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in a prompt passed to [`crate::provider::ProviderCallable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedMessage {
    pub role: MessageRole,
    pub content: String,
}

impl UnifiedMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Concatenates message content in order, the text body the redactor and
/// token estimator both operate on.
pub fn concat_text(messages: &[UnifiedMessage]) -> String {
    messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_text_joins_in_order() {
        let messages = vec![
            UnifiedMessage::system("be terse"),
            UnifiedMessage::user("hello"),
        ];
        assert_eq!(concat_text(&messages), "be terse\nhello");
    }
}
