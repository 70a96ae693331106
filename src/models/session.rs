//! Conversation turn model persisted by the session store.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Message sent to the agent.
    User,
    /// Message produced by the agent.
    Assistant,
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

/// A single role-tagged message within a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    /// Who produced the message.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl Turn {
    /// Construct a turn.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Mint a fresh opaque session identifier (128 random bits, hex).
#[must_use]
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Build the cumulative prompt for `message` given prior `history`.
///
/// Turn contents are joined with `\n` and the new message follows after one
/// more `\n`. Empty history leaves the message unchanged.
#[must_use]
pub fn compose_prompt(history: &[Turn], message: &str) -> String {
    if history.is_empty() {
        return message.to_owned();
    }
    let mut prompt = history
        .iter()
        .map(|turn| turn.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    prompt.push('\n');
    prompt.push_str(message);
    prompt
}
