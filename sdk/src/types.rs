//! Conversation and session domain types
//!
//! The `Turn` sum type replaces the duck-typed human/assistant message
//! classes of older chat stores: role-dependent behavior is exhaustively
//! matched, never probed at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One stored message within a session, tagged by who produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum Turn {
    /// A message typed by the user
    Human(String),

    /// A message produced by the assistant
    Assistant(String),
}

impl Turn {
    /// Create a new human turn
    pub fn human(content: impl Into<String>) -> Self {
        Self::Human(content.into())
    }

    /// Create a new assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant(content.into())
    }

    /// The message text, regardless of role
    pub fn content(&self) -> &str {
        match self {
            Self::Human(c) | Self::Assistant(c) => c,
        }
    }

    /// The storage tag for this role ("human" or "assistant")
    pub fn role(&self) -> &'static str {
        match self {
            Self::Human(_) => "human",
            Self::Assistant(_) => "assistant",
        }
    }
}

/// The category determining which handler processes a request.
///
/// The catch-all is `Qna`; anything the classifier cannot place lands there
/// rather than failing the request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Free-form question answering (catch-all)
    Qna,

    /// Study-plan / learning-path consultation
    Planner,

    /// Guided lesson study
    Learning,

    /// Exam and essay review
    Reviewer,

    /// Speaking practice
    Speaking,
}

impl Intent {
    /// All intents, in classifier-vocabulary order
    pub const ALL: [Intent; 5] = [
        Intent::Qna,
        Intent::Planner,
        Intent::Learning,
        Intent::Reviewer,
        Intent::Speaking,
    ];

    /// The lowercase label used in classifier output and session type tags
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Qna => "qna",
            Intent::Planner => "planner",
            Intent::Learning => "learning",
            Intent::Reviewer => "reviewer",
            Intent::Speaking => "speaking",
        }
    }

    /// Parse a label, case-insensitively. Returns `None` for anything
    /// outside the vocabulary (including non-intent session types such as
    /// "GENERAL").
    pub fn parse(label: &str) -> Option<Intent> {
        match label.trim().to_lowercase().as_str() {
            "qna" => Some(Intent::Qna),
            "planner" => Some(Intent::Planner),
            "learning" => Some(Intent::Learning),
            "reviewer" => Some(Intent::Reviewer),
            "speaking" => Some(Intent::Speaking),
            _ => None,
        }
    }

    /// Parse a label, falling back to the catch-all on anything
    /// out-of-vocabulary. This is the documented ambiguity policy.
    pub fn parse_or_default(label: &str) -> Intent {
        Self::parse(label).unwrap_or(Intent::Qna)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one session, as returned by session listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    /// System-generated session identifier
    pub id: i64,

    /// Human-readable session name
    pub name: String,

    /// Last-updated timestamp, epoch milliseconds
    pub updated_at: i64,
}

/// Full session record, as returned by `load_session`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    /// Owning user identifier
    pub user_id: String,

    /// Session type tag (GENERAL, PLANNER, STUDY, ... or an intent label)
    pub session_type: String,

    /// Opaque handler-specific context payload
    pub context: Option<serde_json::Value>,

    /// Full ordered message sequence
    pub history: Vec<Turn>,
}
