//! Agent handlers
//!
//! Handlers are the opaque specialists behind the dispatcher: each consumes
//! the resolved session, the user's message, and the typed history, and
//! produces one reply. Their internals (prompting strategy, tools, retrieval)
//! are none of the engine's business; the engine only owns the contract and
//! the registry the dispatcher resolves intents against.

use async_trait::async_trait;
use sdk::types::{Intent, Turn};
use std::collections::HashMap;
use std::sync::Arc;

use crate::history;
use crate::llm::LlmClient;

/// Input to a handler invocation
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Resolved session the turn belongs to
    pub session_id: i64,

    /// Owning user
    pub user_id: String,

    /// The user's message for this turn
    pub input: String,

    /// Full ordered history of the session, oldest first
    pub chat_history: Vec<Turn>,
}

/// Output of a handler invocation
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// The reply to store and return verbatim
    pub output: String,
}

/// An opaque external agent
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// Handler name, used for logging
    fn name(&self) -> &str;

    /// Produce a reply for one turn
    async fn handle(&self, request: AgentRequest) -> anyhow::Result<AgentResponse>;
}

/// Handler table keyed by intent.
///
/// Intents without a registered handler resolve to the fixed unsupported
/// reply at dispatch time; registration is how deployments scope which
/// features are live.
#[derive(Default)]
pub struct AgentRegistry {
    handlers: HashMap<Intent, Arc<dyn AgentHandler>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an intent, replacing any previous one.
    pub fn register(&mut self, intent: Intent, handler: Arc<dyn AgentHandler>) -> &mut Self {
        self.handlers.insert(intent, handler);
        self
    }

    /// Look up the handler for an intent.
    pub fn get(&self, intent: Intent) -> Option<Arc<dyn AgentHandler>> {
        self.handlers.get(&intent).map(Arc::clone)
    }

    /// Registered intents, for diagnostics.
    pub fn intents(&self) -> Vec<Intent> {
        self.handlers.keys().copied().collect()
    }
}

/// Stock handler that renders the history and delegates to an LLM backend.
///
/// This is the default wiring for every intent in the CLI and server; a
/// deployment can swap any intent for a richer external agent without the
/// dispatcher noticing.
pub struct LlmAgent {
    name: String,
    instruction: String,
    llm: Arc<dyn LlmClient>,
}

impl LlmAgent {
    /// `instruction` is a short role description prepended to every prompt,
    /// e.g. "You help learners of Japanese practice speaking."
    pub fn new(
        name: impl Into<String>,
        instruction: impl Into<String>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            llm,
        }
    }
}

#[async_trait]
impl AgentHandler for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, request: AgentRequest) -> anyhow::Result<AgentResponse> {
        let prompt = format!(
            "{}\n\nConversation so far:\n{}\n\n{}: {}\n{}:",
            self.instruction,
            history::to_prompt_text(&request.chat_history),
            history::HUMAN_LABEL,
            request.input,
            history::ASSISTANT_LABEL,
        );

        let output = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|e| anyhow::anyhow!("agent {} failed: {e}", self.name))?;

        Ok(AgentResponse { output })
    }
}
