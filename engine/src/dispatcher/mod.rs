//! Intent router / dispatcher
//!
//! One entry point per incoming chat turn. The dispatcher classifies the
//! message, resolves (or creates) the session it belongs to, hands the turn
//! to the registered handler for the resolved intent, and commits the
//! human/assistant pair — in that order, and only on the path that actually
//! produced an answer.
//!
//! Topic switches are two-phase: detecting that an established session's
//! type disagrees with the freshly classified intent yields a
//! redirect proposal carrying everything the caller needs to re-issue the
//! request explicitly. Nothing is written until the caller confirms, so an
//! in-progress task context can never be orphaned by a silent switch.

use sdk::errors::CoreError;
use sdk::types::{Intent, Turn};
use std::sync::Arc;
use tracing::{info, warn};

use crate::agent::{AgentRegistry, AgentRequest};
use crate::classifier::IntentClassifier;
use crate::session::SessionService;

/// Fixed reply for intents with no registered handler
pub const UNSUPPORTED_REPLY: &str = "Xin lỗi, tôi chưa hỗ trợ chức năng này.";

/// User-facing notice attached to a redirect proposal
fn redirect_notice(intent: Intent) -> String {
    format!("Bạn đang hỏi về chủ đề '{intent}'. Hệ thống sẽ chuyển sang chế độ phù hợp.")
}

/// Errors surfaced by dispatch
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The external agent failed to produce a reply; no turn was committed.
    #[error("Agent failure: {0}")]
    Agent(String),
}

/// One incoming chat request
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub user_id: String,

    /// Existing session to continue, if any
    pub session_id: Option<i64>,

    pub user_input: String,

    /// Caller-confirmed topic switch: the intent label to open a fresh
    /// session for
    pub redirect_to: Option<String>,

    /// The question that triggered the redirect proposal, re-submitted into
    /// the fresh session
    pub original_question: Option<String>,
}

/// What a dispatch produced
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A handler answered; the turn pair is committed.
    Answer { session_id: i64, output: String },

    /// The detected intent disagrees with the session's stored type. No
    /// state was mutated; the caller must confirm before a redirect session
    /// is created.
    RedirectProposal {
        session_id: i64,
        notice: String,
        redirect_to: String,
        original_question: String,
    },

    /// No handler is registered for the resolved intent. No turn was
    /// committed.
    Unsupported { session_id: i64, reply: String },
}

/// The dispatcher, constructed once at process start with its collaborators
/// passed in explicitly.
pub struct Dispatcher {
    sessions: SessionService,
    classifier: Arc<dyn IntentClassifier>,
    agents: AgentRegistry,
}

impl Dispatcher {
    pub fn new(
        sessions: SessionService,
        classifier: Arc<dyn IntentClassifier>,
        agents: AgentRegistry,
    ) -> Self {
        Self {
            sessions,
            classifier,
            agents,
        }
    }

    /// Session lifecycle access for surface layers sharing this dispatcher.
    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    /// Route one chat turn.
    pub async fn dispatch(&self, req: DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        let DispatchRequest {
            user_id,
            session_id,
            user_input,
            redirect_to,
            original_question,
        } = req;

        let (session_id, intent, input, chat_history) = if let Some(redirect) = redirect_to {
            // Caller-confirmed switch: open a fresh session of the new type
            // and re-submit the original question. The old session keeps its
            // type and history untouched.
            let intent = Intent::parse_or_default(&redirect);
            let sid = self
                .sessions
                .create_session(&user_id, &format!("Session {intent}"), intent.as_str(), None)
                .await?;
            info!(session_id = sid, %intent, "Opened redirect session");

            let input = original_question.unwrap_or(user_input);
            (sid, intent, input, Vec::new())
        } else if let Some(sid) = session_id {
            let data = self
                .sessions
                .load_session(sid)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("session {sid}")))?;

            let detected = self.classifier.classify(&user_input).await;

            // The stored type wins over re-classification, but disagreement
            // means the user changed topic: propose, don't hijack.
            if detected.as_str() != data.session_type.to_lowercase() {
                info!(
                    session_id = sid,
                    stored = %data.session_type,
                    detected = %detected,
                    "Intent mismatch, proposing redirect"
                );
                return Ok(DispatchOutcome::RedirectProposal {
                    session_id: sid,
                    notice: redirect_notice(detected),
                    redirect_to: detected.as_str().to_string(),
                    original_question: user_input,
                });
            }

            (sid, detected, user_input, data.history)
        } else {
            // No session, no redirect: classify fresh and open a session of
            // the detected type.
            let detected = self.classifier.classify(&user_input).await;
            let sid = self
                .sessions
                .create_session(
                    &user_id,
                    &format!("Session {detected}"),
                    detected.as_str(),
                    None,
                )
                .await?;
            (sid, detected, user_input, Vec::new())
        };

        let Some(agent) = self.agents.get(intent) else {
            warn!(%intent, session_id, "No handler registered for intent");
            return Ok(DispatchOutcome::Unsupported {
                session_id,
                reply: UNSUPPORTED_REPLY.to_string(),
            });
        };

        let response = agent
            .handle(AgentRequest {
                session_id,
                user_id,
                input: input.clone(),
                chat_history,
            })
            .await
            .map_err(|e| DispatchError::Agent(e.to_string()))?;

        self.sessions
            .repo()
            .append_turns(
                session_id,
                &[Turn::human(input), Turn::assistant(response.output.clone())],
            )
            .await?;

        Ok(DispatchOutcome::Answer {
            session_id,
            output: response.output,
        })
    }

    /// Rewind the last pair and re-run the session's own handler on the
    /// corrected input.
    ///
    /// "Editing" is strictly delete-then-re-append: the stale pair is gone
    /// before the handler runs, and the corrected pair is committed with the
    /// freed order numbers.
    pub async fn resubmit(
        &self,
        session_id: i64,
        corrected_input: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        let rewound = self.sessions.repo().rewind_last_turn(session_id).await?;
        if !rewound {
            return Err(CoreError::InsufficientHistory.into());
        }

        let data = self
            .sessions
            .load_session(session_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("session {session_id}")))?;

        // The session's stored type picks the handler directly; editing a
        // turn is never a topic switch. Unknown types fall back to the
        // catch-all handler.
        let intent = Intent::parse_or_default(&data.session_type);
        let agent = self
            .agents
            .get(intent)
            .or_else(|| self.agents.get(Intent::Qna));

        let Some(agent) = agent else {
            return Ok(DispatchOutcome::Unsupported {
                session_id,
                reply: UNSUPPORTED_REPLY.to_string(),
            });
        };

        let response = agent
            .handle(AgentRequest {
                session_id,
                user_id: data.user_id,
                input: corrected_input.to_string(),
                chat_history: data.history,
            })
            .await
            .map_err(|e| DispatchError::Agent(e.to_string()))?;

        self.sessions
            .repo()
            .append_turns(
                session_id,
                &[
                    Turn::human(corrected_input),
                    Turn::assistant(response.output.clone()),
                ],
            )
            .await?;

        Ok(DispatchOutcome::Answer {
            session_id,
            output: response.output,
        })
    }
}
