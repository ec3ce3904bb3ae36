//! Dispatcher integration tests
//!
//! Exercises the full routing state machine against an in-memory database,
//! with scripted classifier and agents standing in for the external LLM.

use async_trait::async_trait;
use std::sync::Arc;

use kotoba_engine::agent::{AgentHandler, AgentRegistry, AgentRequest, AgentResponse};
use kotoba_engine::classifier::IntentClassifier;
use kotoba_engine::db::Database;
use kotoba_engine::dispatcher::{
    DispatchError, DispatchOutcome, DispatchRequest, Dispatcher, UNSUPPORTED_REPLY,
};
use kotoba_engine::session::SessionService;
use sdk::errors::CoreError;
use sdk::types::{Intent, Turn};

/// Classifier scripted by keyword: "plan" → planner, everything else → qna.
struct ScriptedClassifier;

#[async_trait]
impl IntentClassifier for ScriptedClassifier {
    async fn classify(&self, text: &str) -> Intent {
        if text.to_lowercase().contains("plan") {
            Intent::Planner
        } else {
            Intent::Qna
        }
    }
}

/// Agent echoing its input plus the history length it was handed.
struct EchoAgent;

#[async_trait]
impl AgentHandler for EchoAgent {
    fn name(&self) -> &str {
        "echo"
    }

    async fn handle(&self, request: AgentRequest) -> anyhow::Result<AgentResponse> {
        Ok(AgentResponse {
            output: format!("echo[{}]:{}", request.chat_history.len(), request.input),
        })
    }
}

/// Agent that always fails.
struct BrokenAgent;

#[async_trait]
impl AgentHandler for BrokenAgent {
    fn name(&self) -> &str {
        "broken"
    }

    async fn handle(&self, _request: AgentRequest) -> anyhow::Result<AgentResponse> {
        anyhow::bail!("model unavailable")
    }
}

fn echo_registry(intents: &[Intent]) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    let agent: Arc<dyn AgentHandler> = Arc::new(EchoAgent);
    for intent in intents {
        registry.register(*intent, Arc::clone(&agent));
    }
    registry
}

async fn dispatcher_with(registry: AgentRegistry) -> (Database, Dispatcher) {
    let db = Database::new_in_memory().await.unwrap();
    let sessions = SessionService::new(db.sessions());
    let dispatcher = Dispatcher::new(sessions, Arc::new(ScriptedClassifier), registry);
    (db, dispatcher)
}

fn plain(user_id: &str, session_id: Option<i64>, input: &str) -> DispatchRequest {
    DispatchRequest {
        user_id: user_id.to_string(),
        session_id,
        user_input: input.to_string(),
        redirect_to: None,
        original_question: None,
    }
}

#[tokio::test]
async fn fresh_message_creates_typed_session_and_commits_pair() {
    let (_db, dispatcher) = dispatcher_with(echo_registry(&[Intent::Qna, Intent::Planner])).await;

    let outcome = dispatcher
        .dispatch(plain("u1", None, "help me plan my studies"))
        .await
        .unwrap();

    let DispatchOutcome::Answer { session_id, output } = outcome else {
        panic!("expected an answer");
    };
    assert_eq!(output, "echo[0]:help me plan my studies");

    let data = dispatcher
        .sessions()
        .load_session(session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(data.session_type, "planner");
    assert_eq!(
        data.history,
        vec![
            Turn::human("help me plan my studies"),
            Turn::assistant("echo[0]:help me plan my studies"),
        ]
    );

    let sessions = dispatcher.sessions().list_sessions("u1").await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].name, "Session planner");
}

#[tokio::test]
async fn agreeing_session_passes_history_to_handler() {
    let (_db, dispatcher) = dispatcher_with(echo_registry(&[Intent::Qna])).await;

    let DispatchOutcome::Answer { session_id, .. } = dispatcher
        .dispatch(plain("u1", None, "hello"))
        .await
        .unwrap()
    else {
        panic!("expected an answer");
    };

    // Second turn into the same qna session: handler sees the stored pair
    let outcome = dispatcher
        .dispatch(plain("u1", Some(session_id), "and again"))
        .await
        .unwrap();

    let DispatchOutcome::Answer { output, .. } = outcome else {
        panic!("expected an answer");
    };
    assert_eq!(output, "echo[2]:and again");

    let data = dispatcher
        .sessions()
        .load_session(session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(data.history.len(), 4);
}

#[tokio::test]
async fn intent_mismatch_proposes_redirect_without_mutation() {
    let (_db, dispatcher) = dispatcher_with(echo_registry(&[Intent::Qna, Intent::Planner])).await;

    let DispatchOutcome::Answer { session_id, .. } = dispatcher
        .dispatch(plain("u1", None, "hello"))
        .await
        .unwrap()
    else {
        panic!("expected an answer");
    };

    let outcome = dispatcher
        .dispatch(plain("u1", Some(session_id), "now plan my N3 studies"))
        .await
        .unwrap();

    let DispatchOutcome::RedirectProposal {
        session_id: proposed_sid,
        redirect_to,
        original_question,
        ..
    } = outcome
    else {
        panic!("expected a redirect proposal");
    };
    assert_eq!(proposed_sid, session_id);
    assert_eq!(redirect_to, "planner");
    assert_eq!(original_question, "now plan my N3 studies");

    // Detection alone wrote nothing: no new session, no extra turns
    assert_eq!(dispatcher.sessions().list_sessions("u1").await.len(), 1);
    let data = dispatcher
        .sessions()
        .load_session(session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(data.history.len(), 2);
    assert_eq!(data.session_type, "qna");
}

#[tokio::test]
async fn confirmed_redirect_opens_fresh_session_with_original_question() {
    let (_db, dispatcher) = dispatcher_with(echo_registry(&[Intent::Qna, Intent::Planner])).await;

    let DispatchOutcome::Answer {
        session_id: old_sid,
        ..
    } = dispatcher
        .dispatch(plain("u1", None, "hello"))
        .await
        .unwrap()
    else {
        panic!("expected an answer");
    };

    let outcome = dispatcher
        .dispatch(DispatchRequest {
            user_id: "u1".to_string(),
            session_id: Some(old_sid),
            user_input: "yes, switch".to_string(),
            redirect_to: Some("planner".to_string()),
            original_question: Some("now plan my N3 studies".to_string()),
        })
        .await
        .unwrap();

    let DispatchOutcome::Answer { session_id, output } = outcome else {
        panic!("expected an answer");
    };
    assert_ne!(session_id, old_sid);
    assert_eq!(output, "echo[0]:now plan my N3 studies");

    let new_data = dispatcher
        .sessions()
        .load_session(session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(new_data.session_type, "planner");
    assert_eq!(new_data.history[0], Turn::human("now plan my N3 studies"));

    // The old session kept its type and history
    let old_data = dispatcher
        .sessions()
        .load_session(old_sid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(old_data.session_type, "qna");
    assert_eq!(old_data.history.len(), 2);
}

#[tokio::test]
async fn unregistered_intent_is_unsupported_and_commits_nothing() {
    // Planner classified, but only qna is registered
    let (_db, dispatcher) = dispatcher_with(echo_registry(&[Intent::Qna])).await;

    let outcome = dispatcher
        .dispatch(plain("u1", None, "plan something"))
        .await
        .unwrap();

    let DispatchOutcome::Unsupported { session_id, reply } = outcome else {
        panic!("expected unsupported");
    };
    assert_eq!(reply, UNSUPPORTED_REPLY);

    let data = dispatcher
        .sessions()
        .load_session(session_id)
        .await
        .unwrap()
        .unwrap();
    assert!(data.history.is_empty());
}

#[tokio::test]
async fn unknown_session_id_is_not_found() {
    let (_db, dispatcher) = dispatcher_with(echo_registry(&[Intent::Qna])).await;

    let err = dispatcher
        .dispatch(plain("u1", Some(12345), "hello"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Core(CoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn agent_failure_commits_no_turn() {
    let mut registry = AgentRegistry::new();
    registry.register(Intent::Qna, Arc::new(BrokenAgent));
    let (_db, dispatcher) = dispatcher_with(registry).await;

    let err = dispatcher
        .dispatch(plain("u1", None, "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Agent(_)));

    // The session was created on the resolution path, but no turn landed
    let sessions = dispatcher.sessions().list_sessions("u1").await;
    assert_eq!(sessions.len(), 1);
    let data = dispatcher
        .sessions()
        .load_session(sessions[0].id)
        .await
        .unwrap()
        .unwrap();
    assert!(data.history.is_empty());
}

#[tokio::test]
async fn resubmit_replaces_last_pair_with_corrected_turn() {
    let (_db, dispatcher) = dispatcher_with(echo_registry(&[Intent::Qna])).await;

    let DispatchOutcome::Answer { session_id, .. } = dispatcher
        .dispatch(plain("u1", None, "first"))
        .await
        .unwrap()
    else {
        panic!("expected an answer");
    };
    dispatcher
        .dispatch(plain("u1", Some(session_id), "secnd"))
        .await
        .unwrap();

    let outcome = dispatcher.resubmit(session_id, "second").await.unwrap();
    let DispatchOutcome::Answer { output, .. } = outcome else {
        panic!("expected an answer");
    };
    // Handler saw the history as it stood after the rewind (one pair)
    assert_eq!(output, "echo[2]:second");

    let data = dispatcher
        .sessions()
        .load_session(session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        data.history,
        vec![
            Turn::human("first"),
            Turn::assistant("echo[0]:first"),
            Turn::human("second"),
            Turn::assistant("echo[2]:second"),
        ]
    );
}

#[tokio::test]
async fn resubmit_without_enough_history_is_refused() {
    let (_db, dispatcher) = dispatcher_with(echo_registry(&[Intent::Qna])).await;

    let sid = dispatcher
        .sessions()
        .create_session("u1", "Empty", "qna", None)
        .await
        .unwrap();

    let err = dispatcher.resubmit(sid, "corrected").await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Core(CoreError::InsufficientHistory)
    ));

    // Nothing was appended by the refusal
    let data = dispatcher
        .sessions()
        .load_session(sid)
        .await
        .unwrap()
        .unwrap();
    assert!(data.history.is_empty());
}

#[tokio::test]
async fn resubmit_on_non_intent_type_falls_back_to_qna_handler() {
    let (_db, dispatcher) = dispatcher_with(echo_registry(&[Intent::Qna])).await;

    let sid = dispatcher
        .sessions()
        .create_session("u1", "Study", "STUDY", None)
        .await
        .unwrap();
    dispatcher
        .sessions()
        .repo()
        .append_turns(sid, &[Turn::human("h1"), Turn::assistant("a1")])
        .await
        .unwrap();

    let outcome = dispatcher.resubmit(sid, "h1 corrected").await.unwrap();
    let DispatchOutcome::Answer { output, .. } = outcome else {
        panic!("expected an answer");
    };
    assert_eq!(output, "echo[0]:h1 corrected");
}
