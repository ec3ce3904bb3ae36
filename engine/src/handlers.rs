//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - serve: Run the REST API server
//! - chat: Dispatch one message and print the reply
//! - sessions: List a user's sessions
//! - history: Show a session's message history
//!
//! All engine collaborators (database, classifier, agents) are constructed
//! here, once, and passed in by reference — nothing is initialized at import
//! time or stashed in globals.

use anyhow::{Context, Result};
use sdk::types::{Intent, Turn};
use std::sync::Arc;

use crate::agent::{AgentRegistry, LlmAgent};
use crate::api::{self, AppState, ChatResponse};
use crate::classifier::{IntentClassifier, KeywordTable, LlmClassifier, RoutingClassifier};
use crate::config::Config;
use crate::db::Database;
use crate::dispatcher::{DispatchRequest, Dispatcher};
use crate::llm::{LlmClient, OpenAiClient};
use crate::session::SessionService;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Open the database and assemble the dispatcher with the default wiring:
/// keyword fast path over an LLM classifier, and one stock LLM agent per
/// intent.
async fn build_dispatcher(config: &Config) -> Result<(Database, Arc<Dispatcher>)> {
    let database = Database::new(&config.db_path())
        .await
        .context("Failed to open database")?;

    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(config.llm.clone()));

    let keywords = KeywordTable::from_pairs(
        config
            .classifier
            .keywords
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str())),
    );
    let classifier: Arc<dyn IntentClassifier> = Arc::new(RoutingClassifier::new(
        keywords,
        Arc::new(LlmClassifier::new(Arc::clone(&llm))),
    ));

    let mut agents = AgentRegistry::new();
    agents
        .register(
            Intent::Qna,
            Arc::new(LlmAgent::new(
                "qna",
                "You are a helpful assistant for Vietnamese learners of Japanese. \
                 Answer the user's question clearly, in Vietnamese.",
                Arc::clone(&llm),
            )),
        )
        .register(
            Intent::Planner,
            Arc::new(LlmAgent::new(
                "planner",
                "You help learners design a Japanese study path. Ask for any \
                 missing preferences before proposing a plan.",
                Arc::clone(&llm),
            )),
        )
        .register(
            Intent::Learning,
            Arc::new(LlmAgent::new(
                "learning",
                "You guide the learner through their current study material, \
                 one step at a time.",
                Arc::clone(&llm),
            )),
        )
        .register(
            Intent::Reviewer,
            Arc::new(LlmAgent::new(
                "reviewer",
                "You review the learner's Japanese writing and give concrete \
                 corrections with short explanations.",
                Arc::clone(&llm),
            )),
        )
        .register(
            Intent::Speaking,
            Arc::new(LlmAgent::new(
                "speaking",
                "You run a Japanese speaking-practice conversation, gently \
                 correcting mistakes as you go.",
                Arc::clone(&llm),
            )),
        );

    let sessions = SessionService::new(database.sessions());
    let dispatcher = Arc::new(Dispatcher::new(sessions, classifier, agents));

    Ok((database, dispatcher))
}

/// Run the REST API server until interrupted.
pub async fn handle_serve(config: &Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    let (database, dispatcher) = build_dispatcher(config).await?;

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    api::serve(AppState { dispatcher }, &host, port).await?;

    database.close().await?;
    Ok(())
}

/// Dispatch one chat message and print the reply.
pub async fn handle_chat(
    config: &Config,
    user: String,
    session: Option<i64>,
    message: String,
    format: OutputFormat,
) -> Result<()> {
    let (database, dispatcher) = build_dispatcher(config).await?;

    let outcome = dispatcher
        .dispatch(DispatchRequest {
            user_id: user,
            session_id: session,
            user_input: message,
            redirect_to: None,
            original_question: None,
        })
        .await
        .context("Dispatch failed")?;

    let response = ChatResponse::from(outcome);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Text => {
            println!("[session {}]", response.session_id);
            println!("{}", response.ai_response);
            if let Some(redirect) = &response.redirect_to {
                println!(
                    "(re-run with --session omitted and redirect_to={} to confirm the switch)",
                    redirect
                );
            }
        }
    }

    database.close().await?;
    Ok(())
}

/// List a user's sessions, most recent first.
pub async fn handle_sessions(config: &Config, user_id: String, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.db_path())
        .await
        .context("Failed to open database")?;

    let sessions = SessionService::new(database.sessions())
        .list_sessions(&user_id)
        .await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&sessions)?),
        OutputFormat::Text => {
            if sessions.is_empty() {
                println!("No sessions for user {user_id}.");
            }
            for s in sessions {
                println!("{:>6}  {}  {}", s.id, format_timestamp(s.updated_at), s.name);
            }
        }
    }

    database.close().await?;
    Ok(())
}

/// Print the full message history of a session.
pub async fn handle_history(config: &Config, session_id: i64, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.db_path())
        .await
        .context("Failed to open database")?;

    let data = SessionService::new(database.sessions())
        .load_session(session_id)
        .await?
        .with_context(|| format!("Session {session_id} not found"))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&data.history)?),
        OutputFormat::Text => {
            for turn in &data.history {
                match turn {
                    Turn::Human(content) => println!("you> {content}"),
                    Turn::Assistant(content) => println!("bot> {content}"),
                }
            }
        }
    }

    database.close().await?;
    Ok(())
}

fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}
