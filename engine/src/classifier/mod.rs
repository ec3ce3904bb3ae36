//! Intent classification
//!
//! Determines which handler category an incoming message belongs to. A
//! configured keyword table provides the fast path; anything it misses is
//! delegated to an external classifier. Out-of-vocabulary or failed
//! classification always lands on the catch-all `qna` intent — a request is
//! never failed over an ambiguous topic.

use async_trait::async_trait;
use sdk::types::Intent;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::LlmClient;

/// A black-box intent classifier
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify one user message into the intent vocabulary.
    ///
    /// Implementations must absorb their own failures and return the
    /// catch-all instead of erroring.
    async fn classify(&self, text: &str) -> Intent;
}

/// Substring keyword table, checked case-insensitively.
///
/// Entries come from configuration (e.g. "lộ trình" → planner); the table
/// may be empty, in which case every message goes to the fallback.
#[derive(Debug, Clone, Default)]
pub struct KeywordTable {
    entries: Vec<(String, Intent)>,
}

impl KeywordTable {
    /// Build a table from (keyword, intent label) pairs, dropping entries
    /// whose label is outside the vocabulary.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut entries = Vec::new();
        for (keyword, label) in pairs {
            match Intent::parse(label.as_ref()) {
                Some(intent) => entries.push((keyword.as_ref().to_lowercase(), intent)),
                None => warn!(
                    keyword = keyword.as_ref(),
                    label = label.as_ref(),
                    "Ignoring keyword rule with unknown intent label"
                ),
            }
        }
        Self { entries }
    }

    /// First keyword contained in the message wins.
    pub fn match_keyword(&self, text: &str) -> Option<Intent> {
        let haystack = text.to_lowercase();
        self.entries
            .iter()
            .find(|(keyword, _)| haystack.contains(keyword))
            .map(|(_, intent)| *intent)
    }
}

/// Classifier that asks an LLM to pick a label from the vocabulary.
pub struct LlmClassifier {
    llm: Arc<dyn LlmClient>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn build_prompt(text: &str) -> String {
        let vocabulary = Intent::ALL
            .iter()
            .map(Intent::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "You route messages for a Japanese-learning assistant. \
             Read the user message and answer with exactly one of: {vocabulary}. \
             Answer with the single keyword only.\n\nUser message: {text}"
        )
    }
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    async fn classify(&self, text: &str) -> Intent {
        match self.llm.complete(&Self::build_prompt(text)).await {
            Ok(label) => {
                let intent = Intent::parse_or_default(&label);
                debug!(label = label.trim(), %intent, "LLM classification");
                intent
            }
            Err(e) => {
                warn!(error = %e, "Intent classification failed, defaulting to qna");
                Intent::Qna
            }
        }
    }
}

/// The production classifier: keyword fast path, then the precise path.
pub struct RoutingClassifier {
    keywords: KeywordTable,
    fallback: Arc<dyn IntentClassifier>,
}

impl RoutingClassifier {
    pub fn new(keywords: KeywordTable, fallback: Arc<dyn IntentClassifier>) -> Self {
        Self { keywords, fallback }
    }
}

#[async_trait]
impl IntentClassifier for RoutingClassifier {
    async fn classify(&self, text: &str) -> Intent {
        if let Some(intent) = self.keywords.match_keyword(text) {
            debug!(%intent, "Keyword fast-path classification");
            return intent;
        }
        self.fallback.classify(text).await
    }
}
