use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::db::{ChatPair, Database};
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel};
use crate::prompt;
use crate::tokens::count_tokens;

/// Number of most recent pairs left untouched when the window is compressed.
const PAIRS_TO_KEEP: usize = 1;

/// Token cap for the window-compression completion.
const COMPRESSION_MAX_TOKENS: u32 = 300;

/// One side of an exchange in the in-memory window. Serializes as
/// `{"user": ".."}` or `{"assistant": ".."}`, which is also the shape the
/// compression model is asked to return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant: Option<String>,
}

impl HistoryEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self { user: Some(text.into()), assistant: None }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { user: None, assistant: Some(text.into()) }
    }
}

// ---------------------------------------------------------------------------
// ChatHistoryManager
// ---------------------------------------------------------------------------

/// Short-term window plus persisted history and rolling summaries for one
/// session.
pub struct ChatHistoryManager {
    session_id: String,
    user_id: Option<i64>,
    summary_model: String,
    max_tokens: usize,
    window: Vec<HistoryEntry>,
    pairs_since_last_summary: usize,
}

impl ChatHistoryManager {
    pub fn new(
        session_id: impl Into<String>,
        user_id: Option<i64>,
        summary_model: impl Into<String>,
        max_tokens: usize,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id,
            summary_model: summary_model.into(),
            max_tokens,
            window: Vec::new(),
            pairs_since_last_summary: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn set_user_id(&mut self, user_id: Option<i64>) {
        self.user_id = user_id;
    }

    pub fn window(&self) -> &[HistoryEntry] {
        &self.window
    }

    pub fn window_json(&self) -> String {
        serde_json::to_string(&self.window).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn pairs_since_last_summary(&self) -> usize {
        self.pairs_since_last_summary
    }

    /// Record a finished exchange: extend and trim the window, persist the
    /// pair, and compress the window if it has grown past the token limit.
    pub fn add_to_history(
        &mut self,
        db: &Database,
        model: &dyn LanguageModel,
        question: &str,
        answer: &str,
        max_history_pairs: usize,
    ) -> Result<()> {
        self.window.push(HistoryEntry::user(question));
        self.window.push(HistoryEntry::assistant(answer));

        let cap = max_history_pairs * 2;
        if self.window.len() > cap {
            let excess = self.window.len() - cap;
            self.window.drain(..excess);
        }

        match self.user_id {
            Some(user_id) => {
                db.insert_chat_pair(user_id, question, answer, &self.session_id)?;
                tracing::debug!(session = %self.session_id, "chat pair saved");
            }
            None => tracing::warn!("no user found in the database, chat pair not persisted"),
        }
        self.pairs_since_last_summary += 1;

        let tokens = count_tokens(&self.window_json());
        if tokens > self.max_tokens {
            tracing::info!(tokens, limit = self.max_tokens, "compressing chat history window");
            self.summarize_window(model);
            tracing::info!(tokens = count_tokens(&self.window_json()), "window compressed");
        }
        Ok(())
    }

    /// Replace all but the latest pair with a model-written condensation.
    /// Leaves the window untouched when the model output is unusable.
    pub fn summarize_window(&mut self, model: &dyn LanguageModel) -> bool {
        let keep = PAIRS_TO_KEEP * 2;
        if self.window.len() <= keep {
            return false;
        }
        let split = self.window.len() - keep;
        let older = &self.window[..split];
        let older_json = serde_json::to_string(older).unwrap_or_else(|_| "[]".to_string());

        let request = CompletionRequest::new(
            self.summary_model.clone(),
            vec![ChatMessage::user(prompt::window_compression_prompt(&older_json))],
        )
        .with_max_tokens(COMPRESSION_MAX_TOKENS);

        let content = match model.complete(&request) {
            Ok(completion) => completion.content.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to summarize chat history");
                return false;
            }
        };

        match parse_compressed_entries(&content) {
            Some(mut entries) => {
                entries.extend(self.window.drain(split..));
                self.window = entries;
                true
            }
            None => {
                tracing::warn!("failed to summarize chat history: invalid format received from model");
                false
            }
        }
    }

    /// Roll the latest pairs into a new stored summary once enough pairs have
    /// accumulated since the last one. Returns whether a summary was written.
    pub fn update_chat_summary(
        &mut self,
        db: &Database,
        model: &dyn LanguageModel,
        max_history_pairs: usize,
    ) -> Result<bool> {
        tracing::debug!(pairs = self.pairs_since_last_summary, "checking summary threshold");
        if self.pairs_since_last_summary < max_history_pairs {
            return Ok(false);
        }

        let pairs = self.latest_chat_pairs(db, max_history_pairs)?;
        let previous = self.latest_summary(db)?;

        if pairs.len() <= max_history_pairs {
            tracing::debug!(available = pairs.len(), "insufficient chat data, skipping summary");
            return Ok(false);
        }

        let request = CompletionRequest::new(
            self.summary_model.clone(),
            vec![ChatMessage::system(prompt::summary_prompt(previous.as_deref(), &pairs))],
        );
        let summary = match model.complete(&request) {
            Ok(completion) => completion.non_empty_content().map(str::to_string),
            Err(e) => {
                tracing::warn!(error = %e, "error generating summary");
                None
            }
        };

        let Some(summary) = summary else {
            return Ok(false);
        };
        let Some(user_id) = self.user_id else {
            return Ok(false);
        };
        db.insert_summary(user_id, &self.session_id, &summary)?;
        self.pairs_since_last_summary = 0;
        tracing::info!(session = %self.session_id, "chat history summary generated and saved");
        Ok(true)
    }

    /// Up to `2 * num_pairs` latest pairs of this session, oldest first.
    pub fn latest_chat_pairs(&self, db: &Database, num_pairs: usize) -> Result<Vec<ChatPair>> {
        db.latest_chat_pairs(&self.session_id, num_pairs * 2)
    }

    pub fn latest_summary(&self, db: &Database) -> Result<Option<String>> {
        db.latest_summary(&self.session_id)
    }
}

/// Accept either a single `{user|assistant}` object or an array of them,
/// optionally wrapped in a Markdown code fence.
pub fn parse_compressed_entries(content: &str) -> Option<Vec<HistoryEntry>> {
    let trimmed = strip_code_fence(content.trim());
    let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        obj @ serde_json::Value::Object(_) => vec![obj],
        _ => return None,
    };
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let entry: HistoryEntry = serde_json::from_value(item).ok()?;
        if entry.user.is_none() && entry.assistant.is_none() {
            return None;
        }
        entries.push(entry);
    }
    // An empty array is a valid condensation: only the latest pair survives.
    Some(entries)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
