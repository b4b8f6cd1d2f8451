use anyhow::Result;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::Config;
use crate::db::{Database, UserInfo};
use crate::history::{ChatHistoryManager, HistoryEntry};
use crate::llm::{ChatMessage, CompletionRequest, FunctionCall, FunctionSpec, LanguageModel};
use crate::prompt;
use crate::tools::{self, AgentCall, FunctionResult, ADD_USER_INFO};
use crate::user::UserManager;
use crate::vector::VectorStore;

pub const NO_RESPONSE_WARNING: &str =
    "Warning: No valid assistant response from the chatbot. Please try again.";
pub const FALLBACK_APOLOGY: &str = "I apologize, but I couldn't generate a proper response.";

/// The function call made on the previous iteration of a turn.
struct LastCall {
    name: String,
    args: Map<String, Value>,
    result: FunctionResult,
}

/// Agentic chat loop with long-term memory: profile facts in SQLite, a
/// rolling history window with summaries, and a vector store of past
/// exchanges the model can search through function calls.
pub struct Chatbot {
    cfg: Config,
    db: Database,
    model: Box<dyn LanguageModel>,
    users: UserManager,
    history: ChatHistoryManager,
    vectors: VectorStore,
    functions: Vec<FunctionSpec>,
}

impl Chatbot {
    /// Build a chatbot with a fresh session id. Ensures a user row exists so
    /// the session's history is always persisted.
    pub fn new(cfg: Config, db: Database, model: Box<dyn LanguageModel>) -> Result<Self> {
        cfg.validate()?;
        db.ensure_user()?;
        let users = UserManager::load(&db)?;
        let session_id = Uuid::new_v4().to_string();
        tracing::info!(session = %session_id, "chat session started");

        let history = ChatHistoryManager::new(
            session_id,
            users.user_id(),
            cfg.llm.summary_model.clone(),
            cfg.chat_history.max_tokens,
        );
        let vectors = VectorStore::new(&cfg);

        Ok(Self {
            cfg,
            db,
            model,
            users,
            history,
            vectors,
            functions: tools::definitions(),
        })
    }

    pub fn session_id(&self) -> &str {
        self.history.session_id()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        self.history.window()
    }

    pub fn user_info(&self) -> Option<&UserInfo> {
        self.users.user_info()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    pub fn latest_summary(&self) -> Result<Option<String>> {
        self.history.latest_summary(&self.db)
    }

    /// One user turn. Never fails: errors come back as `Error: ...` text.
    pub fn chat(&mut self, message: &str) -> String {
        match self.run_turn(message) {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error = %e, "chat turn failed");
                format!("Error: {e}")
            }
        }
    }

    /// Vector search with RAG condensation, outside of a chat turn.
    pub fn search_memory(&self, query: &str) -> FunctionResult {
        self.vectors.search_vector_db(&self.db, self.model.as_ref(), query)
    }

    /// Apply a profile update outside of a chat turn and refresh the cache.
    pub fn update_user_info(&mut self, info: &Map<String, Value>) -> FunctionResult {
        let result = self.users.add_user_info(&self.db, info);
        if result.is_success() {
            self.refresh_user();
        }
        result
    }

    fn run_turn(&mut self, message: &str) -> Result<String> {
        let max_calls = self.cfg.agent.max_function_calls;
        let mut call_count = 0usize;
        let mut finished = false;
        let mut last: Option<LastCall> = None;
        let previous_summary = self.history.latest_summary(&self.db)?;

        loop {
            let mut section = String::new();
            if let Some(call) = &last {
                if call.result.is_success() {
                    finished = true;
                    if call.name == ADD_USER_INFO {
                        self.refresh_user();
                    }
                    section = prompt::function_success_section(
                        &call.name,
                        &call.args,
                        call.result.outcome.status_text(),
                        &call.result.message,
                    );
                } else {
                    section = prompt::function_failure_section(
                        &call.name,
                        &call.args,
                        call.result.outcome.status_text(),
                        &call.result.message,
                    );
                }
            }
            if call_count >= max_calls {
                section = prompt::function_limit_section().to_string();
            }

            let system = prompt::agentic_system_prompt(
                &self.users.info_json(),
                previous_summary.as_deref().unwrap_or(""),
                &self.history.window_json(),
                &section,
            );
            tracing::debug!(prompt_chars = system.len(), call_count, finished, "calling chat model");

            let messages = vec![ChatMessage::system(system), ChatMessage::user(message)];
            let request = CompletionRequest::new(self.cfg.llm.chat_model.clone(), messages.clone())
                .with_functions(self.functions.clone())
                .with_temperature(self.cfg.llm.temperature);
            let completion = self.model.complete(&request)?;

            if let Some(text) = completion.non_empty_content() {
                let answer = text.to_string();
                self.record_exchange(message, &answer, true)?;
                return Ok(answer);
            }

            let Some(call) = completion.function_call else {
                return Ok(NO_RESPONSE_WARNING.to_string());
            };

            if call_count >= max_calls || finished {
                tracing::info!(function = %call.name, "function call refused, using fallback completion");
                let request = CompletionRequest::new(self.cfg.llm.chat_model.clone(), messages)
                    .with_temperature(self.cfg.llm.temperature);
                let fallback = self.model.complete(&request)?;
                let answer = fallback
                    .non_empty_content()
                    .unwrap_or(FALLBACK_APOLOGY)
                    .to_string();
                self.record_exchange(message, &answer, false)?;
                return Ok(answer);
            }

            call_count += 1;
            tracing::info!(function = %call.name, arguments = %call.arguments, "model requested function call");
            let (args, result) = self.execute(&call);
            tracing::info!(
                function = %call.name,
                status = result.outcome.status_text(),
                "function call finished"
            );
            last = Some(LastCall { name: call.name, args, result });
        }
    }

    fn execute(&mut self, call: &FunctionCall) -> (Map<String, Value>, FunctionResult) {
        let args = match tools::parse_arguments(&call.arguments) {
            Ok(args) => args,
            Err(msg) => return (Map::new(), FunctionResult::failure(msg)),
        };
        let result = match tools::resolve_call(&call.name, &args) {
            Ok(AgentCall::AddUserInfo(info)) => self.users.add_user_info(&self.db, &info),
            Ok(AgentCall::SearchVectorDb(query)) => {
                self.vectors.search_vector_db(&self.db, self.model.as_ref(), &query)
            }
            Err(result) => result,
        };
        (args, result)
    }

    /// Persist an answered exchange to history, summary and vector store.
    fn record_exchange(&mut self, question: &str, answer: &str, update_summary: bool) -> Result<()> {
        let max_pairs = self.cfg.chat_history.max_history_pairs;
        self.history.set_user_id(self.users.user_id());
        self.history
            .add_to_history(&self.db, self.model.as_ref(), question, answer, max_pairs)?;
        if update_summary {
            if let Err(e) = self.history.update_chat_summary(&self.db, self.model.as_ref(), max_pairs) {
                tracing::warn!(error = %e, "summary update failed");
            }
        }
        self.vectors.update(&self.db, self.model.as_ref(), question, answer);
        Ok(())
    }

    fn refresh_user(&mut self) {
        if let Err(e) = self.users.refresh(&self.db) {
            tracing::warn!(error = %e, "failed to refresh user info");
        }
        self.history.set_user_id(self.users.user_id());
    }
}
