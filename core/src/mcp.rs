use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ServerCapabilities, ServerInfo};
use rmcp::schemars::JsonSchema;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chatbot::Chatbot;
use crate::tools::FunctionResult;

// ---------------------------------------------------------------------------
// Parameter structs. Doc comments surface as descriptions in the MCP JSON
// Schema.
// ---------------------------------------------------------------------------

#[derive(Deserialize, JsonSchema)]
pub struct ChatParams {
    /// The user's message for this turn
    pub message: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct SearchMemoryParams {
    /// A clear natural-language query over past conversations
    pub query: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct UpdateUserInfoParams {
    /// Fields to update. Allowed keys: name, last_name, age, gender,
    /// location, occupation, interests
    pub user_info: BTreeMap<String, Value>,
}

#[derive(Deserialize, JsonSchema)]
pub struct GetUserInfoParams {}

#[derive(Deserialize, JsonSchema)]
pub struct GetLatestSummaryParams {}

#[derive(Deserialize, JsonSchema)]
pub struct GetHealthParams {}

#[derive(Serialize)]
struct FunctionReply {
    status: &'static str,
    message: String,
}

impl From<FunctionResult> for FunctionReply {
    fn from(r: FunctionResult) -> Self {
        Self { status: r.outcome.status_text(), message: r.message }
    }
}

#[derive(Serialize)]
struct SummaryReply {
    session_id: String,
    summary: Option<String>,
}

// ---------------------------------------------------------------------------
// MnemoServer
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MnemoServer {
    chatbot: Arc<Mutex<Chatbot>>,
    tool_router: ToolRouter<Self>,
}

impl MnemoServer {
    pub fn new(chatbot: Arc<Mutex<Chatbot>>) -> Self {
        Self {
            chatbot,
            tool_router: Self::tool_router(),
        }
    }

    /// Run `f` with the chatbot locked. A chat turn holds the lock across
    /// blocking model calls, so waiting for it happens off the async workers.
    fn with_chatbot<T>(&self, f: impl FnOnce(&mut Chatbot) -> Result<T, String>) -> Result<T, String> {
        tokio::task::block_in_place(|| {
            let mut bot = self.chatbot.lock().map_err(|e| format!("lock error: {e}"))?;
            f(&mut bot)
        })
    }
}

#[tool_router]
impl MnemoServer {
    #[tool(description = "Send one message to the assistant. Runs a full agentic turn: the assistant may search its memory or update the user profile before answering. The exchange is stored in long-term memory.")]
    pub fn chat(&self, Parameters(params): Parameters<ChatParams>) -> Result<String, String> {
        if params.message.trim().is_empty() {
            return Err("message must not be empty".to_string());
        }
        self.with_chatbot(|bot| Ok(bot.chat(&params.message)))
    }

    #[tool(description = "Search past conversations stored in the vector memory and return a condensed note of the most relevant exchanges.")]
    pub fn search_memory(&self, Parameters(params): Parameters<SearchMemoryParams>) -> Result<String, String> {
        let reply: FunctionReply = self.with_chatbot(|bot| Ok(bot.search_memory(&params.query).into()))?;
        serde_json::to_string_pretty(&reply).map_err(|e| format!("json error: {e}"))
    }

    #[tool(description = "Return the stored user profile (only fields that are set).")]
    pub fn get_user_info(&self, Parameters(_): Parameters<GetUserInfoParams>) -> Result<String, String> {
        let info = self.with_chatbot(|bot| Ok(bot.user_info().cloned().unwrap_or_default()))?;
        serde_json::to_string_pretty(&info).map_err(|e| format!("json error: {e}"))
    }

    #[tool(description = "Update the user profile. Interests are merged with the stored list rather than replaced.")]
    pub fn update_user_info(&self, Parameters(params): Parameters<UpdateUserInfoParams>) -> Result<String, String> {
        let info: Map<String, Value> = params.user_info.into_iter().collect();
        let result = self.with_chatbot(|bot| Ok(bot.update_user_info(&info)))?;
        if !result.is_success() {
            return Err(result.message);
        }
        serde_json::to_string_pretty(&FunctionReply::from(result)).map_err(|e| format!("json error: {e}"))
    }

    #[tool(description = "Return the latest rolling summary of the current session, if one has been generated.")]
    pub fn get_latest_summary(&self, Parameters(_): Parameters<GetLatestSummaryParams>) -> Result<String, String> {
        let reply = self.with_chatbot(|bot| {
            let summary = bot.latest_summary().map_err(|e| format!("query error: {e}"))?;
            Ok(SummaryReply {
                session_id: bot.session_id().to_string(),
                summary,
            })
        })?;
        serde_json::to_string_pretty(&reply).map_err(|e| format!("json error: {e}"))
    }

    #[tool(description = "Database statistics: size, stored exchanges, summaries and vector documents.")]
    pub fn get_health(&self, Parameters(_): Parameters<GetHealthParams>) -> Result<String, String> {
        let health = self.with_chatbot(|bot| {
            bot.database().get_health().map_err(|e| format!("query error: {e}"))
        })?;
        serde_json::to_string_pretty(&health).map_err(|e| format!("json error: {e}"))
    }
}

#[tool_handler]
impl ServerHandler for MnemoServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "mnemo: chat assistant with long-term memory. \
                 Chat with it, search its memory of past conversations, \
                 and read or update the user profile it keeps."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: "mnemo".to_string(),
                title: Some("Mnemo MCP Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
