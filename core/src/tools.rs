use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::llm::FunctionSpec;

pub const ADD_USER_INFO: &str = "add_user_info_to_database";
pub const SEARCH_VECTOR_DB: &str = "search_vector_db";

// ---------------------------------------------------------------------------
// Outcome protocol
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionOutcome {
    Success,
    Failure,
}

impl FunctionOutcome {
    /// Status line shown to the model in the next system prompt.
    pub fn status_text(self) -> &'static str {
        match self {
            FunctionOutcome::Success => "Function call successful.",
            FunctionOutcome::Failure => "Function call failed.",
        }
    }
}

/// What an agent function reports back: an outcome plus a message the
/// model reads on its next iteration. Agent functions never return `Err`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionResult {
    pub outcome: FunctionOutcome,
    pub message: String,
}

impl FunctionResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self { outcome: FunctionOutcome::Success, message: message.into() }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { outcome: FunctionOutcome::Failure, message: message.into() }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == FunctionOutcome::Success
    }
}

// ---------------------------------------------------------------------------
// Argument types. Doc comments surface as descriptions in the JSON Schema
// sent to the model.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddUserInfoArgs {
    /// User information to update. Allowed keys: name, last_name, age,
    /// gender, location, occupation, interests
    pub user_info: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// The search query
    pub query: String,
}

// ---------------------------------------------------------------------------
// AgentFunction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentFunction {
    AddUserInfoToDatabase,
    SearchVectorDb,
}

/// A function call the model asked for, resolved to its typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentCall {
    AddUserInfo(Map<String, Value>),
    SearchVectorDb(String),
}

impl AgentFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            ADD_USER_INFO => Some(Self::AddUserInfoToDatabase),
            SEARCH_VECTOR_DB => Some(Self::SearchVectorDb),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::AddUserInfoToDatabase => ADD_USER_INFO,
            Self::SearchVectorDb => SEARCH_VECTOR_DB,
        }
    }

    pub fn spec(self) -> FunctionSpec {
        match self {
            Self::AddUserInfoToDatabase => FunctionSpec {
                name: ADD_USER_INFO.to_string(),
                description: "Updates user information in the database".to_string(),
                parameters: parameters_schema::<AddUserInfoArgs>(),
            },
            Self::SearchVectorDb => FunctionSpec {
                name: SEARCH_VECTOR_DB.to_string(),
                description: "Searches the vector database for relevant information".to_string(),
                parameters: parameters_schema::<SearchArgs>(),
            },
        }
    }
}

/// Function specs advertised to the chat model on every iteration.
pub fn definitions() -> Vec<FunctionSpec> {
    [AgentFunction::AddUserInfoToDatabase, AgentFunction::SearchVectorDb]
        .into_iter()
        .map(AgentFunction::spec)
        .collect()
}

fn parameters_schema<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let mut value = serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({ "type": "object" }));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// Decode the model's raw argument string. Blank input means no arguments.
pub fn parse_arguments(arguments: &str) -> Result<Map<String, Value>, String> {
    if arguments.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("arguments must be a JSON object, got {other}")),
        Err(e) => Err(format!("arguments are not valid JSON: {e}")),
    }
}

/// Resolve a function name and decoded arguments into a typed call.
pub fn resolve_call(name: &str, args: &Map<String, Value>) -> Result<AgentCall, FunctionResult> {
    match AgentFunction::from_name(name) {
        Some(AgentFunction::AddUserInfoToDatabase) => {
            // Models sometimes send the fields bare instead of under `user_info`.
            let info = match args.get("user_info") {
                Some(Value::Object(inner)) => inner.clone(),
                Some(_) => {
                    return Err(FunctionResult::failure("user_info must be a JSON object"));
                }
                None => args.clone(),
            };
            Ok(AgentCall::AddUserInfo(info))
        }
        Some(AgentFunction::SearchVectorDb) => {
            let parsed: SearchArgs = serde_json::from_value(Value::Object(args.clone()))
                .map_err(|e| FunctionResult::failure(format!("Invalid arguments: {e}")))?;
            Ok(AgentCall::SearchVectorDb(parsed.query))
        }
        None => Err(FunctionResult::failure("Unknown function")),
    }
}
