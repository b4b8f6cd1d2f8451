use serde_json::{Map, Value};

use crate::db::ChatPair;

/// System prompt for the agentic chat model. `function_section` carries the
/// outcome of the previous function call in this turn, or is empty.
pub fn agentic_system_prompt(
    user_info: &str,
    chat_summary: &str,
    chat_history: &str,
    function_section: &str,
) -> String {
    format!(
        "## You are a professional assistant of the following user.

{user_info}

## Here is a summary of the previous conversation history:

{chat_summary}

## Here is the previous conversation between you and the user:

{chat_history}

## You have access to two functions: search_vector_db and add_user_info_to_database.

- If you need more information about the user or details from previous conversations to answer the user's question, use the search_vector_db function.
This function performs a vector search on the chat history of the user and the chatbot. The best way to do this is to search with a very clear query.
- Monitor the conversation, and if the user provides any of the following details that differ from the initial information, call add_user_info_to_database to update the user's database record.

### Keys for Updating the User's Information:

- name: str
- last_name: str
- age: int
- gender: str
- location: str
- occupation: str
- interests: list[str]

## IMPORTANT: You are the only agent talking to the user, so you are responsible for both the conversation and function calling.
- If you call a function, the result will appear below.
- If the result confirms that the function was successful, or the maximum limit of function calls is reached, don't call it again.
- You can also check the chat history to see if you already called the function.

{function_section}
"
    )
}

/// System prompt used to condense vector-search hits into an answer-ready
/// note.
pub fn rag_system_prompt() -> &'static str {
    "You will receive a user query and the search results retrieved from a chat history vector database. \
The search results will include the most likely relevant responses to the query.

Your task is to summarize the key information from both the query and the search results in a clear and concise manner.

Remember keep it concise and focus on the most relevant information."
}

pub fn rag_user_prompt(query: &str, documents: &[String]) -> String {
    format!("Query: {query}\n\nSearch Results:\n{}", documents.join("\n\n"))
}

fn format_args(args: &Map<String, Value>) -> String {
    args.iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("  - {k}: {s}"),
            other => format!("  - {k}: {other}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn function_success_section(name: &str, args: &Map<String, Value>, status: &str, result: &str) -> String {
    format!(
        "## Function Call Executed

- The assistant just called the function `{name}` in response to the user's most recent message.
- Arguments provided:
{}
- Outcome: ✅ {status}

Please proceed with the conversation using the new context.

{result}",
        format_args(args)
    )
}

pub fn function_failure_section(name: &str, args: &Map<String, Value>, status: &str, result: &str) -> String {
    format!(
        "## Function Call Attempted

- The assistant attempted to call `{name}` with the following arguments:
{}
- Outcome: ❌ {status} - {result}

Please assist the user based on this result.",
        format_args(args)
    )
}

pub fn function_limit_section() -> &'static str {
    "# Function Call Limit Reached.
Please conclude the conversation with the user based on the available information."
}

/// Prompt for rolling the latest pairs (and the previous summary) into a new
/// session summary.
pub fn summary_prompt(previous_summary: Option<&str>, pairs: &[ChatPair]) -> String {
    let mut prompt = String::from("Summarize the following conversation:\n\n");
    if let Some(prev) = previous_summary {
        prompt.push_str(&format!("Previous summary:\n{prev}\n\n"));
    }
    for pair in pairs {
        prompt.push_str(&format!("User: {}\nAssistant: {}\n\n", pair.question, pair.answer));
    }
    prompt.push_str("Provide a concise summary while keeping important details.");
    prompt
}

/// Prompt for compressing older window entries into fewer user/assistant
/// entries, returned as JSON.
pub fn window_compression_prompt(entries_json: &str) -> String {
    format!(
        "Summarize the following conversation while preserving key details and the conversation's tone:
{entries_json}

Return the summarized conversation (in JSON format with 'user' and 'assistant' pairs):"
    )
}
