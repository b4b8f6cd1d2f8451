use std::time::Duration;

use mnemo_core::error::LlmError;
use mnemo_core::llm::{
    parse_completion, parse_embeddings, ChatMessage, Completion, CompletionRequest, FunctionSpec,
    OpenAiClient,
};
use serde_json::{json, Value};

#[test]
fn test_request_serialization_without_functions() {
    let req = CompletionRequest::new("gpt-4o-mini", vec![ChatMessage::user("hi")]);
    let v: Value = serde_json::to_value(&req).unwrap();
    assert_eq!(
        v,
        json!({
            "model": "gpt-4o-mini",
            "messages": [{ "role": "user", "content": "hi" }],
        })
    );
}

#[test]
fn test_request_serialization_with_functions() {
    let spec = FunctionSpec {
        name: "search_vector_db".to_string(),
        description: "search".to_string(),
        parameters: json!({ "type": "object" }),
    };
    let req = CompletionRequest::new(
        "m",
        vec![ChatMessage::system("sys"), ChatMessage::user("u")],
    )
    .with_functions(vec![spec])
    .with_temperature(0.0)
    .with_max_tokens(300);

    let v: Value = serde_json::to_value(&req).unwrap();
    assert_eq!(v["messages"][0]["role"], "system");
    assert_eq!(v["functions"][0]["name"], "search_vector_db");
    assert_eq!(v["function_call"], "auto");
    assert_eq!(v["temperature"], 0.0);
    assert_eq!(v["max_tokens"], 300);

    let none = CompletionRequest::new("m", vec![]).with_functions(vec![]);
    assert!(none.function_call.is_none());
}

#[test]
fn test_parse_text_completion() {
    let body = r#"{
        "id": "chatcmpl-1",
        "choices": [
            { "index": 0, "message": { "role": "assistant", "content": "Hello!" }, "finish_reason": "stop" }
        ]
    }"#;
    let completion = parse_completion(body).unwrap();
    assert_eq!(completion, Completion::text("Hello!"));
    assert_eq!(completion.non_empty_content(), Some("Hello!"));
}

#[test]
fn test_parse_function_call_completion() {
    let body = r#"{
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "function_call": { "name": "search_vector_db", "arguments": "{\"query\":\"cats\"}" }
            }
        }]
    }"#;
    let completion = parse_completion(body).unwrap();
    assert!(completion.non_empty_content().is_none());
    let call = completion.function_call.unwrap();
    assert_eq!(call.name, "search_vector_db");
    assert_eq!(call.arguments, r#"{"query":"cats"}"#);
}

#[test]
fn test_parse_completion_errors() {
    assert!(matches!(parse_completion(r#"{"choices": []}"#), Err(LlmError::EmptyResponse)));
    assert!(matches!(parse_completion("<html>"), Err(LlmError::Decode(_))));
}

#[test]
fn test_blank_content_is_not_an_answer() {
    assert!(Completion::text("   \n").non_empty_content().is_none());
    assert!(Completion::default().non_empty_content().is_none());
}

#[test]
fn test_parse_embeddings_orders_by_index() {
    let body = r#"{
        "data": [
            { "index": 1, "embedding": [0.0, 1.0] },
            { "index": 0, "embedding": [1.0, 0.0] }
        ]
    }"#;
    let vectors = parse_embeddings(body, 2).unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

    let err = parse_embeddings(body, 3).unwrap_err();
    assert!(err.to_string().contains("expected 3 embeddings, got 2"));
}

#[test]
fn test_client_requires_api_key() {
    let result = OpenAiClient::new("  ", "https://api.openai.com/v1", Duration::from_secs(1));
    assert!(matches!(result, Err(LlmError::MissingApiKey)));
    assert!(OpenAiClient::new("sk-test", "https://api.openai.com/v1/", Duration::from_secs(1)).is_ok());
}

#[test]
fn test_error_messages() {
    let err = LlmError::Status { status: 429, body: "rate limited".to_string() };
    assert_eq!(err.to_string(), "API returned HTTP 429: rate limited");
    assert_eq!(LlmError::MissingApiKey.to_string(), "OPENAI_API_KEY is not set");
}
