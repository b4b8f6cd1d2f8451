mod common;

use common::ScriptedModel;
use mnemo_core::db::Database;
use mnemo_core::history::{parse_compressed_entries, ChatHistoryManager, HistoryEntry};
use mnemo_core::llm::Role;

const SESSION: &str = "session-test";

fn manager(db: &Database, max_tokens: usize) -> ChatHistoryManager {
    let user_id = db.ensure_user().unwrap();
    ChatHistoryManager::new(SESSION, Some(user_id), "summary-model", max_tokens)
}

#[test]
fn test_window_keeps_latest_pairs_and_persists_all() {
    let db = Database::open_in_memory().unwrap();
    let model = ScriptedModel::new();
    let mut history = manager(&db, 2000);

    for i in 1..=3 {
        history
            .add_to_history(&db, &model, &format!("q{i}"), &format!("a{i}"), 2)
            .unwrap();
    }

    assert_eq!(
        history.window(),
        &[
            HistoryEntry::user("q2"),
            HistoryEntry::assistant("a2"),
            HistoryEntry::user("q3"),
            HistoryEntry::assistant("a3"),
        ]
    );
    assert_eq!(db.count_chat_pairs(SESSION).unwrap(), 3);
    assert_eq!(history.pairs_since_last_summary(), 3);
    // Small window never reaches the model
    assert!(model.requests().is_empty());
}

#[test]
fn test_window_json_shape() {
    let db = Database::open_in_memory().unwrap();
    let model = ScriptedModel::new();
    let mut history = manager(&db, 2000);
    assert_eq!(history.window_json(), "[]");

    history.add_to_history(&db, &model, "hi", "hello", 2).unwrap();
    assert_eq!(
        history.window_json(),
        r#"[{"user":"hi"},{"assistant":"hello"}]"#
    );
}

#[test]
fn test_without_user_pairs_are_not_persisted() {
    let db = Database::open_in_memory().unwrap();
    let model = ScriptedModel::new();
    let mut history = ChatHistoryManager::new(SESSION, None, "summary-model", 2000);

    history.add_to_history(&db, &model, "q", "a", 2).unwrap();
    assert_eq!(history.window().len(), 2);
    assert_eq!(db.count_chat_pairs(SESSION).unwrap(), 0);
}

#[test]
fn test_window_compressed_when_over_token_limit() {
    let db = Database::open_in_memory().unwrap();
    let model = ScriptedModel::new();
    let mut history = manager(&db, 20);

    history.add_to_history(&db, &model, "first question", "first answer", 5).unwrap();
    model.push_text(r#"```json
[{"user": "asked something"}, {"assistant": "answered"}]
```"#);
    history
        .add_to_history(&db, &model, "second question", "second answer", 5)
        .unwrap();

    assert_eq!(
        history.window(),
        &[
            HistoryEntry::user("asked something"),
            HistoryEntry::assistant("answered"),
            HistoryEntry::user("second question"),
            HistoryEntry::assistant("second answer"),
        ]
    );

    let requests = model.requests();
    assert_eq!(requests.len(), 1, "only the second add crosses the limit");
    let req = &requests[0];
    assert_eq!(req.model, "summary-model");
    assert_eq!(req.max_tokens, Some(300));
    assert_eq!(req.messages[0].role, Role::User);
    // Only the older entries are sent for compression
    assert!(req.messages[0].content.contains("first question"));
    assert!(!req.messages[0].content.contains("second question"));
    // Persisted history is untouched by compression
    assert_eq!(db.count_chat_pairs(SESSION).unwrap(), 2);
}

#[test]
fn test_unparseable_compression_leaves_window() {
    let db = Database::open_in_memory().unwrap();
    let model = ScriptedModel::new();
    let mut history = manager(&db, 2000);
    history.add_to_history(&db, &model, "q1", "a1", 5).unwrap();
    history.add_to_history(&db, &model, "q2", "a2", 5).unwrap();
    let before = history.window().to_vec();

    model.push_text("Sure! Here is a summary of the chat.");
    assert!(!history.summarize_window(&model));
    assert_eq!(history.window(), before.as_slice());

    model.push_error();
    assert!(!history.summarize_window(&model));
    assert_eq!(history.window(), before.as_slice());
}

#[test]
fn test_empty_compression_keeps_only_latest_pair() {
    let db = Database::open_in_memory().unwrap();
    let model = ScriptedModel::new();
    let mut history = manager(&db, 2000);
    history.add_to_history(&db, &model, "q1", "a1", 5).unwrap();
    history.add_to_history(&db, &model, "q2", "a2", 5).unwrap();

    model.push_text("[]");
    assert!(history.summarize_window(&model));
    assert_eq!(
        history.window(),
        &[HistoryEntry::user("q2"), HistoryEntry::assistant("a2")]
    );
    assert_eq!(history.window_json(), r#"[{"user":"q2"},{"assistant":"a2"}]"#);
}

#[test]
fn test_single_pair_window_is_not_compressed() {
    let db = Database::open_in_memory().unwrap();
    let model = ScriptedModel::new();
    let mut history = manager(&db, 2000);
    history.add_to_history(&db, &model, "q", "a", 5).unwrap();

    assert!(!history.summarize_window(&model));
    assert!(model.requests().is_empty());
}

#[test]
fn test_summary_waits_for_threshold_and_enough_pairs() {
    let db = Database::open_in_memory().unwrap();
    let model = ScriptedModel::new();
    let mut history = manager(&db, 2000);

    history.add_to_history(&db, &model, "q1", "a1", 2).unwrap();
    assert!(!history.update_chat_summary(&db, &model, 2).unwrap());

    // Threshold met, but only max_history_pairs pairs are stored
    history.add_to_history(&db, &model, "q2", "a2", 2).unwrap();
    assert!(!history.update_chat_summary(&db, &model, 2).unwrap());
    assert!(model.requests().is_empty());

    history.add_to_history(&db, &model, "q3", "a3", 2).unwrap();
    model.push_text("User asked three things.");
    assert!(history.update_chat_summary(&db, &model, 2).unwrap());

    assert_eq!(
        history.latest_summary(&db).unwrap().as_deref(),
        Some("User asked three things.")
    );
    assert_eq!(history.pairs_since_last_summary(), 0);

    let req = &model.requests()[0];
    assert_eq!(req.model, "summary-model");
    assert_eq!(req.messages[0].role, Role::System);
    let prompt = &req.messages[0].content;
    assert!(prompt.starts_with("Summarize the following conversation:"));
    assert!(prompt.contains("User: q1\nAssistant: a1"));
    assert!(prompt.contains("User: q3\nAssistant: a3"));
    assert!(!prompt.contains("Previous summary"));
}

#[test]
fn test_summary_includes_previous_summary() {
    let db = Database::open_in_memory().unwrap();
    let model = ScriptedModel::new();
    let mut history = manager(&db, 2000);
    let uid = db.first_user_id().unwrap().unwrap();
    db.insert_summary(uid, SESSION, "Earlier: talked about cats.").unwrap();

    for i in 1..=3 {
        history
            .add_to_history(&db, &model, &format!("q{i}"), &format!("a{i}"), 2)
            .unwrap();
    }
    model.push_text("Cats, then three questions.");
    assert!(history.update_chat_summary(&db, &model, 2).unwrap());

    let prompt = &model.requests()[0].messages[0].content;
    assert!(prompt.contains("Previous summary:\nEarlier: talked about cats."));
}

#[test]
fn test_summary_failure_keeps_counter() {
    let db = Database::open_in_memory().unwrap();
    let model = ScriptedModel::new();
    let mut history = manager(&db, 2000);
    for i in 1..=3 {
        history
            .add_to_history(&db, &model, &format!("q{i}"), &format!("a{i}"), 2)
            .unwrap();
    }

    model.push_error();
    assert!(!history.update_chat_summary(&db, &model, 2).unwrap());
    model.push_empty();
    assert!(!history.update_chat_summary(&db, &model, 2).unwrap());

    assert_eq!(history.pairs_since_last_summary(), 3);
    assert!(history.latest_summary(&db).unwrap().is_none());
}

#[test]
fn test_latest_chat_pairs_returns_twice_n() {
    let db = Database::open_in_memory().unwrap();
    let model = ScriptedModel::new();
    let mut history = manager(&db, 2000);
    for i in 1..=6 {
        history
            .add_to_history(&db, &model, &format!("q{i}"), &format!("a{i}"), 2)
            .unwrap();
    }
    let pairs = history.latest_chat_pairs(&db, 2).unwrap();
    let questions: Vec<&str> = pairs.iter().map(|p| p.question.as_str()).collect();
    assert_eq!(questions, vec!["q3", "q4", "q5", "q6"]);
}

#[test]
fn test_parse_compressed_entries() {
    assert_eq!(
        parse_compressed_entries(r#"{"user": "u", "assistant": "a"}"#),
        Some(vec![HistoryEntry {
            user: Some("u".to_string()),
            assistant: Some("a".to_string()),
        }])
    );
    assert_eq!(
        parse_compressed_entries("```\n[{\"assistant\": \"ok\"}]\n```"),
        Some(vec![HistoryEntry::assistant("ok")])
    );
    assert_eq!(parse_compressed_entries("[]"), Some(vec![]));
    assert_eq!(parse_compressed_entries(r#"[{"other": "x"}]"#), None);
    assert_eq!(parse_compressed_entries(r#""just a string""#), None);
    assert_eq!(parse_compressed_entries("not json"), None);
}
