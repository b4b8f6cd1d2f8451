use std::fs;
use std::path::PathBuf;

use mnemo_core::config::Config;
use tempfile::TempDir;

#[test]
fn test_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.llm.chat_model, "gpt-4o-mini");
    assert_eq!(cfg.llm.temperature, 0.0);
    assert_eq!(cfg.chat_history.max_history_pairs, 2);
    assert_eq!(cfg.chat_history.max_tokens, 2000);
    assert_eq!(cfg.agent.max_function_calls, 3);
    assert_eq!(cfg.vectordb.collection_name, "chat_history");
    assert_eq!(cfg.vectordb.k, 1);
    assert_eq!(cfg.server.port, 7860);
    assert_eq!(cfg.directories.db_path, PathBuf::from("data/chatbot.db"));
    cfg.validate().unwrap();
}

#[test]
fn test_partial_toml_keeps_other_defaults() {
    let cfg = Config::from_toml_str(
        r#"
[llm]
chat_model = "gpt-4o"
temperature = 0.3

[agent]
max_function_calls = 5
"#,
    )
    .unwrap();

    assert_eq!(cfg.llm.chat_model, "gpt-4o");
    assert!((cfg.llm.temperature - 0.3).abs() < f32::EPSILON);
    // Unspecified keys within a section fall back too
    assert_eq!(cfg.llm.summary_model, "gpt-4o-mini");
    assert_eq!(cfg.agent.max_function_calls, 5);
    assert_eq!(cfg.chat_history.max_history_pairs, 2);
}

#[test]
fn test_malformed_toml_is_an_error() {
    assert!(Config::from_toml_str("[llm\nchat_model = ").is_err());
    assert!(Config::from_toml_str("[agent]\nmax_function_calls = \"many\"").is_err());
}

#[test]
fn test_load_resolves_relative_db_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[directories]\ndb_path = \"store/memory.db\"\n").unwrap();

    let cfg = Config::load(&path).unwrap();
    assert_eq!(cfg.directories.db_path, dir.path().join("store/memory.db"));
}

#[test]
fn test_load_keeps_absolute_db_path() {
    let dir = TempDir::new().unwrap();
    let abs = dir.path().join("elsewhere.db");
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        format!("[directories]\ndb_path = {:?}\n", abs.to_string_lossy()),
    )
    .unwrap();

    let cfg = Config::load(&path).unwrap();
    assert_eq!(cfg.directories.db_path, abs);
}

#[test]
fn test_load_or_default_without_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.toml");

    assert!(Config::load(&path).is_err());
    let cfg = Config::load_or_default(&path).unwrap();
    assert_eq!(cfg.directories.db_path, dir.path().join("data/chatbot.db"));
    assert_eq!(cfg.llm.rag_model, "gpt-4o-mini");
}

#[test]
fn test_validate_rejects_bad_values() {
    let mut cfg = Config::default();
    cfg.chat_history.max_history_pairs = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.vectordb.k = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.llm.temperature = 2.5;
    let err = cfg.validate().unwrap_err().to_string();
    assert!(err.contains("temperature"), "got: {err}");

    let mut cfg = Config::default();
    cfg.vectordb.embedding_model = "  ".to_string();
    let err = cfg.validate().unwrap_err().to_string();
    assert!(err.contains("vectordb.embedding_model"), "got: {err}");
}
