pub mod chatbot;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod llm;
pub mod mcp;
pub mod prompt;
pub mod readiness;
pub mod repl;
pub mod server;
pub mod setup;
pub mod tokens;
pub mod tools;
pub mod user;
pub mod vector;
