use std::path::Path;
use std::time::Duration;

use crate::chatbot::Chatbot;
use crate::config::{Config, API_KEY_ENV};
use crate::llm::OpenAiClient;
use crate::setup;
use crate::vector::VectorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct CheckLine {
    pub status: CheckStatus,
    pub text: String,
}

/// Result of a production-readiness run: one line per check plus the issues
/// that make the run fail.
#[derive(Debug, Default)]
pub struct ReadinessReport {
    pub lines: Vec<CheckLine>,
    pub issues: Vec<String>,
}

impl ReadinessReport {
    fn ok(&mut self, text: impl Into<String>) {
        self.lines.push(CheckLine { status: CheckStatus::Ok, text: text.into() });
    }

    fn warn(&mut self, text: impl Into<String>) {
        self.lines.push(CheckLine { status: CheckStatus::Warning, text: text.into() });
    }

    fn fail(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.issues.push(text.clone());
        self.lines.push(CheckLine { status: CheckStatus::Error, text });
    }

    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::from("Running production readiness checks\n");
        out.push_str(&"=".repeat(50));
        out.push('\n');
        for line in &self.lines {
            let tag = match line.status {
                CheckStatus::Ok => "OK   ",
                CheckStatus::Warning => "WARN ",
                CheckStatus::Error => "ERROR",
            };
            out.push_str(&format!("[{tag}] {}\n", line.text));
        }
        out.push_str(&"=".repeat(50));
        out.push('\n');
        if self.passed() {
            out.push_str("PRODUCTION READINESS: PASSED\n");
        } else {
            out.push_str("PRODUCTION READINESS: FAILED\n\n");
            out.push_str(&format!("Found {} issues:\n", self.issues.len()));
            for (i, issue) in self.issues.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", i + 1, issue));
            }
        }
        out
    }
}

/// Run every check against the config at `config_path`. A missing config
/// file is reported, and the remaining checks continue on defaults.
pub fn run_checks(config_path: &Path, api_key: Option<&str>) -> ReadinessReport {
    let mut report = ReadinessReport::default();

    // Environment
    match api_key {
        Some(_) => report.ok(format!("{API_KEY_ENV} is set")),
        None => report.fail(format!("{API_KEY_ENV} is not set")),
    }

    let cfg = if config_path.exists() {
        match Config::load(config_path) {
            Ok(cfg) => {
                report.ok(format!("config found at {}", config_path.display()));
                cfg
            }
            Err(e) => {
                report.fail(format!("config could not be loaded: {e:#}"));
                return report;
            }
        }
    } else {
        report.fail(format!("{} not found", config_path.display()));
        match Config::load_or_default(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                report.fail(format!("default config could not be built: {e:#}"));
                return report;
            }
        }
    };

    match cfg.validate() {
        Ok(()) => report.ok("config values are valid"),
        Err(e) => report.fail(format!("invalid config: {e:#}")),
    }

    // Database setup
    let db = match setup::prepare_database(&cfg.directories.db_path) {
        Ok(db) => db,
        Err(e) => {
            report.fail(format!("database setup failed: {e:#}"));
            return report;
        }
    };
    match setup::missing_tables(&db) {
        Ok(missing) if missing.is_empty() => report.ok("SQL database setup"),
        Ok(missing) => report.fail(format!("database is missing tables: {}", missing.join(", "))),
        Err(e) => report.fail(format!("database inspection failed: {e:#}")),
    }

    // Vector store
    let store = VectorStore::new(&cfg);
    match store.count(&db) {
        Ok(n) => report.ok(format!("vector collection '{}' ({n} documents)", store.collection())),
        Err(e) => report.fail(format!("vector store check failed: {e:#}")),
    }

    // Components
    let Some(key) = api_key else {
        report.warn("chatbot construction skipped (no API key)");
        return report;
    };
    let timeout = Duration::from_secs(cfg.llm.request_timeout_secs);
    match OpenAiClient::new(key, &cfg.api_base(), timeout) {
        Ok(client) => match Chatbot::new(cfg, db, Box::new(client)) {
            Ok(bot) => report.ok(format!("chatbot constructed (session {})", bot.session_id())),
            Err(e) => report.fail(format!("chatbot construction failed: {e:#}")),
        },
        Err(e) => report.fail(format!("model client construction failed: {e}")),
    }

    report
}
