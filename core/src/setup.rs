use std::path::Path;

use anyhow::{Context, Result};

use crate::db::Database;

/// Tables every prepared database must contain.
pub const REQUIRED_TABLES: &[&str] = &["chat_history", "summary", "user_info", "vector_documents"];

/// Create the database directory and schema, and seed the user row.
/// Safe to run repeatedly.
pub fn prepare_database(db_path: &Path) -> Result<Database> {
    if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            tracing::info!(dir = %dir.display(), "created data directory");
        }
    }

    let path_str = db_path.to_string_lossy();
    let db = Database::open(&path_str)?;
    let user_id = db.ensure_user()?;
    tracing::info!(db = %path_str, user_id, "database tables created");
    Ok(db)
}

/// Names from [`REQUIRED_TABLES`] that the database lacks.
pub fn missing_tables(db: &Database) -> Result<Vec<&'static str>> {
    let tables = db.table_names()?;
    Ok(REQUIRED_TABLES
        .iter()
        .copied()
        .filter(|t| !tables.iter().any(|name| name == t))
        .collect())
}
