use anyhow::{Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Data structs
// ---------------------------------------------------------------------------

/// The single user profile row. Empty strings are treated as unset, so the
/// serialized form only carries fields that actually hold information.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interests: Option<String>,
}

/// Updatable `user_info` columns. Column names in UPDATE statements come
/// only from here, never from caller-supplied strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UserField {
    Name,
    LastName,
    Age,
    Gender,
    Location,
    Occupation,
    Interests,
}

impl UserField {
    pub const ALL: [UserField; 7] = [
        UserField::Name,
        UserField::LastName,
        UserField::Age,
        UserField::Gender,
        UserField::Location,
        UserField::Occupation,
        UserField::Interests,
    ];

    pub fn column(self) -> &'static str {
        match self {
            UserField::Name => "name",
            UserField::LastName => "last_name",
            UserField::Age => "age",
            UserField::Gender => "gender",
            UserField::Location => "location",
            UserField::Occupation => "occupation",
            UserField::Interests => "interests",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.column() == key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatPair {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone)]
pub struct VectorDocument {
    pub id: i64,
    pub document: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub db_size_bytes: i64,
    pub user_count: i64,
    pub chat_pair_count: i64,
    pub summary_count: i64,
    pub vector_document_count: i64,
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;
        let db = Self { conn };
        db.apply_pragmas()?;
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .context("failed to open in-memory database")?;
        let db = Self { conn };
        db.apply_pragmas()?;
        db.migrate()?;
        Ok(db)
    }

    fn apply_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Execute `f` inside an IMMEDIATE transaction. Commits on Ok, rolls back on Err.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f() {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS user_info (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                name       TEXT NOT NULL,
                last_name  TEXT NOT NULL,
                occupation TEXT NOT NULL,
                location   TEXT NOT NULL,
                age        INTEGER,
                gender     TEXT,
                interests  TEXT
            );

            CREATE TABLE IF NOT EXISTS chat_history (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    INTEGER REFERENCES user_info(id),
                timestamp  DATETIME DEFAULT CURRENT_TIMESTAMP,
                question   TEXT NOT NULL,
                answer     TEXT NOT NULL,
                session_id TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS summary (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      INTEGER REFERENCES user_info(id),
                session_id   TEXT NOT NULL,
                summary_text TEXT NOT NULL,
                timestamp    DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS vector_documents (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                collection   TEXT NOT NULL,
                document     TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                embedding    BLOB NOT NULL,
                created_at   TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(collection, content_hash)
            );

            CREATE INDEX IF NOT EXISTS idx_chat_history_session ON chat_history(session_id);
            CREATE INDEX IF NOT EXISTS idx_summary_session      ON summary(session_id);
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // User info
    // -----------------------------------------------------------------------

    /// The first (and only) user row, if any.
    pub fn first_user(&self) -> Result<Option<UserInfo>> {
        let r = self
            .conn
            .query_row(
                "SELECT id, name, last_name, occupation, location, gender, age, interests
                 FROM user_info ORDER BY id LIMIT 1",
                [],
                |row| {
                    Ok(UserInfo {
                        id: row.get(0)?,
                        name: non_empty(row.get(1)?),
                        last_name: non_empty(row.get(2)?),
                        occupation: non_empty(row.get(3)?),
                        location: non_empty(row.get(4)?),
                        gender: non_empty(row.get(5)?),
                        age: row.get(6)?,
                        interests: non_empty(row.get(7)?),
                    })
                },
            )
            .optional()?;
        Ok(r)
    }

    pub fn first_user_id(&self) -> Result<Option<i64>> {
        let r = self
            .conn
            .query_row("SELECT id FROM user_info ORDER BY id LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(r)
    }

    /// Return the user id, inserting an empty profile row when the table is
    /// empty so updates always have a target.
    pub fn ensure_user(&self) -> Result<i64> {
        if let Some(id) = self.first_user_id()? {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO user_info (name, last_name, occupation, location)
             VALUES ('', '', '', '')",
            [],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn user_interests(&self) -> Result<Option<String>> {
        let r: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT interests FROM user_info ORDER BY id LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(r.flatten())
    }

    /// Update the given columns on the first user row. Returns rows changed.
    pub fn update_user_fields(&self, fields: &[(UserField, SqlValue)]) -> Result<usize> {
        if fields.is_empty() {
            return Ok(0);
        }
        let set_clause = fields
            .iter()
            .enumerate()
            .map(|(i, (field, _))| format!("{} = ?{}", field.column(), i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE user_info SET {set_clause}
             WHERE id = (SELECT id FROM user_info ORDER BY id LIMIT 1)"
        );
        let values = fields.iter().map(|(_, v)| v.clone());
        let changed = self.conn.execute(&sql, params_from_iter(values))?;
        Ok(changed)
    }

    // -----------------------------------------------------------------------
    // Chat history
    // -----------------------------------------------------------------------

    pub fn insert_chat_pair(
        &self,
        user_id: i64,
        question: &str,
        answer: &str,
        session_id: &str,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO chat_history (user_id, question, answer, session_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, question, answer, session_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Newest `limit` pairs of a session, returned oldest first.
    pub fn latest_chat_pairs(&self, session_id: &str, limit: usize) -> Result<Vec<ChatPair>> {
        let mut stmt = self.conn.prepare(
            "SELECT question, answer FROM chat_history
             WHERE session_id = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![session_id, limit as i64], |row| {
            Ok(ChatPair {
                question: row.get(0)?,
                answer: row.get(1)?,
            })
        })?;
        let mut pairs = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        pairs.reverse();
        Ok(pairs)
    }

    pub fn count_chat_pairs(&self, session_id: &str) -> Result<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM chat_history WHERE session_id = ?1",
            params![session_id],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    // -----------------------------------------------------------------------
    // Summaries
    // -----------------------------------------------------------------------

    pub fn insert_summary(&self, user_id: i64, session_id: &str, summary_text: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO summary (user_id, session_id, summary_text) VALUES (?1, ?2, ?3)",
            params![user_id, session_id, summary_text],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn latest_summary(&self, session_id: &str) -> Result<Option<String>> {
        let r = self
            .conn
            .query_row(
                "SELECT summary_text FROM summary
                 WHERE session_id = ?1
                 ORDER BY timestamp DESC, id DESC
                 LIMIT 1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(r)
    }

    // -----------------------------------------------------------------------
    // Vector documents
    // -----------------------------------------------------------------------

    /// Store a document with its embedding. Returns false when the same
    /// content already exists in the collection.
    pub fn insert_vector_document(
        &self,
        collection: &str,
        document: &str,
        content_hash: &str,
        embedding: &[f32],
    ) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO vector_documents (collection, document, content_hash, embedding)
             VALUES (?1, ?2, ?3, ?4)",
            params![collection, document, content_hash, f32_vec_to_bytes(embedding)],
        )?;
        Ok(changed > 0)
    }

    pub fn vector_documents(&self, collection: &str) -> Result<Vec<VectorDocument>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, document, embedding FROM vector_documents
             WHERE collection = ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![collection], |row| {
            let blob: Vec<u8> = row.get(2)?;
            Ok(VectorDocument {
                id: row.get(0)?,
                document: row.get(1)?,
                embedding: bytes_to_f32_vec(&blob),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn count_vector_documents(&self, collection: &str) -> Result<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM vector_documents WHERE collection = ?1",
            params![collection],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub fn get_health(&self) -> Result<HealthReport> {
        let db_size: i64 = self
            .conn
            .query_row(
                "SELECT page_count * page_size FROM pragma_page_count, pragma_page_size",
                [],
                |r| r.get(0),
            )
            .unwrap_or(0);
        let user_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM user_info", [], |r| r.get(0))?;
        let chat_pair_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chat_history", [], |r| r.get(0))?;
        let summary_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM summary", [], |r| r.get(0))?;
        let vector_document_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM vector_documents", [], |r| r.get(0))?;
        Ok(HealthReport {
            db_size_bytes: db_size,
            user_count,
            chat_pair_count,
            summary_count,
            vector_document_count,
        })
    }

    /// Return all user table names (for testing/diagnostics).
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table'
             AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Embedding BLOB encoding (little-endian f32)
// ---------------------------------------------------------------------------

pub fn f32_vec_to_bytes(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn bytes_to_f32_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
