use std::collections::BTreeSet;

use anyhow::Result;
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};

use crate::db::{Database, UserField, UserInfo};
use crate::tools::FunctionResult;

const INVALID_KEY_MESSAGE: &str = "Please provide a valid key from the following list: \
    name, last_name, age, gender, location, occupation, interests";

/// Cached view of the single user profile.
#[derive(Debug, Default)]
pub struct UserManager {
    info: Option<UserInfo>,
    user_id: Option<i64>,
}

impl UserManager {
    pub fn load(db: &Database) -> Result<Self> {
        let info = db.first_user()?;
        let user_id = info.as_ref().and_then(|u| u.id);
        Ok(Self { info, user_id })
    }

    pub fn refresh(&mut self, db: &Database) -> Result<()> {
        self.info = db.first_user()?;
        self.user_id = self.info.as_ref().and_then(|u| u.id);
        Ok(())
    }

    pub fn user_info(&self) -> Option<&UserInfo> {
        self.info.as_ref()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    /// JSON rendering for the system prompt; `{}` when there is no user yet.
    pub fn info_json(&self) -> String {
        self.info
            .as_ref()
            .and_then(|info| serde_json::to_string(info).ok())
            .unwrap_or_else(|| "{}".to_string())
    }

    /// Agent function `add_user_info_to_database`.
    ///
    /// Validates every key up front, merges `interests` with what is stored,
    /// then applies all columns in one UPDATE. The cached view is not
    /// refreshed here; callers refresh once the turn accepts the result.
    pub fn add_user_info(&mut self, db: &Database, user_info: &Map<String, Value>) -> FunctionResult {
        tracing::info!(fields = ?user_info.keys().collect::<Vec<_>>(), "updating user info");

        let mut fields: Vec<(UserField, &Value)> = Vec::with_capacity(user_info.len());
        for (key, value) in user_info {
            match UserField::parse(key) {
                Some(field) => fields.push((field, value)),
                None => return FunctionResult::failure(INVALID_KEY_MESSAGE),
            }
        }
        if fields.is_empty() {
            return FunctionResult::failure("No valid fields to update.");
        }

        let result = db.with_transaction(|| {
            let user_id = db.ensure_user()?;
            let mut updates = Vec::with_capacity(fields.len());
            for (field, value) in &fields {
                let sql_value = match field {
                    UserField::Interests => {
                        let existing = db.user_interests()?.unwrap_or_default();
                        SqlValue::Text(merge_interests(&existing, value))
                    }
                    UserField::Age => match age_value(value) {
                        Some(age) => SqlValue::Integer(age),
                        None => anyhow::bail!("age must be an integer, got {value}"),
                    },
                    _ => SqlValue::Text(text_value(value)),
                };
                updates.push((*field, sql_value));
            }
            db.update_user_fields(&updates)?;
            Ok(user_id)
        });

        match result {
            Ok(user_id) => {
                self.user_id = Some(user_id);
                FunctionResult::success("User information updated.")
            }
            Err(e) => {
                tracing::warn!(error = %e, "user info update failed");
                FunctionResult::failure(format!("Error: {e}"))
            }
        }
    }
}

/// Split a stored or supplied interest list on commas, trimming blanks.
fn split_interests(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Union of stored and new interests, sorted and joined with ", ".
/// New interests may be a comma-separated string or an array of strings.
pub fn merge_interests(existing: &str, new: &Value) -> String {
    let mut merged: BTreeSet<String> = split_interests(existing).collect();
    match new {
        Value::String(s) => merged.extend(split_interests(s)),
        Value::Array(items) => merged.extend(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        ),
        _ => {}
    }
    merged.into_iter().collect::<Vec<_>>().join(", ")
}

fn age_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
