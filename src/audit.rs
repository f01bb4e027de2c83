// Audit trail - one ActionLog row per state change ("every change is an event")
//
// Entries are append-only: nothing in the crate updates or deletes them.
// Writing one never fails the operation that produced it.

use crate::db::get_datetime;
use crate::entities::User;
use crate::error::{or_not_found, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    Send,
    Approve,
    Deny,
    Upload,
    Other,
    Login,
}

impl ActionKind {
    pub const ALL: [ActionKind; 9] = [
        ActionKind::Create,
        ActionKind::Update,
        ActionKind::Delete,
        ActionKind::Send,
        ActionKind::Approve,
        ActionKind::Deny,
        ActionKind::Upload,
        ActionKind::Other,
        ActionKind::Login,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "CREATE",
            ActionKind::Update => "UPDATE",
            ActionKind::Delete => "DELETE",
            ActionKind::Send => "SEND",
            ActionKind::Approve => "APPROVE",
            ActionKind::Deny => "DENY",
            ActionKind::Upload => "UPLOAD",
            ActionKind::Other => "OTHER",
            ActionKind::Login => "LOGIN",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("\"{}\" is not a valid action", s))
    }
}

// Same spellings as the CLI: any case
impl<'de> Deserialize<'de> for ActionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Audit trail entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLog {
    pub id: i64,
    pub user_id: Option<i64>,
    /// Resolved at read time; None once the user is gone
    pub username: Option<String>,
    pub action: ActionKind,
    pub model_name: String,
    pub object_id: Option<i64>,
    pub details: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// An entry about to be written.
#[derive(Debug, Clone)]
pub struct AuditEntry<'a> {
    pub actor: Option<&'a User>,
    pub action: ActionKind,
    pub model_name: &'a str,
    pub object_id: Option<i64>,
    pub details: Option<Value>,
}

impl<'a> AuditEntry<'a> {
    pub fn new(
        actor: Option<&'a User>,
        action: ActionKind,
        model_name: &'a str,
        object_id: Option<i64>,
    ) -> Self {
        AuditEntry {
            actor,
            action,
            model_name,
            object_id,
            details: None,
        }
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Append one entry and return it.
pub fn insert_action_log(conn: &Connection, entry: &AuditEntry) -> Result<ActionLog> {
    let details = entry
        .details
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO action_logs (user_id, action, model_name, object_id, details, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.actor.map(|u| u.id),
            entry.action.as_str(),
            entry.model_name,
            entry.object_id,
            details,
            Utc::now().to_rfc3339(),
        ],
    )?;

    get_action_log(conn, conn.last_insert_rowid())
}

/// Fire-and-forget append used by every mutating workflow operation.
///
/// A failed write is reported and swallowed so the mutation that already
/// happened still reaches the caller.
pub fn log_action(conn: &Connection, entry: AuditEntry) {
    if let Err(e) = insert_action_log(conn, &entry) {
        tracing::warn!(
            action = %entry.action,
            model = entry.model_name,
            object_id = ?entry.object_id,
            error = %e,
            "failed to write action log"
        );
    }
}

const SELECT: &str = "SELECT a.id, a.user_id, u.username, a.action, a.model_name, a.object_id,
        a.details, a.timestamp
    FROM action_logs a
    LEFT JOIN users u ON u.id = a.user_id";

fn from_row(row: &Row) -> rusqlite::Result<ActionLog> {
    let action: String = row.get(3)?;
    let details: Option<String> = row.get(6)?;

    Ok(ActionLog {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        action: action.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?,
        model_name: row.get(4)?,
        object_id: row.get(5)?,
        details: details
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
            })?,
        timestamp: get_datetime(row, 7)?,
    })
}

pub fn get_action_log(conn: &Connection, id: i64) -> Result<ActionLog> {
    let sql = format!("{} WHERE a.id = ?1", SELECT);
    or_not_found(conn.query_row(&sql, [id], from_row), "ActionLog", id)
}

/// Filter criteria for audit queries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionLogFilter {
    pub action: Option<ActionKind>,
    pub model_name: Option<String>,
    pub object_id: Option<i64>,
    pub user_id: Option<i64>,
    pub limit: Option<u32>,
}

/// Newest first, default 100 entries.
pub fn list_action_logs(conn: &Connection, filter: &ActionLogFilter) -> Result<Vec<ActionLog>> {
    let sql = format!(
        "{} WHERE (?1 IS NULL OR a.action = ?1)
           AND (?2 IS NULL OR a.model_name = ?2 COLLATE NOCASE)
           AND (?3 IS NULL OR a.object_id = ?3)
           AND (?4 IS NULL OR a.user_id = ?4)
         ORDER BY a.timestamp DESC, a.id DESC
         LIMIT ?5",
        SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let logs = stmt
        .query_map(
            params![
                filter.action.map(|a| a.as_str()),
                filter.model_name,
                filter.object_id,
                filter.user_id,
                filter.limit.unwrap_or(100),
            ],
            from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(logs)
}

pub fn count_action_logs(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM action_logs", [], |row| row.get(0))?;
    Ok(count)
}

/// Top-level keys whose values differ between two serialized records.
pub fn changed_fields<T: Serialize>(before: &T, after: &T) -> Vec<String> {
    let (Ok(Value::Object(old)), Ok(Value::Object(new))) =
        (serde_json::to_value(before), serde_json::to_value(after))
    else {
        return Vec::new();
    };

    new.iter()
        .filter(|(key, value)| old.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect()
}
