// 🔔 Notification - broadcast message from one role to another

use crate::db::get_datetime;
use crate::entities::user::{get_role, Role};
use crate::error::{or_not_found, Result};
use crate::validation::Validator;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    /// Audience
    pub role: Role,
    pub sender: Role,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationInput {
    pub role: Option<Role>,
    pub sender: Option<Role>,
    pub message: Option<String>,
}

impl NotificationInput {
    fn validate(&self, creating: bool) -> Result<()> {
        let mut v = Validator::new();
        if creating {
            if self.role.is_none() {
                v.push("role", "This field is required");
            }
            if self.sender.is_none() {
                v.push("sender", "This field is required");
            }
        }
        if creating || self.message.is_some() {
            v.required("message", self.message.as_deref());
        }
        v.finish()
    }
}

const COLUMNS: &str = "id, role, sender, message, created_at";

fn from_row(row: &Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        role: get_role(row, 1)?,
        sender: get_role(row, 2)?,
        message: row.get(3)?,
        created_at: get_datetime(row, 4)?,
    })
}

pub fn insert_notification(conn: &Connection, input: NotificationInput) -> Result<Notification> {
    input.validate(true)?;

    conn.execute(
        "INSERT INTO notifications (role, sender, message, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            input.role.unwrap_or(Role::School).as_str(),
            input.sender.unwrap_or(Role::Admin).as_str(),
            input.message,
            Utc::now().to_rfc3339(),
        ],
    )?;

    get_notification(conn, conn.last_insert_rowid())
}

pub fn get_notification(conn: &Connection, id: i64) -> Result<Notification> {
    let sql = format!("SELECT {} FROM notifications WHERE id = ?1", COLUMNS);
    or_not_found(conn.query_row(&sql, [id], from_row), "Notification", id)
}

/// Newest first; `role` narrows to one audience.
pub fn list_notifications(conn: &Connection, role: Option<Role>) -> Result<Vec<Notification>> {
    let sql = format!(
        "SELECT {} FROM notifications WHERE ?1 IS NULL OR role = ?1
         ORDER BY created_at DESC, id DESC",
        COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let notifications = stmt
        .query_map([role.map(|r| r.as_str())], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(notifications)
}

pub fn update_notification(
    conn: &Connection,
    id: i64,
    input: NotificationInput,
) -> Result<Notification> {
    input.validate(false)?;
    let mut notification = get_notification(conn, id)?;

    if let Some(role) = input.role {
        notification.role = role;
    }
    if let Some(sender) = input.sender {
        notification.sender = sender;
    }
    if let Some(message) = input.message {
        notification.message = message;
    }

    conn.execute(
        "UPDATE notifications SET role = ?1, sender = ?2, message = ?3 WHERE id = ?4",
        params![
            notification.role.as_str(),
            notification.sender.as_str(),
            notification.message,
            id,
        ],
    )?;

    Ok(notification)
}

pub fn delete_notification(conn: &Connection, id: i64) -> Result<Notification> {
    let notification = get_notification(conn, id)?;
    conn.execute("DELETE FROM notifications WHERE id = ?1", [id])?;
    Ok(notification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SipmsError;
    use crate::test_support::memory_db;

    fn input(role: Role, message: &str) -> NotificationInput {
        NotificationInput {
            role: Some(role),
            sender: Some(Role::Mineduc),
            message: Some(message.to_string()),
        }
    }

    #[test]
    fn test_list_newest_first_and_filter() {
        let conn = memory_db();
        let first = insert_notification(&conn, input(Role::District, "Submit reports")).unwrap();
        let second = insert_notification(&conn, input(Role::School, "Update population")).unwrap();

        let all = list_notifications(&conn, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);
        assert_eq!(all[1].id, first.id);

        let district = list_notifications(&conn, Some(Role::District)).unwrap();
        assert_eq!(district.len(), 1);
        assert_eq!(district[0].message, "Submit reports");
    }

    #[test]
    fn test_message_required() {
        let conn = memory_db();
        let err = insert_notification(
            &conn,
            NotificationInput {
                role: Some(Role::School),
                sender: Some(Role::Admin),
                message: Some("".to_string()),
            },
        )
        .unwrap_err();

        assert!(matches!(err, SipmsError::Validation(_)));
    }

    #[test]
    fn test_update_message() {
        let conn = memory_db();
        let n = insert_notification(&conn, input(Role::Umurenge, "draft")).unwrap();

        let updated = update_notification(
            &conn,
            n.id,
            NotificationInput {
                message: Some("final".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(updated.message, "final");
        assert_eq!(updated.role, Role::Umurenge);
    }
}
