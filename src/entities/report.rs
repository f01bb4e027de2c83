// 📄 Prediction Report - an uploaded document moving through ministry approval
//
//   pending ──approve──▶ approved
//      │                   ▲  │
//      └────deny────▶ denied ◀┘   (any state may be re-approved or re-denied)
//
// Sending to MINEDUC is a separate flag and never interacts with status.

use crate::db::{get_datetime, get_opt_datetime};
use crate::error::{or_not_found, Result, SipmsError};
use crate::storage::StoredDocument;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Approved,
    Denied,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Approved => "approved",
            ReportStatus::Denied => "denied",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "approved" => Ok(ReportStatus::Approved),
            "denied" => Ok(ReportStatus::Denied),
            other => Err(format!("unknown report status: {}", other)),
        }
    }
}

// ============================================================================
// REPORT ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionReport {
    pub id: i64,
    pub location: String,

    /// Path of the stored document, relative to the media root
    pub document: String,
    pub document_name: String,
    pub document_size: u64,
    pub document_sha256: String,

    pub is_sent_to_mineduc: bool,
    pub status: ReportStatus,
    pub denial_reason: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl PredictionReport {
    /// approved, stamped now; any earlier denial reason is dropped
    pub fn approve(&mut self, now: DateTime<Utc>) {
        self.status = ReportStatus::Approved;
        self.denial_reason = None;
        self.approved_at = Some(now);
    }

    /// denied with a reason; any earlier approval stamp is dropped
    pub fn deny(&mut self, reason: String) {
        self.status = ReportStatus::Denied;
        self.denial_reason = Some(reason);
        self.approved_at = None;
    }

    pub fn send_to_mineduc(&mut self) {
        self.is_sent_to_mineduc = true;
    }
}

/// What the caller supplies for a new report; the document is already stored.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub location: String,
    pub document: StoredDocument,
    pub created_by: i64,
}

const COLUMNS: &str = "id, location, document, document_name, document_size, document_sha256,
    is_sent_to_mineduc, status, denial_reason, approved_at, created_by, created_at";

fn from_row(row: &Row) -> rusqlite::Result<PredictionReport> {
    let status: String = row.get(7)?;
    let size: i64 = row.get(4)?;

    Ok(PredictionReport {
        id: row.get(0)?,
        location: row.get(1)?,
        document: row.get(2)?,
        document_name: row.get(3)?,
        document_size: u64::try_from(size).unwrap_or_default(),
        document_sha256: row.get(5)?,
        is_sent_to_mineduc: row.get(6)?,
        status: status.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, e.into())
        })?,
        denial_reason: row.get(8)?,
        approved_at: get_opt_datetime(row, 9)?,
        created_by: row.get(10)?,
        created_at: get_datetime(row, 11)?,
    })
}

fn check_creator(conn: &Connection, user_id: i64) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [user_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(SipmsError::invalid(
            "created_by",
            format!("Invalid pk \"{}\" - object does not exist", user_id),
        ))
    }
}

pub fn insert_report(conn: &Connection, new: NewReport) -> Result<PredictionReport> {
    check_creator(conn, new.created_by)?;

    conn.execute(
        "INSERT INTO prediction_reports (
            location, document, document_name, document_size, document_sha256,
            is_sent_to_mineduc, status, created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, 'pending', ?6, ?7)",
        params![
            new.location.trim(),
            new.document.path,
            new.document.file_name,
            i64::try_from(new.document.size).unwrap_or(i64::MAX),
            new.document.sha256,
            new.created_by,
            Utc::now().to_rfc3339(),
        ],
    )?;

    get_report(conn, conn.last_insert_rowid())
}

pub fn get_report(conn: &Connection, id: i64) -> Result<PredictionReport> {
    let sql = format!("SELECT {} FROM prediction_reports WHERE id = ?1", COLUMNS);
    or_not_found(conn.query_row(&sql, [id], from_row), "PredictionReport", id)
}

/// Newest first. `location` matches as a case-insensitive substring.
pub fn list_reports(conn: &Connection, location: Option<&str>) -> Result<Vec<PredictionReport>> {
    let pattern = location
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| format!("%{}%", escape_like(l)));
    let sql = format!(
        "SELECT {} FROM prediction_reports
         WHERE ?1 IS NULL OR location LIKE ?1 ESCAPE '\\'
         ORDER BY created_at DESC, id DESC",
        COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let reports = stmt
        .query_map([pattern], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(reports)
}

/// `%` and `_` in a search term match themselves.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Exact location, ignoring case.
pub fn reports_by_location(conn: &Connection, location: &str) -> Result<Vec<PredictionReport>> {
    let sql = format!(
        "SELECT {} FROM prediction_reports
         WHERE location = ?1 COLLATE NOCASE
         ORDER BY created_at DESC, id DESC",
        COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let reports = stmt
        .query_map([location.trim()], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(reports)
}

/// Persist the workflow columns of a report.
pub fn save_report_state(conn: &Connection, report: &PredictionReport) -> Result<()> {
    let changed = conn.execute(
        "UPDATE prediction_reports SET
            is_sent_to_mineduc = ?1, status = ?2, denial_reason = ?3, approved_at = ?4
         WHERE id = ?5",
        params![
            report.is_sent_to_mineduc,
            report.status.as_str(),
            report.denial_reason,
            report.approved_at.map(|dt| dt.to_rfc3339()),
            report.id,
        ],
    )?;
    crate::db::ensure_changed(changed, "PredictionReport", report.id)
}

pub fn delete_report(conn: &Connection, id: i64) -> Result<PredictionReport> {
    let report = get_report(conn, id)?;
    conn.execute("DELETE FROM prediction_reports WHERE id = ?1", [id])?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Role;
    use crate::test_support::{memory_db, seed_report, seed_user};
    use chrono::Duration;

    #[test]
    fn test_new_report_is_pending() {
        let conn = memory_db();
        let user = seed_user(&conn, Role::District);
        let report = seed_report(&conn, user.id, "Gasabo");

        assert_eq!(report.status, ReportStatus::Pending);
        assert!(!report.is_sent_to_mineduc);
        assert_eq!(report.denial_reason, None);
        assert_eq!(report.approved_at, None);
    }

    #[test]
    fn test_deny_then_approve_are_exclusive() {
        let conn = memory_db();
        let user = seed_user(&conn, Role::District);
        let mut report = seed_report(&conn, user.id, "Gasabo");

        report.deny("x".to_string());
        save_report_state(&conn, &report).unwrap();
        let stored = get_report(&conn, report.id).unwrap();
        assert_eq!(stored.status, ReportStatus::Denied);
        assert_eq!(stored.denial_reason.as_deref(), Some("x"));
        assert_eq!(stored.approved_at, None);

        report.approve(Utc::now());
        save_report_state(&conn, &report).unwrap();
        let stored = get_report(&conn, report.id).unwrap();
        assert_eq!(stored.status, ReportStatus::Approved);
        assert_eq!(stored.denial_reason, None);
        assert!(stored.approved_at.is_some());
    }

    #[test]
    fn test_reapprove_only_moves_timestamp() {
        let mut report = PredictionReport {
            id: 1,
            location: "Kicukiro".to_string(),
            document: "prediction_reports/a.pdf".to_string(),
            document_name: "a.pdf".to_string(),
            document_size: 1,
            document_sha256: String::new(),
            is_sent_to_mineduc: false,
            status: ReportStatus::Pending,
            denial_reason: None,
            approved_at: None,
            created_by: 1,
            created_at: Utc::now(),
        };
        let first = Utc::now();
        let later = first + Duration::seconds(30);

        report.approve(first);
        report.approve(later);

        assert_eq!(report.status, ReportStatus::Approved);
        assert_eq!(report.approved_at, Some(later));
        assert!(!report.is_sent_to_mineduc);
    }

    #[test]
    fn test_send_is_orthogonal_to_status() {
        let conn = memory_db();
        let user = seed_user(&conn, Role::District);
        let mut report = seed_report(&conn, user.id, "Gasabo");
        report.deny("incomplete".to_string());
        report.send_to_mineduc();
        save_report_state(&conn, &report).unwrap();

        let stored = get_report(&conn, report.id).unwrap();
        assert!(stored.is_sent_to_mineduc);
        assert_eq!(stored.status, ReportStatus::Denied);
    }

    #[test]
    fn test_location_filters() {
        let conn = memory_db();
        let user = seed_user(&conn, Role::District);
        seed_report(&conn, user.id, "Gasabo");
        seed_report(&conn, user.id, "Gasabo - Kimironko");
        seed_report(&conn, user.id, "Kicukiro");
        seed_report(&conn, user.id, "Site_100%");

        assert_eq!(list_reports(&conn, None).unwrap().len(), 4);
        assert_eq!(list_reports(&conn, Some("gasabo")).unwrap().len(), 2);

        // wildcards are literal characters
        let underscore = list_reports(&conn, Some("_")).unwrap();
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].location, "Site_100%");
        assert_eq!(list_reports(&conn, Some("%")).unwrap().len(), 1);
        assert!(list_reports(&conn, Some("Gas%bo")).unwrap().is_empty());
        assert!(list_reports(&conn, Some("o\\")).unwrap().is_empty());
        assert_eq!(reports_by_location(&conn, "GASABO").unwrap().len(), 1);
        assert!(reports_by_location(&conn, "Nyarugenge").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_creator_rejected() {
        let conn = memory_db();
        let err = insert_report(
            &conn,
            NewReport {
                location: "Gasabo".to_string(),
                document: StoredDocument {
                    path: "prediction_reports/x.pdf".to_string(),
                    file_name: "x.pdf".to_string(),
                    size: 3,
                    sha256: "abc".to_string(),
                },
                created_by: 404,
            },
        )
        .unwrap_err();

        assert!(matches!(err, SipmsError::Validation(_)));
    }
}
