// School CSV import
//
// Headers: name, location, sector, established_year, student_population,
// number_of_rooms, head_teacher, email, phone. Optional columns may be blank.
// All rows go in one transaction; one bad row rejects the whole file.

use crate::audit::{log_action, ActionKind, AuditEntry};
use crate::entities::school::insert_school;
use crate::entities::{SchoolInput, User};
use crate::error::{Result, SipmsError};
use crate::validation::FieldError;
use anyhow::Context;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct SchoolRow {
    name: Option<String>,
    location: Option<String>,
    sector: Option<String>,
    established_year: Option<i32>,
    student_population: Option<i64>,
    number_of_rooms: Option<i64>,
    head_teacher: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

impl From<SchoolRow> for SchoolInput {
    fn from(row: SchoolRow) -> Self {
        SchoolInput {
            name: row.name,
            location: row.location,
            sector: row.sector,
            established_year: row.established_year,
            student_population: row.student_population,
            number_of_rooms: row.number_of_rooms,
            head_teacher: row.head_teacher,
            email: row.email,
            phone: row.phone,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub source_file: String,
    pub imported: usize,
}

/// Parse without touching the database.
fn read_rows(csv_path: &Path) -> Result<Vec<SchoolInput>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let mut rows = Vec::new();
    for (index, result) in rdr.deserialize::<SchoolRow>().enumerate() {
        // Line 1 is the header
        let row = result.with_context(|| format!("Failed to parse CSV line {}", index + 2))?;
        rows.push(row.into());
    }
    Ok(rows)
}

pub fn import_schools(
    conn: &Connection,
    actor: Option<&User>,
    csv_path: &Path,
) -> Result<ImportSummary> {
    let rows = read_rows(csv_path)?;
    let imported = rows.len();

    let tx = conn.unchecked_transaction()?;
    for (index, input) in rows.into_iter().enumerate() {
        insert_school(&tx, input).map_err(|e| at_line(e, index + 2))?;
    }
    tx.commit()?;

    let summary = ImportSummary {
        source_file: csv_path.display().to_string(),
        imported,
    };
    tracing::info!(source = %summary.source_file, imported, "schools imported");
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Other, "School", None).details(json!({
            "source_file": summary.source_file,
            "imported": imported,
        })),
    );
    Ok(summary)
}

/// Prefix validation errors with the CSV line they came from.
fn at_line(err: SipmsError, line: usize) -> SipmsError {
    match err {
        SipmsError::Validation(errors) => SipmsError::Validation(
            errors
                .into_iter()
                .map(|e| FieldError::new(&format!("line {}: {}", line, e.field), e.message))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{count_action_logs, list_action_logs, ActionLogFilter};
    use crate::entities::school::list_schools;
    use crate::test_support::memory_db;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const HEADER: &str =
        "name,location,sector,established_year,student_population,number_of_rooms,head_teacher,email,phone\n";

    fn csv_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(HEADER.as_bytes()).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_import_inserts_all_and_logs_once() {
        let conn = memory_db();
        let file = csv_file(
            "GS Kimironko,Gasabo,Kimironko,1998,420,6,Jean Bosco,gs@kimironko.rw,0788000000\n\
             EP Remera,Gasabo,Remera,,150,,,,\n",
        );

        let summary = import_schools(&conn, None, file.path()).unwrap();
        assert_eq!(summary.imported, 2);

        let schools = list_schools(&conn).unwrap();
        assert_eq!(schools.len(), 2);
        assert_eq!(schools[0].established_year, Some(1998));
        assert_eq!(schools[1].number_of_rooms, 0);
        assert_eq!(schools[1].email, None);

        assert_eq!(count_action_logs(&conn).unwrap(), 1);
        let log = list_action_logs(&conn, &ActionLogFilter::default()).unwrap().remove(0);
        assert_eq!(log.action, ActionKind::Other);
        assert_eq!(log.details.unwrap()["imported"], json!(2));
    }

    #[test]
    fn test_bad_row_rejects_whole_file() {
        let conn = memory_db();
        let file = csv_file(
            "GS Kimironko,Gasabo,Kimironko,,420,6,,,\n\
             ,Gasabo,Remera,,-5,1,,,\n",
        );

        let err = import_schools(&conn, None, file.path()).unwrap_err();
        match err {
            SipmsError::Validation(errors) => {
                assert!(errors.iter().all(|e| e.field.starts_with("line 3: ")));
                assert_eq!(errors.len(), 2);
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        assert!(list_schools(&conn).unwrap().is_empty());
        assert_eq!(count_action_logs(&conn).unwrap(), 0);
    }

    #[test]
    fn test_unparseable_number() {
        let conn = memory_db();
        let file = csv_file("GS Kimironko,Gasabo,Kimironko,,many,6,,,\n");

        assert!(matches!(
            import_schools(&conn, None, file.path()),
            Err(SipmsError::Other(_))
        ));
    }
}
