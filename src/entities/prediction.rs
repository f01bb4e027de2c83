// 📊 Prediction Entity - rooms needed and budget for one school
//
// Derived fields are never taken from callers: every save re-reads the
// school and recomputes them through the derivation engine.

use crate::db::get_datetime;
use crate::derivation::{estimate_rooms, RoomEstimate};
use crate::entities::school::get_school;
use crate::error::{or_not_found, Result, SipmsError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const APPROVAL_FIELDS: [&str; 2] = ["approved_by_district", "approved_by_mineduc"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: i64,
    pub school_id: i64,
    pub created_by: i64,
    pub required_rooms: u32,
    pub rooms_to_build: u32,
    pub estimated_budget: i64,
    pub approved_by_district: bool,
    pub approved_by_mineduc: bool,
    pub created_at: DateTime<Utc>,
}

impl Prediction {
    pub fn is_fully_approved(&self) -> bool {
        self.approved_by_district && self.approved_by_mineduc
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PredictionInput {
    pub school_id: Option<i64>,
}

// ============================================================================
// APPROVAL UPDATE
// ============================================================================

/// The two approval flags a partial update may touch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApprovalUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by_district: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by_mineduc: Option<bool>,
}

/// Resulting value of both flags after an approval update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalState {
    pub approved_by_district: bool,
    pub approved_by_mineduc: bool,
}

impl ApprovalUpdate {
    /// Pick the approval fields out of a request body.
    ///
    /// Fails when no approval field is present. Other keys are returned
    /// separately and otherwise ignored.
    pub fn from_payload(payload: &Map<String, Value>) -> Result<(ApprovalUpdate, Vec<String>)> {
        let mut update = ApprovalUpdate::default();
        let mut ignored = Vec::new();
        let mut errors = Vec::new();
        let mut recognized = 0;

        for (key, value) in payload {
            let slot = match key.as_str() {
                "approved_by_district" => &mut update.approved_by_district,
                "approved_by_mineduc" => &mut update.approved_by_mineduc,
                _ => {
                    ignored.push(key.clone());
                    continue;
                }
            };
            recognized += 1;
            match value.as_bool() {
                Some(flag) => *slot = Some(flag),
                None => errors.push(crate::validation::FieldError::new(
                    key,
                    "Must be a valid boolean",
                )),
            }
        }

        if recognized == 0 {
            return Err(SipmsError::invalid(
                "non_field_errors",
                "Only approval fields can be updated.",
            ));
        }
        if !errors.is_empty() {
            return Err(SipmsError::Validation(errors));
        }

        Ok((update, ignored))
    }
}

// ============================================================================
// STORAGE
// ============================================================================

const COLUMNS: &str = "id, school_id, created_by, required_rooms, rooms_to_build,
    estimated_budget, approved_by_district, approved_by_mineduc, created_at";

fn from_row(row: &Row) -> rusqlite::Result<Prediction> {
    Ok(Prediction {
        id: row.get(0)?,
        school_id: row.get(1)?,
        created_by: row.get(2)?,
        required_rooms: row.get(3)?,
        rooms_to_build: row.get(4)?,
        estimated_budget: row.get(5)?,
        approved_by_district: row.get(6)?,
        approved_by_mineduc: row.get(7)?,
        created_at: get_datetime(row, 8)?,
    })
}

/// Derivation from the current school snapshot; a missing school fails fast.
fn derive(conn: &Connection, school_id: i64) -> Result<RoomEstimate> {
    let school = get_school(conn, school_id)?;
    Ok(estimate_rooms(school.student_population, school.number_of_rooms))
}

pub fn insert_prediction(conn: &Connection, input: PredictionInput, created_by: i64) -> Result<Prediction> {
    let school_id = input
        .school_id
        .ok_or_else(|| SipmsError::invalid("school_id", "This field is required"))?;

    let estimate = match derive(conn, school_id) {
        Err(e) if e.is_not_found() => {
            return Err(SipmsError::invalid(
                "school_id",
                format!("Invalid pk \"{}\" - object does not exist", school_id),
            ))
        }
        other => other?,
    };

    conn.execute(
        "INSERT INTO predictions (
            school_id, created_by, required_rooms, rooms_to_build, estimated_budget,
            approved_by_district, approved_by_mineduc, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6)",
        params![
            school_id,
            created_by,
            estimate.required_rooms,
            estimate.rooms_to_build,
            estimate.estimated_budget,
            Utc::now().to_rfc3339(),
        ],
    )?;

    get_prediction(conn, conn.last_insert_rowid())
}

pub fn get_prediction(conn: &Connection, id: i64) -> Result<Prediction> {
    let sql = format!("SELECT {} FROM predictions WHERE id = ?1", COLUMNS);
    or_not_found(conn.query_row(&sql, [id], from_row), "Prediction", id)
}

pub fn list_predictions(conn: &Connection) -> Result<Vec<Prediction>> {
    let sql = format!("SELECT {} FROM predictions ORDER BY id", COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let predictions = stmt.query_map([], from_row)?.collect::<Result<Vec<_>, _>>()?;
    Ok(predictions)
}

/// Persist a prediction, recomputing its derived fields first.
pub fn save_prediction(conn: &Connection, prediction: &mut Prediction) -> Result<()> {
    let estimate = derive(conn, prediction.school_id)?;
    prediction.required_rooms = estimate.required_rooms;
    prediction.rooms_to_build = estimate.rooms_to_build;
    prediction.estimated_budget = estimate.estimated_budget;

    let changed = conn.execute(
        "UPDATE predictions SET
            required_rooms = ?1, rooms_to_build = ?2, estimated_budget = ?3,
            approved_by_district = ?4, approved_by_mineduc = ?5
         WHERE id = ?6",
        params![
            prediction.required_rooms,
            prediction.rooms_to_build,
            prediction.estimated_budget,
            prediction.approved_by_district,
            prediction.approved_by_mineduc,
            prediction.id,
        ],
    )?;
    crate::db::ensure_changed(changed, "Prediction", prediction.id)
}

/// Apply approval flags and save; returns the updated prediction.
pub fn apply_approval(conn: &Connection, id: i64, update: ApprovalUpdate) -> Result<Prediction> {
    let mut prediction = get_prediction(conn, id)?;

    if let Some(flag) = update.approved_by_district {
        prediction.approved_by_district = flag;
    }
    if let Some(flag) = update.approved_by_mineduc {
        prediction.approved_by_mineduc = flag;
    }

    save_prediction(conn, &mut prediction)?;
    Ok(prediction)
}

pub fn delete_prediction(conn: &Connection, id: i64) -> Result<Prediction> {
    let prediction = get_prediction(conn, id)?;
    conn.execute("DELETE FROM predictions WHERE id = ?1", [id])?;
    Ok(prediction)
}

// ============================================================================
// DISTRICT SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictSummary {
    pub umurenge: String,
    pub total_schools: i64,
    pub total_rooms_to_build: i64,
    pub total_estimated_budget: i64,
}

/// Totals over predictions whose school sits in the given umurenge.
pub fn district_summary(conn: &Connection, umurenge: &str) -> Result<DistrictSummary> {
    let umurenge = umurenge.trim();
    if umurenge.is_empty() {
        return Err(SipmsError::invalid("umurenge", "This query parameter is required"));
    }

    let (total_schools, total_rooms_to_build, total_estimated_budget) = conn.query_row(
        "SELECT COUNT(p.id),
                COALESCE(SUM(p.rooms_to_build), 0),
                COALESCE(SUM(p.estimated_budget), 0)
         FROM predictions p
         JOIN schools s ON s.id = p.school_id
         WHERE s.sector = ?1 COLLATE NOCASE",
        [umurenge],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    Ok(DistrictSummary {
        umurenge: umurenge.to_string(),
        total_schools,
        total_rooms_to_build,
        total_estimated_budget,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::school::{update_school, SchoolInput};
    use crate::entities::Role;
    use crate::test_support::{memory_db, seed_school, seed_school_in, seed_user};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_insert_derives_fields() {
        let conn = memory_db();
        let school = seed_school(&conn, 100, 1);
        let user = seed_user(&conn, Role::School);

        let prediction = insert_prediction(
            &conn,
            PredictionInput { school_id: Some(school.id) },
            user.id,
        )
        .unwrap();

        assert_eq!(prediction.required_rooms, 3);
        assert_eq!(prediction.rooms_to_build, 2);
        assert_eq!(prediction.estimated_budget, 10_000_000);
        assert!(!prediction.approved_by_district);
        assert!(!prediction.approved_by_mineduc);
    }

    #[test]
    fn test_insert_requires_existing_school() {
        let conn = memory_db();
        let user = seed_user(&conn, Role::School);

        let missing = insert_prediction(&conn, PredictionInput { school_id: None }, user.id);
        assert!(matches!(missing, Err(SipmsError::Validation(_))));

        let unknown = insert_prediction(&conn, PredictionInput { school_id: Some(5) }, user.id);
        assert!(matches!(unknown, Err(SipmsError::Validation(_))));
    }

    #[test]
    fn test_save_recomputes_from_current_school() {
        let conn = memory_db();
        let school = seed_school(&conn, 100, 1);
        let user = seed_user(&conn, Role::School);
        let mut prediction =
            insert_prediction(&conn, PredictionInput { school_id: Some(school.id) }, user.id).unwrap();

        update_school(
            &conn,
            school.id,
            SchoolInput {
                student_population: Some(400),
                ..Default::default()
            },
        )
        .unwrap();

        // Stale in-memory values are overwritten, not trusted
        prediction.rooms_to_build = 999;
        save_prediction(&conn, &mut prediction).unwrap();

        assert_eq!(prediction.required_rooms, 12);
        assert_eq!(prediction.rooms_to_build, 11);
        assert_eq!(prediction.estimated_budget, 55_000_000);
        assert_eq!(get_prediction(&conn, prediction.id).unwrap(), prediction);
    }

    #[test]
    fn test_approval_payload_parsing() {
        let (update, ignored) =
            ApprovalUpdate::from_payload(&payload(json!({"approved_by_district": true}))).unwrap();
        assert_eq!(
            update,
            ApprovalUpdate {
                approved_by_district: Some(true),
                approved_by_mineduc: None,
            }
        );
        assert!(ignored.is_empty());

        let err = ApprovalUpdate::from_payload(&payload(json!({"foo": "bar"}))).unwrap_err();
        assert!(matches!(err, SipmsError::Validation(_)));

        let err = ApprovalUpdate::from_payload(&payload(json!({}))).unwrap_err();
        assert!(matches!(err, SipmsError::Validation(_)));

        let err =
            ApprovalUpdate::from_payload(&payload(json!({"approved_by_mineduc": "yes"}))).unwrap_err();
        assert!(matches!(err, SipmsError::Validation(_)));
    }

    #[test]
    fn test_mixed_payload_drops_unknown_keys() {
        let (update, ignored) = ApprovalUpdate::from_payload(&payload(json!({
            "approved_by_mineduc": true,
            "rooms_to_build": 0,
        })))
        .unwrap();

        assert_eq!(update.approved_by_mineduc, Some(true));
        assert_eq!(ignored, vec!["rooms_to_build".to_string()]);
    }

    #[test]
    fn test_apply_approval_is_independent_and_reversible() {
        let conn = memory_db();
        let school = seed_school(&conn, 70, 0);
        let user = seed_user(&conn, Role::District);
        let prediction =
            insert_prediction(&conn, PredictionInput { school_id: Some(school.id) }, user.id).unwrap();

        let updated = apply_approval(
            &conn,
            prediction.id,
            ApprovalUpdate {
                approved_by_mineduc: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(updated.approved_by_mineduc);
        assert!(!updated.approved_by_district);

        let reverted = apply_approval(
            &conn,
            prediction.id,
            ApprovalUpdate {
                approved_by_mineduc: Some(false),
                approved_by_district: Some(true),
            },
        )
        .unwrap();
        assert!(!reverted.approved_by_mineduc);
        assert!(reverted.approved_by_district);
    }

    #[test]
    fn test_school_delete_cascades() {
        let conn = memory_db();
        let school = seed_school(&conn, 70, 0);
        let user = seed_user(&conn, Role::School);
        let prediction =
            insert_prediction(&conn, PredictionInput { school_id: Some(school.id) }, user.id).unwrap();

        crate::entities::school::delete_school(&conn, school.id).unwrap();

        assert!(get_prediction(&conn, prediction.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_district_summary_filters_by_sector() {
        let conn = memory_db();
        let user = seed_user(&conn, Role::Umurenge);
        let a = seed_school_in(&conn, "Kimironko", 100, 1); // 2 rooms
        let b = seed_school_in(&conn, "kimironko", 350, 5); // 5 rooms
        let c = seed_school_in(&conn, "Remera", 700, 0); // elsewhere

        for school in [&a, &b, &c] {
            insert_prediction(&conn, PredictionInput { school_id: Some(school.id) }, user.id).unwrap();
        }

        let summary = district_summary(&conn, "Kimironko").unwrap();
        assert_eq!(
            summary,
            DistrictSummary {
                umurenge: "Kimironko".to_string(),
                total_schools: 2,
                total_rooms_to_build: 7,
                total_estimated_budget: 35_000_000,
            }
        );

        let empty = district_summary(&conn, "Nduba").unwrap();
        assert_eq!(empty.total_schools, 0);
        assert_eq!(empty.total_estimated_budget, 0);

        assert!(district_summary(&conn, "  ").is_err());
    }
}
