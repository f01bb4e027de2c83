// 🏗️ Project Entity - construction run by a district against a prediction

use crate::db::{format_date, get_datetime, get_opt_date};
use crate::entities::user::{get_user, Role};
use crate::error::{or_not_found, Result, SipmsError};
use crate::validation::Validator;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub prediction_id: i64,
    pub district_id: i64,
    pub project_name: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub progress_percentage: u32,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProjectInput {
    pub prediction_id: Option<i64>,
    pub district_id: Option<i64>,
    pub project_name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub progress_percentage: Option<i64>,
    pub is_completed: Option<bool>,
}

impl ProjectInput {
    fn validate(&self, creating: bool) -> Result<()> {
        let mut v = Validator::new();

        if creating || self.project_name.is_some() {
            v.required("project_name", self.project_name.as_deref());
        }
        if creating && self.prediction_id.is_none() {
            v.push("prediction_id", "This field is required");
        }
        v.max_len("project_name", self.project_name.as_deref(), 255);
        v.in_range("progress_percentage", self.progress_percentage, 0, 100);

        v.finish()
    }
}

fn check_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(SipmsError::invalid(
                "end_date",
                "End date cannot be before start date",
            ));
        }
    }
    Ok(())
}

/// The project owner must be a district user.
fn check_district(conn: &Connection, district_id: i64) -> Result<()> {
    match get_user(conn, district_id) {
        Ok(user) if user.has_role(Role::District) => Ok(()),
        Ok(_) => Err(SipmsError::invalid(
            "district_id",
            "Selected user does not have the DISTRICT role",
        )),
        Err(e) if e.is_not_found() => Err(SipmsError::invalid(
            "district_id",
            format!("Invalid pk \"{}\" - object does not exist", district_id),
        )),
        Err(e) => Err(e),
    }
}

fn check_prediction(conn: &Connection, prediction_id: i64) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM predictions WHERE id = ?1)",
        [prediction_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(SipmsError::invalid(
            "prediction_id",
            format!("Invalid pk \"{}\" - object does not exist", prediction_id),
        ))
    }
}

const COLUMNS: &str = "id, prediction_id, district_id, project_name, start_date, end_date,
    progress_percentage, is_completed, created_at";

fn from_row(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        prediction_id: row.get(1)?,
        district_id: row.get(2)?,
        project_name: row.get(3)?,
        start_date: get_opt_date(row, 4)?,
        end_date: get_opt_date(row, 5)?,
        progress_percentage: row.get(6)?,
        is_completed: row.get(7)?,
        created_at: get_datetime(row, 8)?,
    })
}

/// `district_id` is the owning district user, already resolved by the caller.
pub fn insert_project(conn: &Connection, input: ProjectInput, district_id: i64) -> Result<Project> {
    input.validate(true)?;
    check_dates(input.start_date, input.end_date)?;

    let prediction_id = input
        .prediction_id
        .ok_or_else(|| SipmsError::invalid("prediction_id", "This field is required"))?;
    check_prediction(conn, prediction_id)?;
    check_district(conn, district_id)?;

    conn.execute(
        "INSERT INTO projects (
            prediction_id, district_id, project_name, start_date, end_date,
            progress_percentage, is_completed, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            prediction_id,
            district_id,
            input.project_name.as_deref().map(str::trim),
            format_date(input.start_date),
            format_date(input.end_date),
            input.progress_percentage.unwrap_or(0),
            input.is_completed.unwrap_or(false),
            Utc::now().to_rfc3339(),
        ],
    )?;

    get_project(conn, conn.last_insert_rowid())
}

pub fn get_project(conn: &Connection, id: i64) -> Result<Project> {
    let sql = format!("SELECT {} FROM projects WHERE id = ?1", COLUMNS);
    or_not_found(conn.query_row(&sql, [id], from_row), "Project", id)
}

pub fn list_projects(conn: &Connection) -> Result<Vec<Project>> {
    let sql = format!("SELECT {} FROM projects ORDER BY id", COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let projects = stmt.query_map([], from_row)?.collect::<Result<Vec<_>, _>>()?;
    Ok(projects)
}

pub fn update_project(conn: &Connection, id: i64, input: ProjectInput) -> Result<Project> {
    input.validate(false)?;
    let mut project = get_project(conn, id)?;

    if let Some(prediction_id) = input.prediction_id {
        check_prediction(conn, prediction_id)?;
        project.prediction_id = prediction_id;
    }
    if let Some(district_id) = input.district_id {
        check_district(conn, district_id)?;
        project.district_id = district_id;
    }
    if let Some(name) = input.project_name {
        project.project_name = name.trim().to_string();
    }
    if input.start_date.is_some() {
        project.start_date = input.start_date;
    }
    if input.end_date.is_some() {
        project.end_date = input.end_date;
    }
    if let Some(progress) = input.progress_percentage {
        // range already checked
        project.progress_percentage = progress as u32;
    }
    if let Some(done) = input.is_completed {
        project.is_completed = done;
    }
    check_dates(project.start_date, project.end_date)?;

    conn.execute(
        "UPDATE projects SET
            prediction_id = ?1, district_id = ?2, project_name = ?3, start_date = ?4,
            end_date = ?5, progress_percentage = ?6, is_completed = ?7
         WHERE id = ?8",
        params![
            project.prediction_id,
            project.district_id,
            project.project_name,
            format_date(project.start_date),
            format_date(project.end_date),
            project.progress_percentage,
            project.is_completed,
            id,
        ],
    )?;

    Ok(project)
}

pub fn delete_project(conn: &Connection, id: i64) -> Result<Project> {
    let project = get_project(conn, id)?;
    conn.execute("DELETE FROM projects WHERE id = ?1", [id])?;
    Ok(project)
}
