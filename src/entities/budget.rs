// 💰 Budget Tracking - allocated vs spent per project, remaining derived on save

use crate::db::get_datetime;
use crate::derivation::remaining_budget;
use crate::error::{or_not_found, Result, SipmsError};
use crate::validation::Validator;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetTracking {
    pub id: i64,
    pub project_id: i64,
    pub allocated_budget: f64,
    pub spent_budget: f64,
    pub remaining_budget: f64,
    pub created_at: DateTime<Utc>,
}

impl BudgetTracking {
    pub fn is_overspent(&self) -> bool {
        self.remaining_budget < 0.0
    }
}

/// `remaining_budget` is not accepted: it is always derived.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BudgetInput {
    pub project_id: Option<i64>,
    pub allocated_budget: Option<f64>,
    pub spent_budget: Option<f64>,
}

impl BudgetInput {
    fn validate(&self, creating: bool) -> Result<()> {
        let mut v = Validator::new();

        if creating {
            if self.project_id.is_none() {
                v.push("project_id", "This field is required");
            }
            if self.allocated_budget.is_none() {
                v.push("allocated_budget", "This field is required");
            }
        }
        v.non_negative_amount("allocated_budget", self.allocated_budget);
        v.non_negative_amount("spent_budget", self.spent_budget);

        v.finish()
    }
}

fn check_project(conn: &Connection, project_id: i64) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1)",
        [project_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(SipmsError::invalid(
            "project_id",
            format!("Invalid pk \"{}\" - object does not exist", project_id),
        ))
    }
}

const COLUMNS: &str =
    "id, project_id, allocated_budget, spent_budget, remaining_budget, created_at";

fn from_row(row: &Row) -> rusqlite::Result<BudgetTracking> {
    Ok(BudgetTracking {
        id: row.get(0)?,
        project_id: row.get(1)?,
        allocated_budget: row.get(2)?,
        spent_budget: row.get(3)?,
        remaining_budget: row.get(4)?,
        created_at: get_datetime(row, 5)?,
    })
}

pub fn insert_budget(conn: &Connection, input: BudgetInput) -> Result<BudgetTracking> {
    input.validate(true)?;
    let project_id = input.project_id.unwrap_or_default();
    check_project(conn, project_id)?;

    let allocated = input.allocated_budget.unwrap_or_default();
    let spent = input.spent_budget.unwrap_or(0.0);

    conn.execute(
        "INSERT INTO budget_tracking (
            project_id, allocated_budget, spent_budget, remaining_budget, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            project_id,
            allocated,
            spent,
            remaining_budget(allocated, spent),
            Utc::now().to_rfc3339(),
        ],
    )?;

    get_budget(conn, conn.last_insert_rowid())
}

pub fn get_budget(conn: &Connection, id: i64) -> Result<BudgetTracking> {
    let sql = format!("SELECT {} FROM budget_tracking WHERE id = ?1", COLUMNS);
    or_not_found(conn.query_row(&sql, [id], from_row), "BudgetTracking", id)
}

pub fn list_budgets(conn: &Connection) -> Result<Vec<BudgetTracking>> {
    let sql = format!("SELECT {} FROM budget_tracking ORDER BY id", COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let budgets = stmt.query_map([], from_row)?.collect::<Result<Vec<_>, _>>()?;
    Ok(budgets)
}

pub fn update_budget(conn: &Connection, id: i64, input: BudgetInput) -> Result<BudgetTracking> {
    input.validate(false)?;
    let mut budget = get_budget(conn, id)?;

    if let Some(project_id) = input.project_id {
        check_project(conn, project_id)?;
        budget.project_id = project_id;
    }
    if let Some(allocated) = input.allocated_budget {
        budget.allocated_budget = allocated;
    }
    if let Some(spent) = input.spent_budget {
        budget.spent_budget = spent;
    }
    budget.remaining_budget = remaining_budget(budget.allocated_budget, budget.spent_budget);

    conn.execute(
        "UPDATE budget_tracking SET
            project_id = ?1, allocated_budget = ?2, spent_budget = ?3, remaining_budget = ?4
         WHERE id = ?5",
        params![
            budget.project_id,
            budget.allocated_budget,
            budget.spent_budget,
            budget.remaining_budget,
            id,
        ],
    )?;

    Ok(budget)
}

pub fn delete_budget(conn: &Connection, id: i64) -> Result<BudgetTracking> {
    let budget = get_budget(conn, id)?;
    conn.execute("DELETE FROM budget_tracking WHERE id = ?1", [id])?;
    Ok(budget)
}
