// 👤 User Entity - people acting in the system, each with one role

use crate::db::get_datetime;
use crate::error::{or_not_found, Result, SipmsError};
use crate::validation::Validator;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ROLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    School,
    Umurenge,
    District,
    Mineduc,
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::School,
        Role::Umurenge,
        Role::District,
        Role::Mineduc,
        Role::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::School => "SCHOOL",
            Role::Umurenge => "UMURENGE",
            Role::District => "DISTRICT",
            Role::Mineduc => "MINEDUC",
            Role::Admin => "ADMIN",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::School => "School",
            Role::Umurenge => "Umurenge",
            Role::District => "District",
            Role::Mineduc => "Mineduc",
            Role::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("\"{}\" is not a valid role", s))
    }
}

pub(crate) fn get_role(row: &Row, idx: usize) -> rusqlite::Result<Role> {
    let raw: String = row.get(idx)?;
    raw.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

// ============================================================================
// USER ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub sector: Option<String>,
    pub school_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// "First Last", falling back to the username when both are blank
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub sector: Option<String>,
    pub school_id: Option<i64>,
}

impl UserInput {
    fn validate(&self, creating: bool) -> Result<()> {
        let mut v = Validator::new();

        if creating || self.username.is_some() {
            v.required("username", self.username.as_deref());
        }
        if creating || self.email.is_some() {
            v.required("email", self.email.as_deref());
        }
        v.email("email", self.email.as_deref());
        v.max_len("username", self.username.as_deref(), 150);
        v.max_len("sector", self.sector.as_deref(), 40);

        v.finish()
    }
}

const COLUMNS: &str =
    "id, username, email, first_name, last_name, role, sector, school_id, created_at";

fn from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        role: get_role(row, 5)?,
        sector: row.get(6)?,
        school_id: row.get(7)?,
        created_at: get_datetime(row, 8)?,
    })
}

/// Duplicate email is a field error, not a storage failure.
fn map_unique_email(err: rusqlite::Error) -> SipmsError {
    match err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            SipmsError::invalid("email", "User with this email already exists")
        }
        other => other.into(),
    }
}

fn ensure_school_exists(conn: &Connection, school_id: Option<i64>) -> Result<()> {
    if let Some(id) = school_id {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM schools WHERE id = ?1)",
            [id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(SipmsError::invalid(
                "school_id",
                format!("Invalid pk \"{}\" - object does not exist", id),
            ));
        }
    }
    Ok(())
}

pub fn insert_user(conn: &Connection, input: UserInput) -> Result<User> {
    input.validate(true)?;
    ensure_school_exists(conn, input.school_id)?;

    conn.execute(
        "INSERT INTO users (
            username, email, first_name, last_name, role, sector, school_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            input.username.as_deref().map(str::trim),
            input.email.as_deref().map(str::trim),
            input.first_name.unwrap_or_default(),
            input.last_name.unwrap_or_default(),
            input.role.unwrap_or(Role::School).as_str(),
            input.sector,
            input.school_id,
            Utc::now().to_rfc3339(),
        ],
    )
    .map_err(map_unique_email)?;

    get_user(conn, conn.last_insert_rowid())
}

pub fn get_user(conn: &Connection, id: i64) -> Result<User> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", COLUMNS);
    or_not_found(conn.query_row(&sql, [id], from_row), "User", id)
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let sql = format!("SELECT {} FROM users ORDER BY id", COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt.query_map([], from_row)?.collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn update_user(conn: &Connection, id: i64, input: UserInput) -> Result<User> {
    input.validate(false)?;
    ensure_school_exists(conn, input.school_id)?;
    let mut user = get_user(conn, id)?;

    if let Some(username) = input.username {
        user.username = username.trim().to_string();
    }
    if let Some(email) = input.email {
        user.email = email.trim().to_string();
    }
    if let Some(first_name) = input.first_name {
        user.first_name = first_name;
    }
    if let Some(last_name) = input.last_name {
        user.last_name = last_name;
    }
    if let Some(role) = input.role {
        user.role = role;
    }
    if input.sector.is_some() {
        user.sector = input.sector;
    }
    if input.school_id.is_some() {
        user.school_id = input.school_id;
    }

    conn.execute(
        "UPDATE users SET
            username = ?1, email = ?2, first_name = ?3, last_name = ?4,
            role = ?5, sector = ?6, school_id = ?7
         WHERE id = ?8",
        params![
            user.username,
            user.email,
            user.first_name,
            user.last_name,
            user.role.as_str(),
            user.sector,
            user.school_id,
            id,
        ],
    )
    .map_err(map_unique_email)?;

    Ok(user)
}

pub fn delete_user(conn: &Connection, id: i64) -> Result<User> {
    let user = get_user(conn, id)?;
    conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
    Ok(user)
}
