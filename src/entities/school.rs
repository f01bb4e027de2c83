// 🏫 School Entity - the population/room snapshot every prediction derives from

use crate::db::get_datetime;
use crate::error::{or_not_found, Result};
use crate::validation::Validator;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct School {
    pub id: i64,
    pub name: String,
    pub location: String,

    /// Umurenge (sector) the school belongs to; drives the district summary
    pub sector: Option<String>,

    pub established_year: Option<i32>,
    pub student_population: u32,
    pub number_of_rooms: u32,
    pub head_teacher: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Writable school fields. Every field is optional so the same payload
/// serves create (name required) and partial update.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchoolInput {
    pub name: Option<String>,
    pub location: Option<String>,
    pub sector: Option<String>,
    pub established_year: Option<i32>,
    pub student_population: Option<i64>,
    pub number_of_rooms: Option<i64>,
    pub head_teacher: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Validated counts pulled out of a [`SchoolInput`].
struct Counts {
    student_population: Option<u32>,
    number_of_rooms: Option<u32>,
}

impl SchoolInput {
    fn validate(&self, creating: bool) -> Result<Counts> {
        let mut v = Validator::new();

        if creating || self.name.is_some() {
            v.required("name", self.name.as_deref());
        }
        v.max_len("name", self.name.as_deref(), 255);
        v.max_len("location", self.location.as_deref(), 255);
        v.max_len("sector", self.sector.as_deref(), 40);
        v.max_len("head_teacher", self.head_teacher.as_deref(), 255);
        v.max_len("phone", self.phone.as_deref(), 20);
        v.email("email", self.email.as_deref());

        let counts = Counts {
            student_population: v.count("student_population", self.student_population),
            number_of_rooms: v.count("number_of_rooms", self.number_of_rooms),
        };

        v.finish()?;
        Ok(counts)
    }
}

const COLUMNS: &str = "id, name, location, sector, established_year, student_population,
    number_of_rooms, head_teacher, email, phone, created_at";

fn from_row(row: &Row) -> rusqlite::Result<School> {
    Ok(School {
        id: row.get(0)?,
        name: row.get(1)?,
        location: row.get(2)?,
        sector: row.get(3)?,
        established_year: row.get(4)?,
        student_population: row.get(5)?,
        number_of_rooms: row.get(6)?,
        head_teacher: row.get(7)?,
        email: row.get(8)?,
        phone: row.get(9)?,
        created_at: get_datetime(row, 10)?,
    })
}

pub fn insert_school(conn: &Connection, input: SchoolInput) -> Result<School> {
    let counts = input.validate(true)?;
    let now = Utc::now();

    conn.execute(
        "INSERT INTO schools (
            name, location, sector, established_year, student_population,
            number_of_rooms, head_teacher, email, phone, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            input.name.as_deref().map(str::trim),
            input.location.unwrap_or_default(),
            input.sector,
            input.established_year,
            counts.student_population.unwrap_or(0),
            counts.number_of_rooms.unwrap_or(0),
            input.head_teacher,
            input.email,
            input.phone,
            now.to_rfc3339(),
        ],
    )?;

    get_school(conn, conn.last_insert_rowid())
}

pub fn get_school(conn: &Connection, id: i64) -> Result<School> {
    let sql = format!("SELECT {} FROM schools WHERE id = ?1", COLUMNS);
    or_not_found(conn.query_row(&sql, [id], from_row), "School", id)
}

pub fn list_schools(conn: &Connection) -> Result<Vec<School>> {
    let sql = format!("SELECT {} FROM schools ORDER BY id", COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let schools = stmt
        .query_map([], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(schools)
}

/// Apply the provided fields over the stored school.
pub fn update_school(conn: &Connection, id: i64, input: SchoolInput) -> Result<School> {
    let counts = input.validate(false)?;
    let mut school = get_school(conn, id)?;

    if let Some(name) = input.name {
        school.name = name.trim().to_string();
    }
    if let Some(location) = input.location {
        school.location = location;
    }
    if input.sector.is_some() {
        school.sector = input.sector;
    }
    if input.established_year.is_some() {
        school.established_year = input.established_year;
    }
    if let Some(population) = counts.student_population {
        school.student_population = population;
    }
    if let Some(rooms) = counts.number_of_rooms {
        school.number_of_rooms = rooms;
    }
    if input.head_teacher.is_some() {
        school.head_teacher = input.head_teacher;
    }
    if input.email.is_some() {
        school.email = input.email;
    }
    if input.phone.is_some() {
        school.phone = input.phone;
    }

    conn.execute(
        "UPDATE schools SET
            name = ?1, location = ?2, sector = ?3, established_year = ?4,
            student_population = ?5, number_of_rooms = ?6, head_teacher = ?7,
            email = ?8, phone = ?9
         WHERE id = ?10",
        params![
            school.name,
            school.location,
            school.sector,
            school.established_year,
            school.student_population,
            school.number_of_rooms,
            school.head_teacher,
            school.email,
            school.phone,
            id,
        ],
    )?;

    Ok(school)
}

/// Delete a school; its predictions (and their projects) go with it.
pub fn delete_school(conn: &Connection, id: i64) -> Result<School> {
    let school = get_school(conn, id)?;
    conn.execute("DELETE FROM schools WHERE id = ?1", [id])?;
    Ok(school)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SipmsError;
    use crate::test_support::memory_db;

    fn input(name: &str, population: i64, rooms: i64) -> SchoolInput {
        SchoolInput {
            name: Some(name.to_string()),
            location: Some("Gasabo".to_string()),
            sector: Some("Kimironko".to_string()),
            student_population: Some(population),
            number_of_rooms: Some(rooms),
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_and_get_school() {
        let conn = memory_db();
        let school = insert_school(&conn, input("GS Kimironko", 420, 8)).unwrap();

        assert!(school.id > 0);
        assert_eq!(school.name, "GS Kimironko");
        assert_eq!(school.student_population, 420);
        assert_eq!(school.number_of_rooms, 8);

        let fetched = get_school(&conn, school.id).unwrap();
        assert_eq!(fetched, school);
    }

    #[test]
    fn test_counts_default_to_zero() {
        let conn = memory_db();
        let school = insert_school(
            &conn,
            SchoolInput {
                name: Some("EP Remera".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(school.student_population, 0);
        assert_eq!(school.number_of_rooms, 0);
        assert_eq!(school.location, "");
    }

    #[test]
    fn test_rejects_negative_counts_and_missing_name() {
        let conn = memory_db();
        let err = insert_school(
            &conn,
            SchoolInput {
                student_population: Some(-1),
                number_of_rooms: Some(-3),
                ..Default::default()
            },
        )
        .unwrap_err();

        match err {
            SipmsError::Validation(errors) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert!(fields.contains(&"name"));
                assert!(fields.contains(&"student_population"));
                assert!(fields.contains(&"number_of_rooms"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(list_schools(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let conn = memory_db();
        let school = insert_school(&conn, input("GS Kimironko", 420, 8)).unwrap();

        let updated = update_school(
            &conn,
            school.id,
            SchoolInput {
                number_of_rooms: Some(12),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(updated.number_of_rooms, 12);
        assert_eq!(updated.student_population, 420);
        assert_eq!(updated.name, "GS Kimironko");
        assert_eq!(get_school(&conn, school.id).unwrap(), updated);
    }

    #[test]
    fn test_update_and_delete_missing_school() {
        let conn = memory_db();

        assert!(update_school(&conn, 42, SchoolInput::default())
            .unwrap_err()
            .is_not_found());
        assert!(delete_school(&conn, 42).unwrap_err().is_not_found());
    }
}
