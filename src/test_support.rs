//! Fixtures shared by the unit tests.

use crate::db::setup_database;
use crate::entities::prediction::insert_prediction;
use crate::entities::project::insert_project;
use crate::entities::report::insert_report;
use crate::entities::school::insert_school;
use crate::entities::user::insert_user;
use crate::entities::{
    NewReport, Prediction, PredictionInput, PredictionReport, Project, ProjectInput, Role,
    School, SchoolInput, User, UserInput,
};
use crate::storage::StoredDocument;
use rusqlite::Connection;

pub fn memory_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();
    conn
}

pub fn seed_school(conn: &Connection, population: i64, rooms: i64) -> School {
    seed_school_in(conn, "Kimironko", population, rooms)
}

pub fn seed_school_in(conn: &Connection, sector: &str, population: i64, rooms: i64) -> School {
    insert_school(
        conn,
        SchoolInput {
            name: Some(format!("GS {} {}", sector, population)),
            location: Some("Gasabo".to_string()),
            sector: Some(sector.to_string()),
            student_population: Some(population),
            number_of_rooms: Some(rooms),
            ..Default::default()
        },
    )
    .unwrap()
}

pub fn seed_user(conn: &Connection, role: Role) -> User {
    let tag = uuid::Uuid::new_v4().simple().to_string();
    insert_user(
        conn,
        UserInput {
            username: Some(format!("{}-{}", role.as_str().to_lowercase(), &tag[..8])),
            email: Some(format!("{}@sipms.test", tag)),
            first_name: Some("Test".to_string()),
            last_name: Some(role.label().to_string()),
            role: Some(role),
            ..Default::default()
        },
    )
    .unwrap()
}

pub fn seed_prediction(conn: &Connection, population: i64, rooms: i64) -> Prediction {
    let school = seed_school(conn, population, rooms);
    let user = seed_user(conn, Role::School);
    insert_prediction(conn, PredictionInput { school_id: Some(school.id) }, user.id).unwrap()
}

pub fn seed_project(conn: &Connection) -> Project {
    let prediction = seed_prediction(conn, 100, 1);
    let district = seed_user(conn, Role::District);
    insert_project(
        conn,
        ProjectInput {
            prediction_id: Some(prediction.id),
            project_name: Some("Classroom block".to_string()),
            ..Default::default()
        },
        district.id,
    )
    .unwrap()
}

pub fn seed_report(conn: &Connection, created_by: i64, location: &str) -> PredictionReport {
    insert_report(
        conn,
        NewReport {
            location: location.to_string(),
            document: StoredDocument {
                path: format!("prediction_reports/{}.pdf", uuid::Uuid::new_v4()),
                file_name: "report.pdf".to_string(),
                size: 4,
                sha256: "00".to_string(),
            },
            created_by,
        },
    )
    .unwrap()
}
