// SIPMS - School Infrastructure Planning & Management System - Core Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod db;
pub mod error;
pub mod validation;
pub mod derivation;     // Prediction / budget derived fields
pub mod entities;       // One module per stored record
pub mod audit;          // ActionLog trail
pub mod storage;        // Uploaded report documents
pub mod workflow;       // Audited state changes
pub mod config;
pub mod import;         // School CSV import

#[cfg(feature = "server")]
pub mod api;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use db::{open_database, setup_database};
pub use error::{Result, SipmsError};
pub use validation::FieldError;
pub use derivation::{estimate_rooms, remaining_budget, RoomEstimate, COST_PER_ROOM, STUDENTS_PER_ROOM};
pub use entities::{
    ApprovalState, ApprovalUpdate, BudgetInput, BudgetTracking, DistrictSummary, NewReport,
    Notification, NotificationInput, Prediction, PredictionInput, PredictionReport, Project,
    ProjectInput, ReportStatus, Role, School, SchoolInput, User, UserInput,
};
pub use audit::{ActionKind, ActionLog, ActionLogFilter, AuditEntry};
pub use storage::{DocumentStore, StoredDocument, MAX_UPLOAD_BYTES};
pub use config::SipmsConfig;
pub use import::{import_schools, ImportSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
