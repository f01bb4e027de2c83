// Entity Models - one module per stored record
//
// Each module owns:
// - the record type and its writable input payload
// - field validation for that payload
// - the SQL that reads and writes it

pub mod school;
pub mod user;
pub mod prediction;
pub mod project;
pub mod budget;
pub mod notification;
pub mod report;

pub use school::{School, SchoolInput};
pub use user::{Role, User, UserInput};
pub use prediction::{ApprovalState, ApprovalUpdate, DistrictSummary, Prediction, PredictionInput};
pub use project::{Project, ProjectInput};
pub use budget::{BudgetInput, BudgetTracking};
pub use notification::{Notification, NotificationInput};
pub use report::{NewReport, PredictionReport, ReportStatus};
