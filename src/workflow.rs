// Workflow operations - every state change the system exposes
//
// Each operation takes the acting user explicitly (None = unauthenticated),
// performs the mutation, then appends exactly one ActionLog entry. Reads
// never log.

use crate::audit::{changed_fields, log_action, ActionKind, AuditEntry};
use crate::entities::{
    budget, notification, prediction, project, report, school, user, ApprovalState,
    ApprovalUpdate, BudgetInput, BudgetTracking, DistrictSummary, NewReport, Notification,
    NotificationInput, Prediction, PredictionInput, PredictionReport, Project, ProjectInput,
    Role, School, SchoolInput, User, UserInput,
};
use crate::error::{Result, SipmsError};
use crate::storage::DocumentStore;
use crate::validation::Validator;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

/// Operations that need a known caller.
pub fn require_actor(actor: Option<&User>) -> Result<&User> {
    actor.ok_or(SipmsError::Unauthorized)
}

fn update_detail<T: serde::Serialize>(before: &T, after: &T) -> Value {
    json!({ "changed": changed_fields(before, after) })
}

// ============================================================================
// SCHOOLS
// ============================================================================

pub fn create_school(conn: &Connection, actor: Option<&User>, input: SchoolInput) -> Result<School> {
    let created = school::insert_school(conn, input)?;
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Create, "School", Some(created.id))
            .details(json!({ "name": created.name })),
    );
    Ok(created)
}

pub fn update_school(
    conn: &Connection,
    actor: Option<&User>,
    id: i64,
    input: SchoolInput,
) -> Result<School> {
    let before = school::get_school(conn, id)?;
    let updated = school::update_school(conn, id, input)?;
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Update, "School", Some(id))
            .details(update_detail(&before, &updated)),
    );
    Ok(updated)
}

pub fn delete_school(conn: &Connection, actor: Option<&User>, id: i64) -> Result<School> {
    let deleted = school::delete_school(conn, id)?;
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Delete, "School", Some(id))
            .details(json!({ "name": deleted.name })),
    );
    Ok(deleted)
}

// ============================================================================
// USERS
// ============================================================================

pub fn register_user(conn: &Connection, actor: Option<&User>, input: UserInput) -> Result<User> {
    let created = user::insert_user(conn, input)?;
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Create, "User", Some(created.id))
            .details(json!({ "email": created.email, "role": created.role })),
    );
    Ok(created)
}

pub fn update_user(
    conn: &Connection,
    actor: Option<&User>,
    id: i64,
    input: UserInput,
) -> Result<User> {
    let before = user::get_user(conn, id)?;
    let updated = user::update_user(conn, id, input)?;
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Update, "User", Some(id))
            .details(update_detail(&before, &updated)),
    );
    Ok(updated)
}

pub fn delete_user(conn: &Connection, actor: Option<&User>, id: i64) -> Result<User> {
    let deleted = user::delete_user(conn, id)?;
    // A user deleting themselves is logged without an actor: the row is gone.
    let actor = actor.filter(|a| a.id != id);
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Delete, "User", Some(id))
            .details(json!({ "email": deleted.email })),
    );
    Ok(deleted)
}

// ============================================================================
// PREDICTIONS
// ============================================================================

pub fn create_prediction(
    conn: &Connection,
    actor: Option<&User>,
    input: PredictionInput,
) -> Result<Prediction> {
    let creator = require_actor(actor)?;
    let created = prediction::insert_prediction(conn, input, creator.id)?;

    tracing::info!(
        prediction_id = created.id,
        school_id = created.school_id,
        rooms_to_build = created.rooms_to_build,
        "prediction created"
    );
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Create, "Prediction", Some(created.id)).details(json!({
            "school_id": created.school_id,
            "required_rooms": created.required_rooms,
            "rooms_to_build": created.rooms_to_build,
            "estimated_budget": created.estimated_budget,
        })),
    );
    Ok(created)
}

/// Partial update of the two approval flags.
///
/// The payload must name at least one approval field; other keys are
/// dropped and recorded in the audit detail.
pub fn update_prediction_approval(
    conn: &Connection,
    actor: Option<&User>,
    id: i64,
    payload: &Value,
) -> Result<ApprovalState> {
    require_actor(actor)?;

    let empty = Map::new();
    let fields = match payload {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => {
            return Err(SipmsError::invalid(
                "non_field_errors",
                "Expected a JSON object of approval fields",
            ))
        }
    };

    // Unknown id is a 404 before the payload is judged
    prediction::get_prediction(conn, id)?;
    let (update, ignored): (ApprovalUpdate, Vec<String>) = ApprovalUpdate::from_payload(fields)?;
    if !ignored.is_empty() {
        tracing::debug!(prediction_id = id, ?ignored, "ignoring non-approval fields");
    }

    let saved = prediction::apply_approval(conn, id, update)?;
    let state = ApprovalState {
        approved_by_district: saved.approved_by_district,
        approved_by_mineduc: saved.approved_by_mineduc,
    };

    tracing::info!(
        prediction_id = id,
        district = state.approved_by_district,
        mineduc = state.approved_by_mineduc,
        "prediction approval updated"
    );
    let mut detail = json!({ "applied": update });
    if !ignored.is_empty() {
        detail["ignored_fields"] = json!(ignored);
    }
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Approve, "Prediction", Some(id)).details(detail),
    );
    Ok(state)
}

pub fn delete_prediction(conn: &Connection, actor: Option<&User>, id: i64) -> Result<Prediction> {
    let deleted = prediction::delete_prediction(conn, id)?;
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Delete, "Prediction", Some(id))
            .details(json!({ "school_id": deleted.school_id })),
    );
    Ok(deleted)
}

pub fn district_summary(
    conn: &Connection,
    actor: Option<&User>,
    umurenge: Option<&str>,
) -> Result<DistrictSummary> {
    require_actor(actor)?;
    let umurenge = umurenge.unwrap_or_default();
    prediction::district_summary(conn, umurenge)
}

// ============================================================================
// PROJECTS
// ============================================================================

/// A district actor owns the project it creates; anyone else must name the district.
pub fn create_project(conn: &Connection, actor: Option<&User>, input: ProjectInput) -> Result<Project> {
    let district_id = match actor {
        Some(a) if a.has_role(Role::District) => a.id,
        _ => input
            .district_id
            .ok_or_else(|| SipmsError::invalid("district_id", "This field is required"))?,
    };

    let created = project::insert_project(conn, input, district_id)?;
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Create, "Project", Some(created.id)).details(json!({
            "project_name": created.project_name,
            "prediction_id": created.prediction_id,
            "district_id": created.district_id,
        })),
    );
    Ok(created)
}

pub fn update_project(
    conn: &Connection,
    actor: Option<&User>,
    id: i64,
    input: ProjectInput,
) -> Result<Project> {
    let before = project::get_project(conn, id)?;
    let updated = project::update_project(conn, id, input)?;
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Update, "Project", Some(id))
            .details(update_detail(&before, &updated)),
    );
    Ok(updated)
}

pub fn delete_project(conn: &Connection, actor: Option<&User>, id: i64) -> Result<Project> {
    let deleted = project::delete_project(conn, id)?;
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Delete, "Project", Some(id))
            .details(json!({ "project_name": deleted.project_name })),
    );
    Ok(deleted)
}

// ============================================================================
// BUDGET TRACKING
// ============================================================================

pub fn create_budget(
    conn: &Connection,
    actor: Option<&User>,
    input: BudgetInput,
) -> Result<BudgetTracking> {
    require_actor(actor)?;
    let created = budget::insert_budget(conn, input)?;
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Create, "BudgetTracking", Some(created.id)).details(
            json!({
                "project_id": created.project_id,
                "allocated_budget": created.allocated_budget,
                "spent_budget": created.spent_budget,
            }),
        ),
    );
    Ok(created)
}

pub fn update_budget(
    conn: &Connection,
    actor: Option<&User>,
    id: i64,
    input: BudgetInput,
) -> Result<BudgetTracking> {
    require_actor(actor)?;
    let before = budget::get_budget(conn, id)?;
    let updated = budget::update_budget(conn, id, input)?;
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Update, "BudgetTracking", Some(id))
            .details(update_detail(&before, &updated)),
    );
    Ok(updated)
}

pub fn delete_budget(conn: &Connection, actor: Option<&User>, id: i64) -> Result<BudgetTracking> {
    require_actor(actor)?;
    let deleted = budget::delete_budget(conn, id)?;
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Delete, "BudgetTracking", Some(id))
            .details(json!({ "project_id": deleted.project_id })),
    );
    Ok(deleted)
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

pub fn create_notification(
    conn: &Connection,
    actor: Option<&User>,
    input: NotificationInput,
) -> Result<Notification> {
    let created = notification::insert_notification(conn, input)?;
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Create, "Notification", Some(created.id))
            .details(json!({ "role": created.role, "sender": created.sender })),
    );
    Ok(created)
}

pub fn update_notification(
    conn: &Connection,
    actor: Option<&User>,
    id: i64,
    input: NotificationInput,
) -> Result<Notification> {
    let before = notification::get_notification(conn, id)?;
    let updated = notification::update_notification(conn, id, input)?;
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Update, "Notification", Some(id))
            .details(update_detail(&before, &updated)),
    );
    Ok(updated)
}

pub fn delete_notification(
    conn: &Connection,
    actor: Option<&User>,
    id: i64,
) -> Result<Notification> {
    let deleted = notification::delete_notification(conn, id)?;
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Delete, "Notification", Some(id))
            .details(json!({ "role": deleted.role })),
    );
    Ok(deleted)
}

// ============================================================================
// PREDICTION REPORTS
// ============================================================================

/// Raw fields of a report submission, as received.
#[derive(Debug, Clone, Default)]
pub struct ReportSubmission {
    pub location: Option<String>,
    pub created_by: Option<i64>,
    pub file_name: Option<String>,
    pub document: Option<Vec<u8>>,
}

/// Store the document and record the report.
///
/// `kind` is CREATE for the plain collection endpoint and UPLOAD for the
/// dedicated upload endpoint. The creator defaults to the actor.
pub fn submit_report(
    conn: &Connection,
    store: &DocumentStore,
    actor: Option<&User>,
    submission: ReportSubmission,
    kind: ActionKind,
) -> Result<PredictionReport> {
    let mut v = Validator::new();
    v.required("location", submission.location.as_deref());
    v.max_len("location", submission.location.as_deref(), 255);
    let created_by = submission.created_by.or(actor.map(|a| a.id));
    if created_by.is_none() {
        v.push("created_by", "This field is required");
    }
    match &submission.document {
        None => v.push("document", "No file was submitted"),
        Some(bytes) => {
            if let Err(SipmsError::Validation(errors)) = store.check_size(bytes.len() as u64) {
                for e in errors {
                    v.push(&e.field, e.message);
                }
            }
        }
    }
    v.finish()?;

    let bytes = submission.document.unwrap_or_default();
    let file_name = submission.file_name.unwrap_or_else(|| "document".to_string());
    let stored = store.save(&file_name, &bytes)?;
    let stored_path = stored.path.clone();

    let new = NewReport {
        location: submission.location.unwrap_or_default(),
        document: stored,
        created_by: created_by.unwrap_or_default(),
    };
    let created = match report::insert_report(conn, new) {
        Ok(r) => r,
        Err(e) => {
            if let Err(cleanup) = store.delete(&stored_path) {
                tracing::warn!(path = %stored_path, error = %cleanup, "failed to remove orphaned document");
            }
            return Err(e);
        }
    };

    tracing::info!(report_id = created.id, location = %created.location, size = created.document_size, "report stored");
    log_action(
        conn,
        AuditEntry::new(actor, kind, "PredictionReport", Some(created.id)).details(json!({
            "location": created.location,
            "file_name": created.document_name,
            "size": created.document_size,
            "sha256": created.document_sha256,
        })),
    );
    Ok(created)
}

pub fn send_to_mineduc(conn: &Connection, actor: Option<&User>, id: i64) -> Result<PredictionReport> {
    let mut rep = report::get_report(conn, id)?;
    rep.send_to_mineduc();
    report::save_report_state(conn, &rep)?;

    tracing::info!(report_id = id, "report sent to MINEDUC");
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Send, "PredictionReport", Some(id))
            .details(json!({ "location": rep.location })),
    );
    Ok(rep)
}

pub fn approve_report(conn: &Connection, actor: Option<&User>, id: i64) -> Result<PredictionReport> {
    let mut rep = report::get_report(conn, id)?;
    let previous = rep.status;
    rep.approve(Utc::now());
    report::save_report_state(conn, &rep)?;

    tracing::info!(report_id = id, from = %previous, "report approved");
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Approve, "PredictionReport", Some(id)).details(json!({
            "from": previous,
            "approved_at": rep.approved_at,
        })),
    );
    Ok(rep)
}

/// A missing reason is stored as an empty string.
pub fn deny_report(
    conn: &Connection,
    actor: Option<&User>,
    id: i64,
    reason: Option<String>,
) -> Result<PredictionReport> {
    let mut rep = report::get_report(conn, id)?;
    let previous = rep.status;
    let reason = reason.unwrap_or_default();
    rep.deny(reason.clone());
    report::save_report_state(conn, &rep)?;

    tracing::info!(report_id = id, from = %previous, "report denied");
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Deny, "PredictionReport", Some(id))
            .details(json!({ "from": previous, "reason": reason })),
    );
    Ok(rep)
}

/// Delete the record, then its stored document.
pub fn delete_report(
    conn: &Connection,
    store: &DocumentStore,
    actor: Option<&User>,
    id: i64,
) -> Result<PredictionReport> {
    let deleted = report::delete_report(conn, id)?;
    if let Err(e) = store.delete(&deleted.document) {
        tracing::warn!(report_id = id, path = %deleted.document, error = %e, "failed to remove report document");
    }
    log_action(
        conn,
        AuditEntry::new(actor, ActionKind::Delete, "PredictionReport", Some(id))
            .details(json!({ "location": deleted.location, "document": deleted.document })),
    );
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{count_action_logs, list_action_logs, ActionLogFilter};
    use crate::entities::ReportStatus;
    use crate::test_support::{memory_db, seed_prediction, seed_project, seed_school, seed_user};
    use pretty_assertions::assert_eq;

    fn last_log(conn: &Connection) -> crate::audit::ActionLog {
        list_action_logs(
            conn,
            &ActionLogFilter {
                limit: Some(1),
                ..Default::default()
            },
        )
        .unwrap()
        .remove(0)
    }

    fn submission(location: &str, bytes: Vec<u8>) -> ReportSubmission {
        ReportSubmission {
            location: Some(location.to_string()),
            created_by: None,
            file_name: Some("plan.pdf".to_string()),
            document: Some(bytes),
        }
    }

    #[test]
    fn test_each_mutation_logs_exactly_once() {
        let conn = memory_db();
        let admin = seed_user(&conn, Role::Admin);
        let actor = Some(&admin);

        let s = create_school(
            &conn,
            actor,
            SchoolInput {
                name: Some("GS Remera".to_string()),
                student_population: Some(100),
                number_of_rooms: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(count_action_logs(&conn).unwrap(), 1);
        assert_eq!(last_log(&conn).action, ActionKind::Create);

        update_school(
            &conn,
            actor,
            s.id,
            SchoolInput {
                number_of_rooms: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(count_action_logs(&conn).unwrap(), 2);
        let log = last_log(&conn);
        assert_eq!(log.action, ActionKind::Update);
        assert_eq!(log.details, Some(json!({ "changed": ["number_of_rooms"] })));

        let p = create_prediction(&conn, actor, PredictionInput { school_id: Some(s.id) }).unwrap();
        assert_eq!(count_action_logs(&conn).unwrap(), 3);

        update_prediction_approval(&conn, actor, p.id, &json!({"approved_by_district": true})).unwrap();
        assert_eq!(count_action_logs(&conn).unwrap(), 4);
        assert_eq!(last_log(&conn).action, ActionKind::Approve);

        delete_school(&conn, actor, s.id).unwrap();
        assert_eq!(count_action_logs(&conn).unwrap(), 5);
        let log = last_log(&conn);
        assert_eq!(log.action, ActionKind::Delete);
        assert_eq!(log.model_name, "School");
        assert_eq!(log.user_id, Some(admin.id));
    }

    #[test]
    fn test_failed_mutation_does_not_log() {
        let conn = memory_db();

        assert!(create_school(&conn, None, SchoolInput::default()).is_err());
        assert!(delete_school(&conn, None, 99).is_err());

        assert_eq!(count_action_logs(&conn).unwrap(), 0);
    }

    #[test]
    fn test_approval_requires_actor_and_known_fields() {
        let conn = memory_db();
        let district = seed_user(&conn, Role::District);
        let p = seed_prediction(&conn, 100, 1);

        let err = update_prediction_approval(&conn, None, p.id, &json!({"approved_by_district": true}))
            .unwrap_err();
        assert!(matches!(err, SipmsError::Unauthorized));

        let err = update_prediction_approval(&conn, Some(&district), p.id, &json!({"foo": "bar"}))
            .unwrap_err();
        assert!(matches!(err, SipmsError::Validation(_)));

        let err = update_prediction_approval(&conn, Some(&district), 999, &json!({"approved_by_district": true}))
            .unwrap_err();
        assert!(err.is_not_found());

        assert_eq!(count_action_logs(&conn).unwrap(), 0);
    }

    #[test]
    fn test_approval_leaves_other_flag() {
        let conn = memory_db();
        let district = seed_user(&conn, Role::District);
        let mineduc = seed_user(&conn, Role::Mineduc);
        let p = seed_prediction(&conn, 100, 1);

        update_prediction_approval(&conn, Some(&mineduc), p.id, &json!({"approved_by_mineduc": true}))
            .unwrap();
        let state = update_prediction_approval(
            &conn,
            Some(&district),
            p.id,
            &json!({"approved_by_district": true, "estimated_budget": 1}),
        )
        .unwrap();

        assert_eq!(
            state,
            ApprovalState {
                approved_by_district: true,
                approved_by_mineduc: true,
            }
        );
        // Derived fields untouched by the extra key
        assert_eq!(
            prediction::get_prediction(&conn, p.id).unwrap().estimated_budget,
            10_000_000
        );
        assert_eq!(
            last_log(&conn).details,
            Some(json!({
                "applied": {"approved_by_district": true},
                "ignored_fields": ["estimated_budget"],
            }))
        );
    }

    #[test]
    fn test_approval_picks_up_school_changes() {
        let conn = memory_db();
        let district = seed_user(&conn, Role::District);
        let p = seed_prediction(&conn, 100, 1);

        update_school(
            &conn,
            None,
            p.school_id,
            SchoolInput {
                number_of_rooms: Some(3),
                ..Default::default()
            },
        )
        .unwrap();
        update_prediction_approval(&conn, Some(&district), p.id, &json!({"approved_by_district": false}))
            .unwrap();

        let saved = prediction::get_prediction(&conn, p.id).unwrap();
        assert_eq!(saved.rooms_to_build, 0);
        assert_eq!(saved.estimated_budget, 0);
    }

    #[test]
    fn test_prediction_create_needs_actor() {
        let conn = memory_db();
        let s = seed_school(&conn, 40, 0);

        let err = create_prediction(&conn, None, PredictionInput { school_id: Some(s.id) }).unwrap_err();
        assert!(matches!(err, SipmsError::Unauthorized));
    }

    #[test]
    fn test_project_owner_resolution() {
        let conn = memory_db();
        let district = seed_user(&conn, Role::District);
        let mineduc = seed_user(&conn, Role::Mineduc);
        let p = seed_prediction(&conn, 100, 1);
        let input = ProjectInput {
            prediction_id: Some(p.id),
            project_name: Some("Block A".to_string()),
            ..Default::default()
        };

        let own = create_project(&conn, Some(&district), input.clone()).unwrap();
        assert_eq!(own.district_id, district.id);

        let err = create_project(&conn, Some(&mineduc), input.clone()).unwrap_err();
        assert!(matches!(err, SipmsError::Validation(ref e) if e[0].field == "district_id"));

        let named = create_project(
            &conn,
            Some(&mineduc),
            ProjectInput {
                district_id: Some(district.id),
                ..input
            },
        )
        .unwrap();
        assert_eq!(named.district_id, district.id);
    }

    #[test]
    fn test_budget_requires_actor() {
        let conn = memory_db();
        let project = seed_project(&conn);
        let district = seed_user(&conn, Role::District);
        let input = BudgetInput {
            project_id: Some(project.id),
            allocated_budget: Some(10.0),
            spent_budget: Some(4.0),
        };

        assert!(matches!(
            create_budget(&conn, None, input.clone()),
            Err(SipmsError::Unauthorized)
        ));
        let b = create_budget(&conn, Some(&district), input).unwrap();
        assert_eq!(b.remaining_budget, 6.0);
    }

    #[test]
    fn test_report_lifecycle_logs() {
        let conn = memory_db();
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let district = seed_user(&conn, Role::District);
        let mineduc = seed_user(&conn, Role::Mineduc);

        let r = submit_report(
            &conn,
            &store,
            Some(&district),
            submission("Gasabo", b"%PDF-1.4".to_vec()),
            ActionKind::Upload,
        )
        .unwrap();
        assert_eq!(r.created_by, district.id);
        assert_eq!(last_log(&conn).action, ActionKind::Upload);

        let r = send_to_mineduc(&conn, Some(&district), r.id).unwrap();
        assert!(r.is_sent_to_mineduc);
        assert_eq!(r.status, ReportStatus::Pending);
        assert_eq!(last_log(&conn).action, ActionKind::Send);

        let r = deny_report(&conn, Some(&mineduc), r.id, Some("x".to_string())).unwrap();
        assert_eq!(r.denial_reason.as_deref(), Some("x"));
        assert_eq!(r.approved_at, None);
        assert_eq!(last_log(&conn).action, ActionKind::Deny);

        let first = approve_report(&conn, Some(&mineduc), r.id).unwrap();
        let second = approve_report(&conn, Some(&mineduc), r.id).unwrap();
        assert_eq!(second.status, ReportStatus::Approved);
        assert_eq!(second.denial_reason, None);
        assert!(second.approved_at >= first.approved_at);
        assert!(second.is_sent_to_mineduc);

        let path = store.resolve(&second.document).unwrap();
        assert!(path.exists());
        delete_report(&conn, &store, Some(&mineduc), r.id).unwrap();
        assert!(!path.exists());

        let kinds: Vec<ActionKind> = list_action_logs(&conn, &ActionLogFilter::default())
            .unwrap()
            .into_iter()
            .map(|l| l.action)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::Delete,
                ActionKind::Approve,
                ActionKind::Approve,
                ActionKind::Deny,
                ActionKind::Send,
                ActionKind::Upload,
            ]
        );
    }

    #[test]
    fn test_deny_without_reason_stores_empty() {
        let conn = memory_db();
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let district = seed_user(&conn, Role::District);
        let r = submit_report(
            &conn,
            &store,
            Some(&district),
            submission("Kicukiro", b"doc".to_vec()),
            ActionKind::Create,
        )
        .unwrap();

        let denied = deny_report(&conn, None, r.id, None).unwrap();
        assert_eq!(denied.denial_reason.as_deref(), Some(""));
    }

    #[test]
    fn test_report_submission_validation() {
        let conn = memory_db();
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());

        // No actor, no creator, no document, no location
        let err = submit_report(&conn, &store, None, ReportSubmission::default(), ActionKind::Create)
            .unwrap_err();
        match err {
            SipmsError::Validation(errors) => {
                let mut fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                fields.sort();
                assert_eq!(fields, vec!["created_by", "document", "location"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        // Unknown creator: the stored file is cleaned up again
        let mut orphan = submission("Gasabo", b"abc".to_vec());
        orphan.created_by = Some(404);
        assert!(submit_report(&conn, &store, None, orphan, ActionKind::Create).is_err());
        let leftover = walk_files(dir.path());
        assert!(leftover.is_empty(), "leftover files: {:?}", leftover);

        assert_eq!(count_action_logs(&conn).unwrap(), 0);
    }

    #[test]
    fn test_report_size_cap() {
        let conn = memory_db();
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let district = seed_user(&conn, Role::District);

        let big = submission("Gasabo", vec![7u8; 11 * 1024 * 1024]);
        let err = submit_report(&conn, &store, Some(&district), big, ActionKind::Upload).unwrap_err();
        assert!(matches!(err, SipmsError::Validation(ref e) if e[0].field == "document"));

        let ok = submission("Gasabo", vec![7u8; 9 * 1024 * 1024]);
        assert!(submit_report(&conn, &store, Some(&district), ok, ActionKind::Upload).is_ok());
    }

    fn walk_files(root: &std::path::Path) -> Vec<std::path::PathBuf> {
        let mut files = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files
    }
}
