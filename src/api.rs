// SIPMS - REST API (axum)
//
// All routes live under /api. The caller identifies itself with an
// X-User-Id header; handlers resolve it once and pass the user down to the
// workflow layer. The database lock is taken per store operation and never
// held across an .await.

use crate::audit::{list_action_logs, ActionKind, ActionLog, ActionLogFilter};
use crate::entities::{
    budget, notification, prediction, project, report, school, user, ApprovalState, BudgetInput,
    BudgetTracking, DistrictSummary, Notification, NotificationInput, Prediction,
    PredictionInput, PredictionReport, Project, ProjectInput, Role, School, SchoolInput, User,
    UserInput,
};
use crate::error::SipmsError;
use crate::storage::DocumentStore;
use crate::validation::group_by_field;
use crate::workflow::{self, require_actor, ReportSubmission};
use axum::{
    async_trait,
    extract::{
        multipart::MultipartError,
        rejection::{JsonRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, FromRequest, FromRequestParts, Multipart, Path, Query, Request, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub const ACTOR_HEADER: &str = "x-user-id";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub store: DocumentStore,
}

impl AppState {
    pub fn new(conn: Connection, store: DocumentStore) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
            store,
        }
    }

    fn db(&self) -> ApiResult<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| ApiError(anyhow::anyhow!("database mutex poisoned").into()))
    }
}

// ============================================================================
// Errors and envelopes
// ============================================================================

#[derive(Debug)]
pub struct ApiError(pub SipmsError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<SipmsError> for ApiError {
    fn from(err: SipmsError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.0.to_string();
        let (status, body) = match &self.0 {
            SipmsError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "message": message, "errors": group_by_field(errors) }),
            ),
            SipmsError::NotFound { .. } => (
                StatusCode::NOT_FOUND,
                json!({ "success": false, "message": message }),
            ),
            SipmsError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "success": false, "message": message }),
            ),
            SipmsError::Forbidden(_) => (
                StatusCode::FORBIDDEN,
                json!({ "success": false, "message": message }),
            ),
            other => {
                tracing::error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "success": false, "message": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Response wrapper used by the report endpoints
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl<T> Envelope<T> {
    fn ok(data: T) -> Self {
        Envelope {
            success: true,
            message: None,
            data: Some(data),
            reason: None,
        }
    }

    fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Report plus a download URL under /media
#[derive(Debug, Serialize)]
pub struct ReportView {
    #[serde(flatten)]
    pub report: PredictionReport,
    pub document_url: String,
}

impl From<PredictionReport> for ReportView {
    fn from(report: PredictionReport) -> Self {
        let encoded: Vec<String> = report
            .document
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        ReportView {
            document_url: format!("/media/{}", encoded.join("/")),
            report,
        }
    }
}

// ============================================================================
// Actor extraction
// ============================================================================

/// The calling user, if the request named one.
#[derive(Debug, Clone)]
pub struct Actor(pub Option<User>);

impl Actor {
    pub fn user(&self) -> Option<&User> {
        self.0.as_ref()
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        let Some(raw) = parts.headers.get(ACTOR_HEADER) else {
            return Ok(Actor(None));
        };
        let id: i64 = raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or(ApiError(SipmsError::Unauthorized))?;

        let conn = state.db()?;
        match user::get_user(&conn, id) {
            Ok(found) => Ok(Actor(Some(found))),
            Err(e) if e.is_not_found() => {
                tracing::debug!(user_id = id, "unknown actor id");
                Err(ApiError(SipmsError::Unauthorized))
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Body, query and path extractors
// ============================================================================

/// `Json` whose rejections come back as field errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

/// `Query` whose rejections come back as field errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

/// `Path` whose rejections come back as field errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> ApiResult<Self> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(JsonRejection::JsonDataError(err)) => Err(deserialize_error(&err.body_text()).into()),
            Err(JsonRejection::JsonSyntaxError(err)) => Err(deserialize_error(&err.body_text()).into()),
            Err(other) => Err(SipmsError::invalid("non_field_errors", other.body_text()).into()),
        }
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> ApiResult<Self> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(QueryRejection::FailedToDeserializeQueryString(err)) => {
                Err(deserialize_error(&err.body_text()).into())
            }
            Err(other) => Err(SipmsError::invalid("non_field_errors", other.body_text()).into()),
        }
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> ApiResult<Self> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(ApiPath(value)),
            Err(PathRejection::FailedToDeserializePathParams(err)) => {
                Err(deserialize_error(&err.body_text()).into())
            }
            Err(other) => Err(ApiError(anyhow::anyhow!(other.body_text()).into())),
        }
    }
}

/// Rejection text is "<summary>: [<path>: ]<problem>"; a path names the field.
fn deserialize_error(text: &str) -> SipmsError {
    let detail = text.split_once(": ").map_or(text, |(_, rest)| rest);
    match detail.split_once(": ") {
        Some((path, problem)) if !path.is_empty() && !path.contains(char::is_whitespace) => {
            SipmsError::invalid(path, problem)
        }
        _ => SipmsError::invalid("non_field_errors", detail),
    }
}

// ============================================================================
// Router
// ============================================================================

/// Full application: /api routes, /media files, CORS, request tracing.
pub fn app(state: AppState) -> Router {
    let media = ServeDir::new(state.store.media_root());
    Router::new()
        .nest("/api", api_routes(state))
        .nest_service("/media", media)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub fn api_routes(state: AppState) -> Router {
    // Leave room above the document cap so oversize files reach validation
    let upload_limit = usize::try_from(state.store.max_bytes().saturating_mul(2))
        .unwrap_or(usize::MAX)
        .saturating_add(1024 * 1024);

    Router::new()
        .route("/health", get(health_check))
        // Users
        .route("/register/", post(register))
        .route("/users/", get(list_users))
        .route(
            "/users/:id/",
            get(get_user).put(update_user).patch(update_user).delete(delete_user),
        )
        // Schools
        .route("/schools/", get(list_schools).post(create_school))
        .route(
            "/schools/:id/",
            get(get_school).put(update_school).patch(update_school).delete(delete_school),
        )
        // Predictions
        .route("/predictions/", get(list_predictions).post(create_prediction))
        .route("/predictions/:id/", get(get_prediction).delete(delete_prediction))
        .route("/predictions/:id/approve/", patch(approve_prediction))
        .route("/district-summary/", get(district_summary))
        // Projects
        .route("/projects/", get(list_projects).post(create_project))
        .route(
            "/projects/:id/",
            get(get_project).put(update_project).patch(update_project).delete(delete_project),
        )
        // Budget tracking
        .route("/budget/", get(list_budgets).post(create_budget))
        .route("/budget-tracking/", get(list_budgets).post(create_budget))
        .route(
            "/budget/:id/",
            get(get_budget).put(update_budget).patch(update_budget).delete(delete_budget),
        )
        .route(
            "/budget-tracking/:id/",
            get(get_budget).put(update_budget).patch(update_budget).delete(delete_budget),
        )
        // Notifications
        .route("/notifications/", get(list_notifications).post(create_notification))
        .route(
            "/notifications/:id/",
            get(get_notification)
                .put(update_notification)
                .patch(update_notification)
                .delete(delete_notification),
        )
        // Prediction reports
        .route(
            "/prediction-reports/",
            get(list_reports)
                .post(create_report)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/prediction-reports/upload/",
            post(upload_report).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/prediction-reports/:id/", get(get_report).delete(delete_report))
        .route(
            "/prediction-reports/by-location/:location/",
            get(reports_by_location),
        )
        .route("/send-to-mineduc/:id/", post(send_to_mineduc))
        .route("/prediction-reports/mineduc/approve/:id/", post(approve_report))
        .route("/prediction-reports/mineduc/deny/:id/", post(deny_report))
        // Audit trail
        .route("/action-logs/", get(list_action_log_entries))
        .with_state(state)
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(json!({ "success": true, "data": "OK", "version": crate::VERSION }))
}

// ----------------------------------------------------------------------------
// Users
// ----------------------------------------------------------------------------

async fn register(
    State(state): State<AppState>,
    actor: Actor,
    ApiJson(input): ApiJson<UserInput>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let conn = state.db()?;
    let created = workflow::register_user(&conn, actor.user(), input)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<User>>> {
    let conn = state.db()?;
    Ok(Json(user::list_users(&conn)?))
}

async fn get_user(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> ApiResult<Json<User>> {
    let conn = state.db()?;
    Ok(Json(user::get_user(&conn, id)?))
}

async fn update_user(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<UserInput>,
) -> ApiResult<Json<User>> {
    let conn = state.db()?;
    Ok(Json(workflow::update_user(&conn, actor.user(), id, input)?))
}

async fn delete_user(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    let conn = state.db()?;
    workflow::delete_user(&conn, actor.user(), id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ----------------------------------------------------------------------------
// Schools
// ----------------------------------------------------------------------------

async fn list_schools(State(state): State<AppState>) -> ApiResult<Json<Vec<School>>> {
    let conn = state.db()?;
    Ok(Json(school::list_schools(&conn)?))
}

async fn create_school(
    State(state): State<AppState>,
    actor: Actor,
    ApiJson(input): ApiJson<SchoolInput>,
) -> ApiResult<(StatusCode, Json<School>)> {
    let conn = state.db()?;
    let created = workflow::create_school(&conn, actor.user(), input)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_school(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> ApiResult<Json<School>> {
    let conn = state.db()?;
    Ok(Json(school::get_school(&conn, id)?))
}

async fn update_school(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<SchoolInput>,
) -> ApiResult<Json<School>> {
    let conn = state.db()?;
    Ok(Json(workflow::update_school(&conn, actor.user(), id, input)?))
}

async fn delete_school(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    let conn = state.db()?;
    workflow::delete_school(&conn, actor.user(), id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ----------------------------------------------------------------------------
// Predictions
// ----------------------------------------------------------------------------

async fn list_predictions(State(state): State<AppState>) -> ApiResult<Json<Vec<Prediction>>> {
    let conn = state.db()?;
    Ok(Json(prediction::list_predictions(&conn)?))
}

async fn create_prediction(
    State(state): State<AppState>,
    actor: Actor,
    ApiJson(input): ApiJson<PredictionInput>,
) -> ApiResult<(StatusCode, Json<Prediction>)> {
    let conn = state.db()?;
    let created = workflow::create_prediction(&conn, actor.user(), input)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_prediction(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Prediction>> {
    let conn = state.db()?;
    Ok(Json(prediction::get_prediction(&conn, id)?))
}

async fn delete_prediction(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    let conn = state.db()?;
    workflow::delete_prediction(&conn, actor.user(), id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/predictions/:id/approve/
async fn approve_prediction(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<Value>,
) -> ApiResult<Json<ApprovalState>> {
    let conn = state.db()?;
    let approval = workflow::update_prediction_approval(&conn, actor.user(), id, &payload)?;
    Ok(Json(approval))
}

#[derive(Debug, Deserialize)]
struct SummaryQuery {
    umurenge: Option<String>,
}

async fn district_summary(
    State(state): State<AppState>,
    actor: Actor,
    ApiQuery(query): ApiQuery<SummaryQuery>,
) -> ApiResult<Json<DistrictSummary>> {
    let conn = state.db()?;
    let summary = workflow::district_summary(&conn, actor.user(), query.umurenge.as_deref())?;
    Ok(Json(summary))
}

// ----------------------------------------------------------------------------
// Projects
// ----------------------------------------------------------------------------

async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Vec<Project>>> {
    let conn = state.db()?;
    Ok(Json(project::list_projects(&conn)?))
}

async fn create_project(
    State(state): State<AppState>,
    actor: Actor,
    ApiJson(input): ApiJson<ProjectInput>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let conn = state.db()?;
    let created = workflow::create_project(&conn, actor.user(), input)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_project(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> ApiResult<Json<Project>> {
    let conn = state.db()?;
    Ok(Json(project::get_project(&conn, id)?))
}

async fn update_project(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<ProjectInput>,
) -> ApiResult<Json<Project>> {
    let conn = state.db()?;
    Ok(Json(workflow::update_project(&conn, actor.user(), id, input)?))
}

async fn delete_project(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    let conn = state.db()?;
    workflow::delete_project(&conn, actor.user(), id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ----------------------------------------------------------------------------
// Budget tracking (authenticated)
// ----------------------------------------------------------------------------

async fn list_budgets(
    State(state): State<AppState>,
    actor: Actor,
) -> ApiResult<Json<Vec<BudgetTracking>>> {
    require_actor(actor.user())?;
    let conn = state.db()?;
    Ok(Json(budget::list_budgets(&conn)?))
}

async fn create_budget(
    State(state): State<AppState>,
    actor: Actor,
    ApiJson(input): ApiJson<BudgetInput>,
) -> ApiResult<(StatusCode, Json<BudgetTracking>)> {
    let conn = state.db()?;
    let created = workflow::create_budget(&conn, actor.user(), input)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_budget(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<BudgetTracking>> {
    require_actor(actor.user())?;
    let conn = state.db()?;
    Ok(Json(budget::get_budget(&conn, id)?))
}

async fn update_budget(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<BudgetInput>,
) -> ApiResult<Json<BudgetTracking>> {
    let conn = state.db()?;
    Ok(Json(workflow::update_budget(&conn, actor.user(), id, input)?))
}

async fn delete_budget(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    let conn = state.db()?;
    workflow::delete_budget(&conn, actor.user(), id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ----------------------------------------------------------------------------
// Notifications
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NotificationQuery {
    role: Option<Role>,
}

async fn list_notifications(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    let conn = state.db()?;
    Ok(Json(notification::list_notifications(&conn, query.role)?))
}

async fn create_notification(
    State(state): State<AppState>,
    actor: Actor,
    ApiJson(input): ApiJson<NotificationInput>,
) -> ApiResult<(StatusCode, Json<Notification>)> {
    let conn = state.db()?;
    let created = workflow::create_notification(&conn, actor.user(), input)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_notification(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Notification>> {
    let conn = state.db()?;
    Ok(Json(notification::get_notification(&conn, id)?))
}

async fn update_notification(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<NotificationInput>,
) -> ApiResult<Json<Notification>> {
    let conn = state.db()?;
    Ok(Json(workflow::update_notification(&conn, actor.user(), id, input)?))
}

async fn delete_notification(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    let conn = state.db()?;
    workflow::delete_notification(&conn, actor.user(), id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ----------------------------------------------------------------------------
// Prediction reports
// ----------------------------------------------------------------------------

fn bad_multipart(err: MultipartError) -> ApiError {
    ApiError(SipmsError::invalid("document", err.body_text()))
}

/// Pull the report fields out of a multipart body. Unknown parts are skipped.
async fn read_submission(mut multipart: Multipart) -> ApiResult<ReportSubmission> {
    let mut submission = ReportSubmission::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "location" => {
                submission.location = Some(field.text().await.map_err(bad_multipart)?);
            }
            "created_by" => {
                let text = field.text().await.map_err(bad_multipart)?;
                let text = text.trim();
                if !text.is_empty() {
                    let id = text.parse().map_err(|_| {
                        SipmsError::invalid("created_by", "A valid integer is required")
                    })?;
                    submission.created_by = Some(id);
                }
            }
            "document" => {
                submission.file_name = field.file_name().map(str::to_string);
                submission.document = Some(field.bytes().await.map_err(bad_multipart)?.to_vec());
            }
            other => tracing::debug!(field = other, "skipping unknown multipart field"),
        }
    }

    Ok(submission)
}

#[derive(Debug, Deserialize)]
struct LocationQuery {
    location: Option<String>,
}

async fn list_reports(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LocationQuery>,
) -> ApiResult<Json<Envelope<Vec<ReportView>>>> {
    let conn = state.db()?;
    let reports = report::list_reports(&conn, query.location.as_deref())?;
    Ok(Json(Envelope::ok(reports.into_iter().map(ReportView::from).collect())))
}

async fn create_report(
    State(state): State<AppState>,
    actor: Actor,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Envelope<ReportView>>)> {
    let submission = read_submission(multipart).await?;
    let conn = state.db()?;
    let created = workflow::submit_report(
        &conn,
        &state.store,
        actor.user(),
        submission,
        ActionKind::Create,
    )?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(created.into()).message("Report created successfully")),
    ))
}

/// POST /api/prediction-reports/upload/ - requires an actor
async fn upload_report(
    State(state): State<AppState>,
    actor: Actor,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Envelope<ReportView>>)> {
    let uploader = require_actor(actor.user())?;
    let submission = read_submission(multipart).await?;
    let conn = state.db()?;
    let created = workflow::submit_report(
        &conn,
        &state.store,
        Some(uploader),
        submission,
        ActionKind::Upload,
    )?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(created.into()).message("Report uploaded successfully")),
    ))
}

async fn get_report(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<ReportView>>> {
    let conn = state.db()?;
    Ok(Json(Envelope::ok(report::get_report(&conn, id)?.into())))
}

async fn delete_report(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<()>>> {
    let conn = state.db()?;
    workflow::delete_report(&conn, &state.store, actor.user(), id)?;
    Ok(Json(Envelope {
        success: true,
        message: Some("Report deleted".to_string()),
        data: None,
        reason: None,
    }))
}

async fn reports_by_location(
    State(state): State<AppState>,
    ApiPath(location): ApiPath<String>,
) -> ApiResult<Json<Envelope<Vec<ReportView>>>> {
    let conn = state.db()?;
    let reports = report::reports_by_location(&conn, &location)?;
    Ok(Json(Envelope::ok(reports.into_iter().map(ReportView::from).collect())))
}

async fn send_to_mineduc(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<ReportView>>> {
    let conn = state.db()?;
    let sent = workflow::send_to_mineduc(&conn, actor.user(), id)?;
    Ok(Json(Envelope::ok(sent.into()).message("Report sent to MINEDUC")))
}

async fn approve_report(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<ReportView>>> {
    let conn = state.db()?;
    let approved = workflow::approve_report(&conn, actor.user(), id)?;
    Ok(Json(Envelope::ok(approved.into()).message("Report approved")))
}

#[derive(Debug, Default, Deserialize)]
struct DenyRequest {
    reason: Option<String>,
}

/// Body is optional; a missing reason is stored as ""
async fn deny_report(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
    body: Option<Json<DenyRequest>>,
) -> ApiResult<Json<Envelope<ReportView>>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let conn = state.db()?;
    let denied = workflow::deny_report(&conn, actor.user(), id, request.reason)?;
    let reason = denied.denial_reason.clone().unwrap_or_default();

    let mut envelope = Envelope::ok(ReportView::from(denied)).message("Report denied");
    envelope.reason = Some(reason);
    Ok(Json(envelope))
}

// ----------------------------------------------------------------------------
// Audit trail
// ----------------------------------------------------------------------------

async fn list_action_log_entries(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<ActionLogFilter>,
) -> ApiResult<Json<Vec<ActionLog>>> {
    let conn = state.db()?;
    Ok(Json(list_action_logs(&conn, &filter)?))
}
