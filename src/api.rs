use std::sync::Arc;

use axum::extract::{Form, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::jira::{self, JiraError};
use crate::models::{
    CreateJobRequest, GenerationJob, JiraConnection, JiraCredentials, JiraProject, JobLogsResponse,
    JobStatus, JobStatusResponse, TestConnectionResponse, TestResultResponse,
    UpdateJobStatusRequest, is_valid_ticket_key, parse_components,
};
use crate::state::AppState;
use crate::ui::{self, SearchView};

const TICKET_FORMAT_MESSAGE: &str = "Jira ticket format must be PROJ-123";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(index_page))
        .route("/jira/connect", get(connect_page).post(save_connection))
        .route("/jira/connections", get(connections_page))
        .route(
            "/jira/connections/{connection_id}/projects",
            get(connection_projects),
        )
        .route("/jira/search", get(search_page).post(search_tickets))
        .route("/jira/ticket/{key}", get(ticket_page))
        .route("/jira/import/{key}", post(import_ticket))
        .route("/jira/api/test-connection", post(api_test_connection))
        .route("/ticket/submit", post(submit_ticket_form))
        .route("/jobs/{job_id}", get(job_detail_page))
        .route("/api/jobs", post(create_job).get(list_jobs))
        .route("/api/jobs/{job_id}", delete(delete_job))
        .route(
            "/api/jobs/{job_id}/status",
            get(get_job_status).put(update_job_status),
        )
        .route("/api/jobs/{job_id}/logs", get(get_job_logs))
        .route("/api/jobs/{job_id}/test-result", get(get_test_result))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn index_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let jobs = state.jobs.list_jobs().await;
    Html(ui::render_index_page(&jobs, None))
}

async fn connect_page() -> Html<String> {
    Html(ui::render_connect_page(None, "", ""))
}

async fn save_connection(
    State(state): State<Arc<AppState>>,
    Form(credentials): Form<JiraCredentials>,
) -> Response {
    if let Err(err) = jira::validate(&credentials) {
        return (
            StatusCode::BAD_REQUEST,
            Html(ui::render_connect_page(
                Some(&err.to_string()),
                &credentials.server_url,
                &credentials.username,
            )),
        )
            .into_response();
    }

    let connection = state.connections.save(credentials).await;
    info!(
        "saved jira connection {} for {}",
        connection.id, connection.credentials.server_url
    );
    Redirect::to(&format!("/jira/search?connectionId={}", connection.id)).into_response()
}

async fn connections_page(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(ui::render_connections_page(&state.connections.list().await))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionRef {
    connection_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchForm {
    connection_id: u64,
    #[serde(default)]
    jql: String,
}

async fn find_connection(
    state: &AppState,
    connection_id: u64,
) -> Result<JiraConnection, Response> {
    state.connections.get(connection_id).await.ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Html(ui::render_error_page(
                "Connection not found",
                &format!("No saved Jira connection with id {connection_id}."),
            )),
        )
            .into_response()
    })
}

async fn search_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectionRef>,
) -> Response {
    let connection = match find_connection(&state, query.connection_id).await {
        Ok(connection) => connection,
        Err(response) => return response,
    };

    let (projects, error) = match state.jira.projects(&connection.credentials).await {
        Ok(projects) => (projects, None),
        Err(err) => {
            warn!("listing projects for connection {} failed: {err}", connection.id);
            (Vec::new(), Some(format!("Could not load projects: {err}")))
        }
    };

    Html(ui::render_search_page(&SearchView {
        connection: &connection,
        projects: &projects,
        jql: "",
        results: None,
        error: error.as_deref(),
    }))
    .into_response()
}

async fn search_tickets(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SearchForm>,
) -> Response {
    let connection = match find_connection(&state, form.connection_id).await {
        Ok(connection) => connection,
        Err(response) => return response,
    };

    let jql = form.jql.trim();
    let outcome = if jql.is_empty() {
        Err(JiraError::Query("JQL query is required".to_string()))
    } else {
        state.jira.search(&connection.credentials, jql).await
    };
    state.connections.mark_used(connection.id).await;

    let (status, results, error) = match outcome {
        Ok(tickets) => (StatusCode::OK, tickets, None),
        Err(err) => {
            warn!("jira search on connection {} failed: {err}", connection.id);
            (jira_status(&err), Vec::new(), Some(err.to_string()))
        }
    };

    let html = ui::render_search_page(&SearchView {
        connection: &connection,
        projects: &[],
        jql,
        results: error.is_none().then_some(results.as_slice()),
        error: error.as_deref(),
    });
    (status, Html(html)).into_response()
}

async fn ticket_page(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<ConnectionRef>,
) -> Response {
    let connection = match find_connection(&state, query.connection_id).await {
        Ok(connection) => connection,
        Err(response) => return response,
    };
    state.connections.mark_used(connection.id).await;

    match state.jira.issue(&connection.credentials, &key).await {
        Ok(ticket) => Html(ui::render_ticket_page(connection.id, &ticket)).into_response(),
        Err(err) => {
            warn!("loading ticket {key} failed: {err}");
            (
                jira_status(&err),
                Html(ui::render_error_page("Ticket unavailable", &err.to_string())),
            )
                .into_response()
        }
    }
}

async fn import_ticket(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Form(form): Form<ConnectionRef>,
) -> Response {
    let connection = match find_connection(&state, form.connection_id).await {
        Ok(connection) => connection,
        Err(response) => return response,
    };
    state.connections.mark_used(connection.id).await;

    match state.jira.issue(&connection.credentials, &key).await {
        Ok(ticket) => {
            let job = state
                .runner
                .submit(&ticket.key, &ticket.content, ticket.components)
                .await;
            Redirect::to(&format!("/jobs/{}", job.id)).into_response()
        }
        Err(err) => {
            warn!("importing ticket {key} failed: {err}");
            (
                jira_status(&err),
                Html(ui::render_error_page("Import failed", &err.to_string())),
            )
                .into_response()
        }
    }
}

async fn connection_projects(
    State(state): State<Arc<AppState>>,
    Path(connection_id): Path<u64>,
) -> Result<Json<Vec<JiraProject>>, ApiError> {
    let Some(connection) = state.connections.get(connection_id).await else {
        return Err(ApiError::not_found("connection not found"));
    };
    Ok(Json(state.jira.projects(&connection.credentials).await?))
}

fn jira_status(err: &JiraError) -> StatusCode {
    match err {
        JiraError::InvalidUrl
        | JiraError::InvalidUsername
        | JiraError::MissingToken
        | JiraError::Query(_) => StatusCode::BAD_REQUEST,
        JiraError::TicketNotFound(_) => StatusCode::NOT_FOUND,
        JiraError::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
        JiraError::Unauthorized
        | JiraError::NotFound
        | JiraError::UnexpectedStatus(_)
        | JiraError::Transport(_)
        | JiraError::Decode(_) => StatusCode::BAD_GATEWAY,
    }
}

async fn job_detail_page(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    match state.jobs.get_job(&job_id).await {
        Some(job) => {
            let logs = state.jobs.list_logs(&job_id).await.unwrap_or_default();
            Html(ui::render_job_page(&job, &logs)).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Html(ui::render_not_found_page(&job_id)),
        )
            .into_response(),
    }
}

async fn api_test_connection(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<JiraCredentials>,
) -> Response {
    match state.jira.test_connection(&credentials).await {
        Ok(()) => Json(TestConnectionResponse {
            success: true,
            message: "Connection successful".to_string(),
        })
        .into_response(),
        Err(err) => {
            warn!("jira connection test failed: {err}");
            (
                StatusCode::BAD_REQUEST,
                Json(TestConnectionResponse {
                    success: false,
                    message: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct TicketForm {
    #[serde(rename = "jiraTicket", default)]
    jira_ticket: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    components: String,
}

async fn submit_ticket_form(
    State(state): State<Arc<AppState>>,
    Form(form): Form<TicketForm>,
) -> Response {
    if !is_valid_ticket_key(&form.jira_ticket) {
        let jobs = state.jobs.list_jobs().await;
        return (
            StatusCode::BAD_REQUEST,
            Html(ui::render_index_page(&jobs, Some(TICKET_FORMAT_MESSAGE))),
        )
            .into_response();
    }

    let job = state
        .runner
        .submit(
            &form.jira_ticket,
            &form.description,
            parse_components(&form.components),
        )
        .await;
    Redirect::to(&format!("/jobs/{}", job.id)).into_response()
}

async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateJobRequest>,
) -> Result<Json<GenerationJob>, ApiError> {
    if !is_valid_ticket_key(&payload.jira_ticket) {
        return Err(ApiError::bad_request(TICKET_FORMAT_MESSAGE));
    }

    let job = state
        .runner
        .submit(&payload.jira_ticket, &payload.description, payload.components)
        .await;
    Ok(Json(job))
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<GenerationJob>> {
    Json(state.jobs.list_jobs().await)
}

async fn get_job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    debug!("checking status for job {job_id}");
    let Some(job) = state.jobs.get_job(&job_id).await else {
        return Err(ApiError::not_found("job not found"));
    };
    Ok(Json(job.status_response()))
}

async fn update_job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Json(payload): Json<UpdateJobStatusRequest>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let Ok(status) = payload.status.parse::<JobStatus>() else {
        return Err(ApiError::bad_request(format!(
            "unknown status: {}",
            payload.status
        )));
    };

    let Some(job) = state
        .jobs
        .update_status(&job_id, status, payload.error)
        .await
    else {
        return Err(ApiError::not_found("job not found"));
    };

    info!("job {job_id} is now {}", job.status.as_str());
    Ok(Json(job.status_response()))
}

async fn get_job_logs(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobLogsResponse>, ApiError> {
    let Some(logs) = state.jobs.list_logs(&job_id).await else {
        return Err(ApiError::not_found("job not found"));
    };
    Ok(Json(JobLogsResponse { job_id, logs }))
}

async fn get_test_result(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<TestResultResponse>, ApiError> {
    let Some(job) = state.jobs.get_job(&job_id).await else {
        return Err(ApiError::not_found("job not found"));
    };
    Ok(Json(TestResultResponse {
        job_id: job.id,
        status: job.status,
        test_result: job.test_result,
    }))
}

async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.runner.abort(&job_id).await {
        info!("stopped running job {job_id}");
    }
    if !state.jobs.delete_job(&job_id).await {
        return Err(ApiError::not_found("job not found"));
    }
    info!("deleted job {job_id}");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl From<JiraError> for ApiError {
    fn from(err: JiraError) -> Self {
        Self::new(jira_status(&err), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self
                .status
                .canonical_reason()
                .unwrap_or("error")
                .to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}
