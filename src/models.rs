use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const JOB_LOG_MESSAGE_LIMIT: usize = 150;

static TICKET_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]+-\d+$").unwrap_or_else(|err| panic!("invalid ticket key pattern: {err}"))
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Bootstrap contextual colour used for the status badge.
    pub fn badge_color(self) -> &'static str {
        match self {
            Self::Completed => "success",
            Self::InProgress => "warning",
            Self::Failed => "danger",
            Self::Pending => "secondary",
        }
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PENDING" => Self::Pending,
            "IN_PROGRESS" => Self::InProgress,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            _ => return Err(()),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    pub id: String,
    pub ticket_key: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub components: Vec<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_result: Option<String>,
}

impl GenerationJob {
    pub fn new(
        ticket_key: impl Into<String>,
        description: impl Into<String>,
        components: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            ticket_key: ticket_key.into(),
            description: description.into(),
            components,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
            test_result: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn set_status(&mut self, status: JobStatus, error: Option<String>) {
        self.status = status;
        self.error = error.filter(|message| !message.trim().is_empty());
        self.completed_at = status.is_terminal().then(Utc::now);
        self.touch();
    }

    pub fn complete(&mut self, test_result: String) {
        self.test_result = Some(test_result);
        self.set_status(JobStatus::Completed, None);
    }

    pub fn components_label(&self) -> String {
        if self.components.is_empty() {
            "N/A".to_string()
        } else {
            self.components.join(", ")
        }
    }

    pub fn status_response(&self) -> JobStatusResponse {
        JobStatusResponse {
            status: self.status,
            error: self.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl JobLogEntry {
    pub fn new(level: LogLevel, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: truncate_log_message(message),
        }
    }
}

fn truncate_log_message(message: &str) -> String {
    match message.char_indices().nth(JOB_LOG_MESSAGE_LIMIT) {
        Some((cut, _)) => format!("{}...", &message[..cut]),
        None => message.to_string(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLogsResponse {
    pub job_id: String,
    pub logs: Vec<JobLogEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub test_result: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobStatusResponse {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateJobStatusRequest {
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub jira_ticket: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub components: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraCredentials {
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub api_token: String,
}

#[derive(Debug, Serialize)]
pub struct TestConnectionResponse {
    pub success: bool,
    pub message: String,
}

/// A saved set of Jira credentials. The token never leaves the server.
#[derive(Debug, Clone)]
pub struct JiraConnection {
    pub id: u64,
    pub credentials: JiraCredentials,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JiraProject {
    pub key: String,
    pub name: String,
}

/// An issue flattened into the text the generator works from.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TicketContent {
    pub key: String,
    pub summary: String,
    pub status: Option<String>,
    pub issue_type: Option<String>,
    pub components: Vec<String>,
    pub content: String,
}

pub fn is_valid_ticket_key(value: &str) -> bool {
    TICKET_KEY_RE.is_match(value.trim())
}

/// Splits the comma separated components field of the ticket form.
pub fn parse_components(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|component| !component.is_empty())
        .map(str::to_string)
        .collect()
}
