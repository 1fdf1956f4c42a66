use std::str::FromStr;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::http::{FetchError, HttpClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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

/// Bootstrap contextual colour for a raw status string. Unknown values,
/// including `PENDING` and the empty string, are neutral.
pub fn status_color(status: &str) -> &'static str {
    match status.parse::<JobStatus>() {
        Ok(JobStatus::Completed) => "success",
        Ok(JobStatus::InProgress) => "warning",
        Ok(JobStatus::Failed) => "danger",
        Ok(JobStatus::Pending) | Err(()) => "secondary",
    }
}

pub fn status_url(job_id: &str) -> String {
    format!("/api/jobs/{job_id}/status")
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    #[serde(default)]
    status: Option<String>,
}

/// Reads the status endpoint. The body is decoded whatever the HTTP status,
/// so an error body without `status` yields `Ok(None)`.
pub async fn fetch_status<H>(http: &H, job_id: &str) -> Result<Option<String>, FetchError>
where
    H: HttpClient,
{
    let response = http.get(&status_url(job_id)).await?;
    let payload = response.json::<StatusPayload>()?;
    Ok(payload.status)
}

pub trait StatusBadges {
    /// Returns false when no element carries this job id.
    fn apply(&self, job_id: &str, text: &str, class_name: &str) -> bool;
}

pub async fn update_job_status<H, B>(http: &H, badges: &B, job_id: &str) -> bool
where
    H: HttpClient,
    B: StatusBadges,
{
    match fetch_status(http, job_id).await {
        Ok(status) => {
            let status = status.unwrap_or_default();
            let class_name = format!("badge bg-{}", status_color(&status));
            let applied = badges.apply(job_id, &status, &class_name);
            if !applied {
                debug!(job_id, "no status element on page");
            }
            applied
        }
        Err(err) => {
            warn!(job_id, "status refresh failed: {err}");
            false
        }
    }
}
