use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::jira::JiraClient;
use crate::models::{
    GenerationJob, JiraConnection, JiraCredentials, JobLogEntry, JobStatus, LogLevel,
};
use crate::runner::JobRunner;

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobStore>,
    pub connections: Arc<ConnectionStore>,
    pub jira: JiraClient,
    pub runner: Arc<JobRunner>,
}

/// In-memory registry of generation jobs and their log entries, keyed by job id.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, GenerationJob>>,
    logs: RwLock<HashMap<String, Vec<JobLogEntry>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_job(
        &self,
        ticket_key: &str,
        description: &str,
        components: Vec<String>,
    ) -> GenerationJob {
        let job = GenerationJob::new(ticket_key.trim(), description.trim(), components);
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        self.logs.write().await.insert(job.id.clone(), Vec::new());
        job
    }

    pub async fn get_job(&self, job_id: &str) -> Option<GenerationJob> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Newest first.
    pub async fn list_jobs(&self) -> Vec<GenerationJob> {
        let mut jobs = self.jobs.read().await.values().cloned().collect::<Vec<_>>();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Option<GenerationJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(job_id)?;
        job.set_status(status, error);
        Some(job.clone())
    }

    pub async fn complete(&self, job_id: &str, test_result: String) -> Option<GenerationJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(job_id)?;
        job.complete(test_result);
        Some(job.clone())
    }

    pub async fn fail(&self, job_id: &str, error: String) -> Option<GenerationJob> {
        self.update_status(job_id, JobStatus::Failed, Some(error))
            .await
    }

    pub async fn delete_job(&self, job_id: &str) -> bool {
        self.logs.write().await.remove(job_id);
        self.jobs.write().await.remove(job_id).is_some()
    }

    /// Entries for jobs that no longer exist are dropped.
    pub async fn append_log(&self, job_id: &str, level: LogLevel, message: &str) {
        if let Some(entries) = self.logs.write().await.get_mut(job_id) {
            entries.push(JobLogEntry::new(level, message));
        }
    }

    /// Newest first; `None` when the job is unknown.
    pub async fn list_logs(&self, job_id: &str) -> Option<Vec<JobLogEntry>> {
        let logs = self.logs.read().await;
        let mut entries = logs.get(job_id)?.clone();
        entries.reverse();
        Some(entries)
    }
}

/// Saved Jira connections. Ids are handed out sequentially from 1.
#[derive(Debug, Default)]
pub struct ConnectionStore {
    inner: RwLock<ConnectionTable>,
}

#[derive(Debug, Default)]
struct ConnectionTable {
    next_id: u64,
    connections: HashMap<u64, JiraConnection>,
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save(&self, credentials: JiraCredentials) -> JiraConnection {
        let mut table = self.inner.write().await;
        table.next_id += 1;
        let connection = JiraConnection {
            id: table.next_id,
            credentials: JiraCredentials {
                server_url: credentials.server_url.trim().to_string(),
                username: credentials.username.trim().to_string(),
                api_token: credentials.api_token,
            },
            created_at: Utc::now(),
            last_used_at: None,
        };
        table.connections.insert(connection.id, connection.clone());
        connection
    }

    pub async fn get(&self, id: u64) -> Option<JiraConnection> {
        self.inner.read().await.connections.get(&id).cloned()
    }

    /// Newest first.
    pub async fn list(&self) -> Vec<JiraConnection> {
        let mut connections = self
            .inner
            .read()
            .await
            .connections
            .values()
            .cloned()
            .collect::<Vec<_>>();
        connections.sort_by(|a, b| b.id.cmp(&a.id));
        connections
    }

    pub async fn mark_used(&self, id: u64) {
        if let Some(connection) = self.inner.write().await.connections.get_mut(&id) {
            connection.last_used_at = Some(Utc::now());
        }
    }
}
