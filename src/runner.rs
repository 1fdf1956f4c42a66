use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::models::{GenerationJob, JobStatus, LogLevel};
use crate::state::JobStore;

/// Generator output starting with this prefix marks the job as failed.
const ERROR_PREFIX: &str = "Error:";

#[derive(Debug, Clone)]
pub enum Generator {
    /// Built-in: one Gherkin scenario per line of the ticket text.
    Outline,
    /// External shell command. Ticket text on stdin, tests on stdout.
    Command { cmd: String, timeout: Duration },
}

impl Generator {
    pub fn from_config(cfg: &AppConfig) -> Self {
        if cfg.generator_cmd.is_empty() {
            Self::Outline
        } else {
            Self::Command {
                cmd: cfg.generator_cmd.clone(),
                timeout: cfg.generator_timeout(),
            }
        }
    }

    pub fn describe(&self) -> &str {
        match self {
            Self::Outline => "built-in outline",
            Self::Command { cmd, .. } => cmd,
        }
    }
}

pub struct JobRunner {
    jobs: Arc<JobStore>,
    generator: Generator,
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl JobRunner {
    pub fn new(jobs: Arc<JobStore>, generator: Generator) -> Arc<Self> {
        Arc::new(Self {
            jobs,
            generator,
            handles: Mutex::new(HashMap::new()),
        })
    }

    /// Records a PENDING job and starts generating in the background.
    pub async fn submit(
        self: &Arc<Self>,
        ticket_key: &str,
        description: &str,
        components: Vec<String>,
    ) -> GenerationJob {
        let job = self
            .jobs
            .create_job(ticket_key, description, components)
            .await;
        self.log(&job.id, LogLevel::Info, &format!("Job created with ID {}", job.id))
            .await;
        self.log(
            &job.id,
            LogLevel::Info,
            &format!("Components: {}", job.components_label()),
        )
        .await;
        info!(job_id = %job.id, "created job for {}", job.ticket_key);

        self.start(job.id.clone()).await;
        job
    }

    pub async fn start(self: &Arc<Self>, job_id: String) {
        // Held across the spawn so the task cannot deregister before it is registered.
        let mut handles = self.handles.lock().await;
        let runner = self.clone();
        let task_job_id = job_id.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = runner.execute(&task_job_id).await {
                error!(job_id = %task_job_id, "job execution failed: {err:#}");
            }
            runner.handles.lock().await.remove(&task_job_id);
        });
        handles.insert(job_id, handle);
    }

    /// Stops a running job. Returns false when nothing was running.
    pub async fn abort(&self, job_id: &str) -> bool {
        match self.handles.lock().await.remove(job_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    async fn execute(&self, job_id: &str) -> Result<()> {
        let job = self
            .jobs
            .get_job(job_id)
            .await
            .with_context(|| format!("job {job_id} not found"))?;

        self.log(job_id, LogLevel::Info, &format!("Processing job {job_id}"))
            .await;
        self.jobs
            .update_status(job_id, JobStatus::InProgress, None)
            .await;
        self.log(job_id, LogLevel::Info, "Job status updated to IN_PROGRESS")
            .await;
        info!(
            job_id,
            generator = self.generator.describe(),
            "generating tests for {}",
            job.ticket_key
        );

        match self.generate(&job).await {
            Ok(output) if output.starts_with(ERROR_PREFIX) => self.fail(job_id, output).await,
            Ok(output) => {
                self.log(job_id, LogLevel::Debug, &format!("Generated tests: {output}"))
                    .await;
                self.jobs.complete(job_id, output).await;
                self.log(job_id, LogLevel::Info, "Job completed and saved").await;
                info!(job_id, "job completed");
            }
            Err(err) => self.fail(job_id, format!("Process failed: {err:#}")).await,
        }
        Ok(())
    }

    async fn fail(&self, job_id: &str, message: String) {
        warn!(job_id, "job failed: {message}");
        self.log(job_id, LogLevel::Error, &message).await;
        self.jobs.fail(job_id, message).await;
    }

    async fn log(&self, job_id: &str, level: LogLevel, message: &str) {
        self.jobs.append_log(job_id, level, message).await;
    }

    async fn generate(&self, job: &GenerationJob) -> Result<String> {
        match &self.generator {
            Generator::Outline => outline(job),
            Generator::Command { cmd, timeout } => self.run_command(cmd, *timeout, job).await,
        }
    }

    async fn run_command(
        &self,
        cmd: &str,
        timeout: Duration,
        job: &GenerationJob,
    ) -> Result<String> {
        let mut command = shell(cmd);
        command
            .env("TESTGEN_TICKET", &job.ticket_key)
            .env("TESTGEN_COMPONENTS", job.components.join(","))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn {cmd}"))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A generator that ignores stdin may exit before reading it.
            if let Err(err) = stdin.write_all(job.description.as_bytes()).await {
                warn!(job_id = %job.id, "generator did not take the ticket text: {err}");
            }
        }

        let stderr = child
            .stderr
            .take()
            .context("generator stderr was not captured")?;
        let jobs = self.jobs.clone();
        let job_id = job.id.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    jobs.append_log(&job_id, LogLevel::Warn, line.trim()).await;
                }
            }
        });

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow!("generator timed out after {timeout:?}"))?
            .context("failed waiting for generator")?;
        let _ = stderr_task.await;

        if !output.status.success() {
            bail!("generator exited with {}", output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(unix)]
fn shell(cmd: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(cmd);
    command
}

#[cfg(not(unix))]
fn shell(cmd: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(cmd);
    command
}

fn outline(job: &GenerationJob) -> Result<String> {
    let steps = job
        .description
        .lines()
        .filter_map(scenario_title)
        .collect::<Vec<_>>();
    if steps.is_empty() {
        return Ok(format!(
            "{ERROR_PREFIX} ticket {} has no description to generate tests from",
            job.ticket_key
        ));
    }

    let mut out = format!("Feature: {}\n", job.ticket_key);
    if !job.components.is_empty() {
        out.push_str(&format!("  # Components: {}\n", job.components.join(", ")));
    }
    for (index, step) in steps.iter().enumerate() {
        out.push_str(&format!(
            "\n  Scenario: {n}. {step}\n    Given the changes for {key} are deployed\n    When the user checks that {step}\n    Then the behaviour matches the ticket\n",
            n = index + 1,
            key = job.ticket_key,
        ));
    }
    Ok(out.trim_end().to_string())
}

fn scenario_title(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.starts_with("Status:") || line.starts_with("Type:") {
        return None;
    }
    let line = ["Summary:", "Description:"]
        .iter()
        .find_map(|label| line.strip_prefix(label))
        .unwrap_or(line);
    let line = line.trim().trim_start_matches(['-', '*']).trim();
    (!line.is_empty()).then_some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobLogEntry;

    async fn wait_for_terminal(jobs: &JobStore, job_id: &str) -> GenerationJob {
        for _ in 0..500 {
            let job = jobs.get_job(job_id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never finished");
    }

    fn messages(logs: &[JobLogEntry]) -> Vec<&str> {
        logs.iter().map(|entry| entry.message.as_str()).collect()
    }

    fn build_runner(generator: Generator) -> (Arc<JobStore>, Arc<JobRunner>) {
        let jobs = Arc::new(JobStore::new());
        (jobs.clone(), JobRunner::new(jobs, generator))
    }

    #[cfg(unix)]
    fn command(cmd: &str, timeout: Duration) -> Generator {
        Generator::Command {
            cmd: cmd.to_string(),
            timeout,
        }
    }

    #[test]
    fn outline_writes_one_scenario_per_line() {
        let job = GenerationJob::new(
            "PROJ-7",
            "Summary: Login with SSO\n\nDescription: - user sees the dashboard\nStatus: To Do\nType: Story\n",
            vec!["auth".to_string()],
        );
        let out = outline(&job).unwrap();
        assert!(out.starts_with("Feature: PROJ-7\n  # Components: auth\n"));
        assert!(out.contains("Scenario: 1. Login with SSO"));
        assert!(out.contains("Scenario: 2. user sees the dashboard"));
        assert!(!out.contains("To Do"));
    }

    #[tokio::test]
    async fn outline_job_runs_to_completion_with_logs() {
        let (jobs, runner) = build_runner(Generator::Outline);
        let job = runner
            .submit("PROJ-1", "Login works", vec!["auth".to_string()])
            .await;

        let done = wait_for_terminal(&jobs, &job.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.completed_at.is_some());
        assert!(done.test_result.unwrap().contains("Scenario: 1. Login works"));

        let logs = jobs.list_logs(&job.id).await.unwrap();
        let messages = messages(&logs);
        assert_eq!(messages.first(), Some(&"Job completed and saved"));
        assert!(messages.contains(&"Job status updated to IN_PROGRESS"));
        assert!(messages.contains(&"Components: auth"));
        assert_eq!(
            messages.last().copied(),
            Some(format!("Job created with ID {}", job.id).as_str())
        );
    }

    #[tokio::test]
    async fn empty_description_fails_the_job() {
        let (jobs, runner) = build_runner(Generator::Outline);
        let job = runner.submit("PROJ-2", "  ", Vec::new()).await;

        let done = wait_for_terminal(&jobs, &job.id).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(
            done.error.as_deref(),
            Some("Error: ticket PROJ-2 has no description to generate tests from")
        );
        assert!(done.test_result.is_none());

        let logs = jobs.list_logs(&job.id).await.unwrap();
        assert_eq!(logs[0].level, LogLevel::Error);
        assert!(messages(&logs).contains(&"Components: N/A"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_reads_ticket_from_stdin_and_logs_stderr() {
        let (jobs, runner) = build_runner(command(
            "echo \"$TESTGEN_TICKET [$TESTGEN_COMPONENTS]\" >&2; cat",
            Duration::from_secs(10),
        ));
        let job = runner
            .submit(
                "PROJ-3",
                "Scenario: typed by hand",
                vec!["api".to_string(), "ui".to_string()],
            )
            .await;

        let done = wait_for_terminal(&jobs, &job.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.test_result.as_deref(), Some("Scenario: typed by hand"));

        let logs = jobs.list_logs(&job.id).await.unwrap();
        assert!(
            logs.iter()
                .any(|entry| entry.level == LogLevel::Warn && entry.message == "PROJ-3 [api,ui]")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn error_output_and_exit_codes_fail_the_job() {
        let (jobs, runner) = build_runner(command(
            "echo 'Error: model unavailable'",
            Duration::from_secs(10),
        ));
        let job = runner.submit("PROJ-4", "text", Vec::new()).await;
        let done = wait_for_terminal(&jobs, &job.id).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("Error: model unavailable"));

        let (jobs, runner) = build_runner(command("exit 3", Duration::from_secs(10)));
        let job = runner.submit("PROJ-5", "text", Vec::new()).await;
        let done = wait_for_terminal(&jobs, &job.id).await;
        assert_eq!(done.status, JobStatus::Failed);
        let error = done.error.unwrap();
        assert!(error.starts_with("Process failed: generator exited with"), "{error}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_generator_is_in_progress_then_times_out() {
        let (jobs, runner) = build_runner(command("sleep 5", Duration::from_millis(300)));
        let job = runner.submit("PROJ-6", "text", Vec::new()).await;

        let mut seen = JobStatus::Pending;
        for _ in 0..100 {
            seen = jobs.get_job(&job.id).await.unwrap().status;
            if seen != JobStatus::Pending {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(seen, JobStatus::InProgress);

        let done = wait_for_terminal(&jobs, &job.id).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(
            done.error.as_deref(),
            Some("Process failed: generator timed out after 300ms")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn abort_stops_a_running_job() {
        let (jobs, runner) = build_runner(command("sleep 5", Duration::from_secs(10)));
        let job = runner.submit("PROJ-8", "text", Vec::new()).await;

        assert!(runner.abort(&job.id).await);
        assert!(!runner.abort(&job.id).await);
        let status = jobs.get_job(&job.id).await.unwrap().status;
        assert!(!status.is_terminal());
    }

    #[test]
    fn generator_follows_config() {
        let mut cfg = AppConfig::default();
        assert!(matches!(Generator::from_config(&cfg), Generator::Outline));

        cfg.generator_cmd = "gen-tests".to_string();
        cfg.generator_timeout_seconds = 42;
        match Generator::from_config(&cfg) {
            Generator::Command { cmd, timeout } => {
                assert_eq!(cmd, "gen-tests");
                assert_eq!(timeout, Duration::from_secs(42));
            }
            other => panic!("unexpected generator {other:?}"),
        }
    }
}
