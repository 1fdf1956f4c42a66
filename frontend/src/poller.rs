use std::time::Duration;

use futures::future::{AbortHandle, Abortable, FutureExt, LocalBoxFuture};
use futures::stream::{FuturesUnordered, LocalBoxStream, StreamExt};
use tracing::{debug, info, warn};

use crate::http::HttpClient;
use crate::status::{JobStatus, fetch_status};
use crate::timer::Timers;

pub const POLL_INTERVAL: Duration = Duration::from_millis(30_000);

pub trait PageControl {
    fn reload(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    KeepPolling,
    Reload,
}

impl PollDecision {
    pub fn for_status(status: Option<&str>) -> Self {
        match status {
            Some(status) if status == JobStatus::InProgress.as_str() => Self::KeepPolling,
            _ => Self::Reload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    Reloaded,
    TicksExhausted,
}

pub type PollTask = Abortable<LocalBoxFuture<'static, PollExit>>;

/// Stops a started poller. Dropping the handle does not cancel.
#[derive(Debug, Clone)]
pub struct PollHandle {
    abort: AbortHandle,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.abort.abort();
    }

    #[cfg(test)]
    pub fn is_cancelled(&self) -> bool {
        self.abort.is_aborted()
    }
}

pub struct JobStatusPoller<H, P> {
    job_id: String,
    http: H,
    page: P,
}

impl<H, P> JobStatusPoller<H, P>
where
    H: HttpClient,
    P: PageControl,
{
    pub fn activate(
        current_status: Option<&str>,
        job_id: Option<&str>,
        http: H,
        page: P,
    ) -> Option<Self> {
        if current_status != Some(JobStatus::InProgress.as_str()) {
            return None;
        }
        let job_id = job_id.filter(|id| !id.is_empty())?;
        Some(Self {
            job_id: job_id.to_string(),
            http,
            page,
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn check(&self) -> PollDecision {
        match fetch_status(&self.http, &self.job_id).await {
            Ok(status) => {
                debug!(job_id = %self.job_id, ?status, "polled job status");
                PollDecision::for_status(status.as_deref())
            }
            Err(err) => {
                warn!(job_id = %self.job_id, "job status poll failed: {err}");
                PollDecision::KeepPolling
            }
        }
    }

    pub async fn run(&self, ticks: LocalBoxStream<'static, ()>) -> PollExit {
        let mut ticks = ticks.fuse();
        let mut in_flight = FuturesUnordered::new();

        loop {
            futures::select! {
                tick = ticks.next() => {
                    if tick.is_some() {
                        in_flight.push(self.check());
                    }
                }
                decision = in_flight.select_next_some() => {
                    if decision == PollDecision::Reload {
                        info!(job_id = %self.job_id, "job left IN_PROGRESS, reloading");
                        self.page.reload();
                        return PollExit::Reloaded;
                    }
                }
                complete => return PollExit::TicksExhausted,
            }
        }
    }
}

impl<H, P> JobStatusPoller<H, P>
where
    H: HttpClient + 'static,
    P: PageControl + 'static,
{
    pub fn start<T: Timers>(self, timers: &T) -> (PollTask, PollHandle) {
        let ticks = timers.interval(POLL_INTERVAL);
        let run = async move { self.run(ticks).await }.boxed_local();
        let (abort, registration) = AbortHandle::new_pair();
        (Abortable::new(run, registration), PollHandle { abort })
    }
}
