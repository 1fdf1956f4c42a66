use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use futures::future::{FutureExt, LocalBoxFuture};
use futures::stream::{self, LocalBoxStream, StreamExt};

use crate::http::{FetchError, HttpClient, HttpResponse};
use crate::timer::Timers;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub body: Option<String>,
}

struct Reply {
    delay: Option<Duration>,
    result: Result<HttpResponse, FetchError>,
}

/// Scripted HTTP client: replies are consumed in order, one per request.
#[derive(Clone, Default)]
pub struct FakeHttp {
    replies: Rc<RefCell<VecDeque<Reply>>>,
    requests: Rc<RefCell<Vec<RecordedRequest>>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, response: HttpResponse) {
        self.push(None, Ok(response));
    }

    pub fn reply_after(&self, delay: Duration, response: HttpResponse) {
        self.push(Some(delay), Ok(response));
    }

    pub fn fail(&self, message: &str) {
        self.push(None, Err(FetchError::Transport(message.to_string())));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }

    fn push(&self, delay: Option<Duration>, result: Result<HttpResponse, FetchError>) {
        self.replies.borrow_mut().push_back(Reply { delay, result });
    }

    async fn respond(&self, request: RecordedRequest) -> Result<HttpResponse, FetchError> {
        self.requests.borrow_mut().push(request);
        let reply = self.replies.borrow_mut().pop_front();
        let Some(reply) = reply else {
            return Err(FetchError::Transport("no scripted reply".to_string()));
        };
        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }
        reply.result
    }
}

impl HttpClient for FakeHttp {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        self.respond(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            body: None,
        })
        .await
    }

    async fn post_json(&self, url: &str, body: String) -> Result<HttpResponse, FetchError> {
        self.respond(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            body: Some(body),
        })
        .await
    }
}

/// Tokio-backed timers; pair with `#[tokio::test(start_paused = true)]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimers;

impl Timers for TokioTimers {
    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed_local()
    }

    fn interval(&self, period: Duration) -> LocalBoxStream<'static, ()> {
        let interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        stream::unfold(interval, |mut interval| async move {
            interval.tick().await;
            Some(((), interval))
        })
        .boxed_local()
    }
}
