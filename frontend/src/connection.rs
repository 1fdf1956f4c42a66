use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::http::{FetchError, HttpClient};
use crate::timer::Timers;

pub const TEST_CONNECTION_URL: &str = "/jira/api/test-connection";
pub const SUCCESS_DISMISS_DELAY: Duration = Duration::from_millis(3000);

pub const BUSY_LABEL: &str = "Testing connection...";
pub const SUCCESS_MESSAGE: &str = "Connection successful!";
pub const MISSING_FIELDS_MESSAGE: &str = "Fill in all fields before testing the connection";
pub const CONNECT_FALLBACK_MESSAGE: &str = "Error while connecting to Jira";
pub const TRANSPORT_FALLBACK_MESSAGE: &str = "Error while testing the connection";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCredentials {
    pub server_url: String,
    pub username: String,
    pub api_token: String,
}

impl ConnectionCredentials {
    pub fn is_complete(&self) -> bool {
        !self.server_url.is_empty() && !self.username.is_empty() && !self.api_token.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct TestResult {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("{}", MISSING_FIELDS_MESSAGE)]
    MissingFields,
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Transport(String),
}

impl From<FetchError> for ConnectionError {
    fn from(err: FetchError) -> Self {
        Self::Transport(or_fallback(Some(err.to_string()), TRANSPORT_FALLBACK_MESSAGE))
    }
}

pub trait ConnectionView {
    type Alert;

    fn credentials(&self) -> ConnectionCredentials;

    fn trigger_label(&self) -> String;

    fn set_trigger(&self, enabled: bool, label: &str);

    fn hide_error(&self);

    fn show_error(&self, message: &str);

    fn show_success(&self, message: &str) -> Self::Alert;

    fn remove_alert(&self, alert: Self::Alert);
}

pub struct ConnectionTester<V, H, T> {
    view: V,
    http: H,
    timers: T,
    idle_label: String,
}

impl<V, H, T> ConnectionTester<V, H, T>
where
    V: ConnectionView,
    H: HttpClient,
    T: Timers,
{
    pub fn new(view: V, http: H, timers: T) -> Self {
        let idle_label = view.trigger_label();
        Self {
            view,
            http,
            timers,
            idle_label,
        }
    }

    pub async fn run_attempt(&self) -> Result<(), ConnectionError> {
        self.view.hide_error();

        let credentials = self.view.credentials();
        if !credentials.is_complete() {
            let err = ConnectionError::MissingFields;
            self.view.show_error(&err.to_string());
            return Err(err);
        }

        let outcome = {
            let _busy = BusyTrigger::engage(&self.view, &self.idle_label);
            self.submit(&credentials).await
        };

        match outcome {
            Ok(()) => {
                debug!(server_url = %credentials.server_url, "jira connection test passed");
                self.view.hide_error();
                let alert = self.view.show_success(SUCCESS_MESSAGE);
                self.timers.sleep(SUCCESS_DISMISS_DELAY).await;
                self.view.remove_alert(alert);
                Ok(())
            }
            Err(err) => {
                warn!(server_url = %credentials.server_url, "jira connection test failed: {err}");
                self.view.show_error(&err.to_string());
                Err(err)
            }
        }
    }

    async fn submit(&self, credentials: &ConnectionCredentials) -> Result<(), ConnectionError> {
        let body = serde_json::to_string(credentials)
            .map_err(|err| FetchError::Decode(err.to_string()))?;
        let response = self.http.post_json(TEST_CONNECTION_URL, body).await?;

        if !response.ok() {
            let message = response
                .json::<TestResult>()
                .ok()
                .and_then(|result| result.message);
            return Err(ConnectionError::Http {
                status: response.status,
                message: or_fallback(message, CONNECT_FALLBACK_MESSAGE),
            });
        }

        let result = response.json::<TestResult>()?;
        if result.success {
            Ok(())
        } else {
            Err(ConnectionError::Rejected(or_fallback(
                result.message,
                CONNECT_FALLBACK_MESSAGE,
            )))
        }
    }
}

// Restores the idle label on drop, even when the attempt is dropped mid-request.
struct BusyTrigger<'a, V: ConnectionView> {
    view: &'a V,
    idle_label: &'a str,
}

impl<'a, V: ConnectionView> BusyTrigger<'a, V> {
    fn engage(view: &'a V, idle_label: &'a str) -> Self {
        view.set_trigger(false, BUSY_LABEL);
        Self { view, idle_label }
    }
}

impl<V: ConnectionView> Drop for BusyTrigger<'_, V> {
    fn drop(&mut self) {
        self.view.set_trigger(true, self.idle_label);
    }
}

fn or_fallback(message: Option<String>, fallback: &str) -> String {
    message
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use tokio::time::Instant;

    use super::*;
    use crate::http::HttpResponse;
    use crate::testing::{FakeHttp, TokioTimers};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum ViewEvent {
        HideError,
        ShowError(String),
        Trigger(bool, String),
        ShowSuccess(u32),
        RemoveAlert(u32),
    }

    #[derive(Default)]
    struct ViewState {
        credentials: Option<ConnectionCredentials>,
        label: String,
        enabled: bool,
        error: Option<String>,
        alerts: Vec<(u32, String)>,
        next_alert: u32,
        events: Vec<ViewEvent>,
    }

    #[derive(Clone)]
    struct FakeView(Rc<RefCell<ViewState>>);

    impl FakeView {
        fn with(server_url: &str, username: &str, api_token: &str) -> Self {
            Self(Rc::new(RefCell::new(ViewState {
                credentials: Some(ConnectionCredentials {
                    server_url: server_url.to_string(),
                    username: username.to_string(),
                    api_token: api_token.to_string(),
                }),
                label: "Test connection".to_string(),
                enabled: true,
                ..ViewState::default()
            })))
        }

        fn filled() -> Self {
            Self::with("https://acme.atlassian.net", "qa@acme.io", "t0k")
        }

        fn error(&self) -> Option<String> {
            self.0.borrow().error.clone()
        }

        fn alerts(&self) -> Vec<String> {
            self.0
                .borrow()
                .alerts
                .iter()
                .map(|(_, text)| text.clone())
                .collect()
        }

        fn events(&self) -> Vec<ViewEvent> {
            self.0.borrow().events.clone()
        }

        fn trigger(&self) -> (bool, String) {
            let state = self.0.borrow();
            (state.enabled, state.label.clone())
        }
    }

    impl ConnectionView for FakeView {
        type Alert = u32;

        fn credentials(&self) -> ConnectionCredentials {
            self.0.borrow().credentials.clone().unwrap_or(ConnectionCredentials {
                server_url: String::new(),
                username: String::new(),
                api_token: String::new(),
            })
        }

        fn trigger_label(&self) -> String {
            self.0.borrow().label.clone()
        }

        fn set_trigger(&self, enabled: bool, label: &str) {
            let mut state = self.0.borrow_mut();
            state.enabled = enabled;
            state.label = label.to_string();
            state.events.push(ViewEvent::Trigger(enabled, label.to_string()));
        }

        fn hide_error(&self) {
            let mut state = self.0.borrow_mut();
            state.error = None;
            state.events.push(ViewEvent::HideError);
        }

        fn show_error(&self, message: &str) {
            let mut state = self.0.borrow_mut();
            state.error = Some(message.to_string());
            state.events.push(ViewEvent::ShowError(message.to_string()));
        }

        fn show_success(&self, message: &str) -> u32 {
            let mut state = self.0.borrow_mut();
            let id = state.next_alert;
            state.next_alert += 1;
            state.alerts.push((id, message.to_string()));
            state.events.push(ViewEvent::ShowSuccess(id));
            id
        }

        fn remove_alert(&self, alert: u32) {
            let mut state = self.0.borrow_mut();
            state.alerts.retain(|(id, _)| *id != alert);
            state.events.push(ViewEvent::RemoveAlert(alert));
        }
    }

    fn tester(view: &FakeView, http: &FakeHttp) -> ConnectionTester<FakeView, FakeHttp, TokioTimers> {
        ConnectionTester::new(view.clone(), http.clone(), TokioTimers)
    }

    fn idle() -> (bool, String) {
        (true, "Test connection".to_string())
    }

    #[tokio::test]
    async fn any_empty_field_blocks_the_request() {
        for mask in 0u8..7 {
            let field = |bit: u8, value: &str| {
                if mask & bit != 0 { value.to_string() } else { String::new() }
            };
            let view = FakeView::with(
                &field(1, "https://acme.atlassian.net"),
                &field(2, "qa@acme.io"),
                &field(4, "t0k"),
            );
            let http = FakeHttp::new();

            let err = tester(&view, &http).run_attempt().await.unwrap_err();

            assert_eq!(err, ConnectionError::MissingFields);
            assert!(http.requests().is_empty(), "mask {mask} issued a request");
            assert_eq!(view.error().as_deref(), Some(MISSING_FIELDS_MESSAGE));
            assert_eq!(view.trigger(), idle());
            assert!(
                !view
                    .events()
                    .iter()
                    .any(|event| matches!(event, ViewEvent::Trigger(..)))
            );
        }
    }

    #[tokio::test]
    async fn posts_credentials_as_camel_case_json() {
        let view = FakeView::filled();
        let http = FakeHttp::new();
        http.reply(HttpResponse::new(400, r#"{"success":false,"message":"nope"}"#));

        let _ = tester(&view, &http).run_attempt().await;

        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].url, TEST_CONNECTION_URL);
        let body: serde_json::Value =
            serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "serverUrl": "https://acme.atlassian.net",
                "username": "qa@acme.io",
                "apiToken": "t0k",
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn success_alert_is_removed_after_exactly_three_seconds() {
        let view = FakeView::filled();
        view.show_error("stale error");
        let http = FakeHttp::new();
        http.reply(HttpResponse::new(200, r#"{"success":true}"#));
        let tester = tester(&view, &http);

        let started = Instant::now();
        let attempt = tester.run_attempt();
        tokio::pin!(attempt);

        tokio::select! {
            biased;
            _ = &mut attempt => panic!("alert dismissed too early"),
            _ = tokio::time::sleep(Duration::from_millis(2999)) => {}
        }
        assert_eq!(view.alerts(), vec![SUCCESS_MESSAGE.to_string()]);
        assert_eq!(view.error(), None);
        assert_eq!(view.trigger(), idle());

        attempt.await.unwrap();
        assert!(started.elapsed() >= SUCCESS_DISMISS_DELAY);
        assert!(started.elapsed() < SUCCESS_DISMISS_DELAY + Duration::from_millis(1));
        assert!(view.alerts().is_empty());

        let events = view.events();
        let attempt_events = &events[1..];
        assert_eq!(attempt_events[0], ViewEvent::HideError);
        assert_eq!(
            attempt_events[1],
            ViewEvent::Trigger(false, BUSY_LABEL.to_string())
        );
        assert_eq!(
            attempt_events.last(),
            Some(&ViewEvent::RemoveAlert(0))
        );
    }

    #[tokio::test]
    async fn application_failure_shows_server_message() {
        let view = FakeView::filled();
        let http = FakeHttp::new();
        http.reply(HttpResponse::new(200, r#"{"success":false,"message":"bad token"}"#));

        let err = tester(&view, &http).run_attempt().await.unwrap_err();

        assert_eq!(err, ConnectionError::Rejected("bad token".to_string()));
        assert_eq!(view.error().as_deref(), Some("bad token"));
        assert!(view.alerts().is_empty());
        assert_eq!(view.trigger(), idle());
    }

    #[tokio::test]
    async fn application_failure_without_message_uses_fallback() {
        let view = FakeView::filled();
        let http = FakeHttp::new();
        http.reply(HttpResponse::new(200, r#"{"success":false,"message":""}"#));

        tester(&view, &http).run_attempt().await.unwrap_err();

        assert_eq!(view.error().as_deref(), Some(CONNECT_FALLBACK_MESSAGE));
    }

    #[tokio::test]
    async fn http_error_shows_body_message() {
        let view = FakeView::filled();
        let http = FakeHttp::new();
        http.reply(HttpResponse::new(503, r#"{"message":"server down"}"#));

        let err = tester(&view, &http).run_attempt().await.unwrap_err();

        assert_eq!(
            err,
            ConnectionError::Http {
                status: 503,
                message: "server down".to_string(),
            }
        );
        assert_eq!(view.error().as_deref(), Some("server down"));
        assert_eq!(view.trigger(), idle());
    }

    #[tokio::test]
    async fn http_error_without_usable_body_uses_fallback() {
        for body in ["{}", "<h1>Bad Gateway</h1>", ""] {
            let view = FakeView::filled();
            let http = FakeHttp::new();
            http.reply(HttpResponse::new(502, body));

            tester(&view, &http).run_attempt().await.unwrap_err();

            assert_eq!(view.error().as_deref(), Some(CONNECT_FALLBACK_MESSAGE));
        }
    }

    #[tokio::test]
    async fn transport_failure_shows_error_text_and_restores_trigger() {
        let view = FakeView::filled();
        let http = FakeHttp::new();
        http.fail("Failed to fetch");

        let err = tester(&view, &http).run_attempt().await.unwrap_err();

        assert_eq!(err, ConnectionError::Transport("Failed to fetch".to_string()));
        assert_eq!(view.error().as_deref(), Some("Failed to fetch"));
        assert_eq!(view.trigger(), idle());
    }

    #[tokio::test]
    async fn transport_failure_without_text_uses_fallback() {
        let view = FakeView::filled();
        let http = FakeHttp::new();
        http.fail("");

        tester(&view, &http).run_attempt().await.unwrap_err();

        assert_eq!(view.error().as_deref(), Some(TRANSPORT_FALLBACK_MESSAGE));
    }

    #[tokio::test]
    async fn undecodable_success_body_is_a_transport_failure() {
        let view = FakeView::filled();
        let http = FakeHttp::new();
        http.reply(HttpResponse::new(200, "not json"));

        let err = tester(&view, &http).run_attempt().await.unwrap_err();

        assert!(matches!(err, ConnectionError::Transport(_)));
        assert_eq!(view.trigger(), idle());
    }

    #[tokio::test]
    async fn trigger_is_disabled_only_while_request_is_outstanding() {
        let view = FakeView::filled();
        let http = FakeHttp::new();
        http.reply(HttpResponse::new(400, r#"{"message":"nope"}"#));

        tester(&view, &http).run_attempt().await.unwrap_err();

        let triggers = view
            .events()
            .into_iter()
            .filter(|event| matches!(event, ViewEvent::Trigger(..)))
            .collect::<Vec<_>>();
        assert_eq!(
            triggers,
            vec![
                ViewEvent::Trigger(false, BUSY_LABEL.to_string()),
                ViewEvent::Trigger(true, "Test connection".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_an_attempt_mid_request_restores_trigger() {
        let view = FakeView::filled();
        let http = FakeHttp::new();
        http.reply_after(
            Duration::from_secs(10),
            HttpResponse::new(200, r#"{"success":true}"#),
        );
        let tester = tester(&view, &http);
        let mut attempt = Box::pin(tester.run_attempt());

        tokio::select! {
            _ = &mut attempt => panic!("request should still be pending"),
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
        assert_eq!(view.trigger(), (false, BUSY_LABEL.to_string()));

        drop(attempt);
        assert_eq!(view.trigger(), idle());
    }
}
