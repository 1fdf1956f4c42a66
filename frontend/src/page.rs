use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::timer::Timers;

pub const CONFIRM_MESSAGE: &str = "Are you sure you want to proceed?";
pub const TICKET_FORMAT_MESSAGE: &str = "Jira ticket format must be PROJ-123";
pub const EXAMPLE_TITLE: &str = "Click to use this example";

pub const NOTIFICATION_DISMISS_DELAY: Duration = Duration::from_millis(5000);
pub const NOTIFICATION_FADE: Duration = Duration::from_millis(300);

pub const TICKET_FORM_SELECTOR: &str = r#"form[action*="/ticket/submit"]"#;
pub const JQL_EXAMPLE_SELECTOR: &str = ".card-body code";
pub const TABLE_WRAPPER_CLASS: &str = "table-wrapper";

static TICKET_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]+-\d+$").unwrap_or_else(|err| panic!("ticket key pattern: {err}"))
});

pub fn ticket_validity(value: &str) -> &'static str {
    let value = value.trim();
    if value.is_empty() || TICKET_KEY.is_match(value) {
        ""
    } else {
        TICKET_FORMAT_MESSAGE
    }
}

pub trait QueryInput {
    fn set_value(&self, value: &str);
    fn focus(&self);
}

pub fn apply_jql_example<Q: QueryInput>(input: &Q, example: &str) {
    input.set_value(example.trim());
    input.focus();
}

/// Only success and error alerts dismiss themselves.
pub fn is_dismissible(class_name: &str) -> bool {
    class_name
        .split_whitespace()
        .any(|class| class == "alert-success" || class == "alert-danger")
}

pub trait Notification {
    fn fade_out(&self);
    fn remove(&self);
}

pub async fn dismiss_notification<T, N>(timers: &T, notification: N)
where
    T: Timers,
    N: Notification,
{
    timers.sleep(NOTIFICATION_DISMISS_DELAY).await;
    notification.fade_out();
    timers.sleep(NOTIFICATION_FADE).await;
    notification.remove();
}
