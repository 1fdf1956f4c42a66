use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use futures::future::{FutureExt, LocalBoxFuture};
use futures::stream::{LocalBoxStream, StreamExt};
use gloo_net::http::{Request, Response};
use gloo_timers::future::IntervalStream;
use tracing::{debug, error, info, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::wasm_bindgen;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Document, Element, HtmlButtonElement, HtmlElement, HtmlInputElement, NodeList};

use crate::connection::{ConnectionCredentials, ConnectionTester, ConnectionView};
use crate::http::{FetchError, HttpClient, HttpResponse};
use crate::logging;
use crate::page::{
    self, CONFIRM_MESSAGE, EXAMPLE_TITLE, JQL_EXAMPLE_SELECTOR, Notification, QueryInput,
    TABLE_WRAPPER_CLASS, TICKET_FORM_SELECTOR,
};
use crate::poller::{JobStatusPoller, PageControl, PollExit, PollHandle};
use crate::status::{self, StatusBadges};
use crate::timer::Timers;

thread_local! {
    static POLL_HANDLE: RefCell<Option<PollHandle>> = const { RefCell::new(None) };
}

fn web_document() -> Option<Document> {
    web_sys::window().and_then(|window| window.document())
}

fn elements(list: NodeList) -> Vec<Element> {
    (0..list.length())
        .filter_map(|index| list.item(index))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .collect()
}

fn input_by_id(document: &Document, id: &str) -> Option<HtmlInputElement> {
    document
        .get_element_by_id(id)
        .and_then(|element| element.dyn_into::<HtmlInputElement>().ok())
}

#[derive(Debug, Clone, Copy, Default)]
struct GlooHttp;

fn transport_error(err: gloo_net::Error) -> FetchError {
    FetchError::Transport(err.to_string())
}

async fn read_response(response: Response) -> Result<HttpResponse, FetchError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| FetchError::Decode(err.to_string()))?;
    Ok(HttpResponse::new(status, body))
}

impl HttpClient for GlooHttp {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let response = Request::get(url).send().await.map_err(transport_error)?;
        read_response(response).await
    }

    async fn post_json(&self, url: &str, body: String) -> Result<HttpResponse, FetchError> {
        let request = Request::post(url)
            .header("Content-Type", "application/json")
            .body(body)
            .map_err(transport_error)?;
        let response = request.send().await.map_err(transport_error)?;
        read_response(response).await
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BrowserTimers;

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

impl Timers for BrowserTimers {
    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        gloo_timers::future::sleep(duration).boxed_local()
    }

    fn interval(&self, period: Duration) -> LocalBoxStream<'static, ()> {
        IntervalStream::new(millis(period)).boxed_local()
    }
}

struct DomConnectionView {
    document: Document,
    button: HtmlButtonElement,
    error: HtmlElement,
}

impl DomConnectionView {
    /// Appends the hidden error container to the button's form.
    fn attach(document: Document, button: HtmlButtonElement) -> Option<Self> {
        let form = button.closest("form").ok().flatten()?;
        let error = document
            .create_element("div")
            .ok()?
            .dyn_into::<HtmlElement>()
            .ok()?;
        error.set_class_name("alert alert-danger mt-3 d-none");
        form.append_child(&error).ok()?;
        Some(Self {
            document,
            button,
            error,
        })
    }

    fn field(&self, id: &str) -> String {
        input_by_id(&self.document, id)
            .map(|input| input.value())
            .unwrap_or_default()
    }
}

impl ConnectionView for DomConnectionView {
    type Alert = Option<Element>;

    fn credentials(&self) -> ConnectionCredentials {
        ConnectionCredentials {
            server_url: self.field("serverUrl"),
            username: self.field("username"),
            api_token: self.field("apiToken"),
        }
    }

    fn trigger_label(&self) -> String {
        self.button.text_content().unwrap_or_default()
    }

    fn set_trigger(&self, enabled: bool, label: &str) {
        self.button.set_disabled(!enabled);
        self.button.set_text_content(Some(label));
    }

    fn hide_error(&self) {
        let _ = self.error.class_list().add_1("d-none");
    }

    fn show_error(&self, message: &str) {
        self.error.set_text_content(Some(message));
        let _ = self.error.class_list().remove_1("d-none");
    }

    fn show_success(&self, message: &str) -> Option<Element> {
        let alert = self.document.create_element("div").ok()?;
        alert.set_class_name("alert alert-success mt-3");
        alert.set_text_content(Some(message));
        let parent = self.error.parent_node()?;
        parent.insert_before(&alert, Some(self.error.as_ref())).ok()?;
        Some(alert)
    }

    fn remove_alert(&self, alert: Option<Element>) {
        if let Some(alert) = alert {
            alert.remove();
        }
    }
}

struct LocationReload;

impl PageControl for LocationReload {
    fn reload(&self) {
        let Some(window) = web_sys::window() else {
            return;
        };
        if let Err(err) = window.location().reload() {
            warn!("page reload failed: {err:?}");
        }
    }
}

struct DomBadges;

impl StatusBadges for DomBadges {
    fn apply(&self, job_id: &str, text: &str, class_name: &str) -> bool {
        let Some(document) = web_document() else {
            return false;
        };
        let selector = format!(r#"[data-job-id="{job_id}"]"#);
        let Ok(Some(element)) = document.query_selector(&selector) else {
            return false;
        };
        element.set_text_content(Some(text));
        element.set_class_name(class_name);
        true
    }
}

struct DomNotification(HtmlElement);

impl Notification for DomNotification {
    fn fade_out(&self) {
        let _ = self.0.style().set_property("opacity", "0");
    }

    fn remove(&self) {
        self.0.remove();
    }
}

impl QueryInput for HtmlInputElement {
    fn set_value(&self, value: &str) {
        HtmlInputElement::set_value(self, value);
    }

    fn focus(&self) {
        let _ = HtmlElement::focus(self);
    }
}

fn install_error_listener() {
    let Some(window) = web_sys::window() else {
        return;
    };
    let callback = Closure::<dyn FnMut(web_sys::Event)>::new(|event: web_sys::Event| {
        match event.dyn_ref::<web_sys::ErrorEvent>() {
            Some(event) => error!("uncaught page error: {}", event.message()),
            None => error!("uncaught page error: {}", event.type_()),
        }
    });
    let _ = window.add_event_listener_with_callback("error", callback.as_ref().unchecked_ref());
    callback.forget();
}

fn confirm_form_submissions(document: &Document) {
    let Ok(forms) = document.query_selector_all("form") else {
        return;
    };
    for form in elements(forms) {
        let callback = Closure::<dyn FnMut(web_sys::Event)>::new(move |event: web_sys::Event| {
            let confirmed = web_sys::window()
                .and_then(|window| window.confirm_with_message(CONFIRM_MESSAGE).ok())
                .unwrap_or(false);
            if !confirmed {
                event.prevent_default();
            }
        });
        let _ = form.add_event_listener_with_callback("submit", callback.as_ref().unchecked_ref());
        callback.forget();
    }
}

fn validate_ticket_field(document: &Document) {
    let Some(input) = document
        .query_selector(TICKET_FORM_SELECTOR)
        .ok()
        .flatten()
        .and_then(|form| form.query_selector("#jiraTicket").ok().flatten())
        .and_then(|element| element.dyn_into::<HtmlInputElement>().ok())
    else {
        return;
    };

    let input_ref = input.clone();
    let callback = Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
        input_ref.set_custom_validity(page::ticket_validity(&input_ref.value()));
    });
    let _ = input.add_event_listener_with_callback("input", callback.as_ref().unchecked_ref());
    callback.forget();
}

fn auto_dismiss_notifications(document: &Document) {
    let Ok(alerts) = document.query_selector_all(".alert") else {
        return;
    };
    for alert in elements(alerts) {
        if !page::is_dismissible(&alert.class_name()) {
            continue;
        }
        let Ok(alert) = alert.dyn_into::<HtmlElement>() else {
            continue;
        };
        spawn_local(async move {
            page::dismiss_notification(&BrowserTimers, DomNotification(alert)).await;
        });
    }
}

fn wrap_responsive_tables(document: &Document) {
    let Ok(tables) = document.query_selector_all(".table-responsive") else {
        return;
    };
    for table in elements(tables) {
        let Some(parent) = table.parent_node() else {
            continue;
        };
        let Ok(wrapper) = document.create_element("div") else {
            continue;
        };
        wrapper.set_class_name(TABLE_WRAPPER_CLASS);
        if parent.insert_before(&wrapper, Some(table.as_ref())).is_ok() {
            let _ = wrapper.append_child(&table);
        }
    }
}

fn init_connection_tester(document: &Document) {
    let Some(button) = document
        .get_element_by_id("testConnection")
        .and_then(|element| element.dyn_into::<HtmlButtonElement>().ok())
    else {
        return;
    };
    let Some(view) = DomConnectionView::attach(document.clone(), button.clone()) else {
        warn!("connection test button is not inside a form");
        return;
    };

    let tester = Rc::new(ConnectionTester::new(view, GlooHttp, BrowserTimers));
    let callback = Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
        let tester = tester.clone();
        spawn_local(async move {
            let _ = tester.run_attempt().await;
        });
    });
    let _ = button.add_event_listener_with_callback("click", callback.as_ref().unchecked_ref());
    callback.forget();
}

fn init_jql_examples(document: &Document) {
    let Some(input) = input_by_id(document, "jql") else {
        return;
    };
    let Ok(examples) = document.query_selector_all(JQL_EXAMPLE_SELECTOR) else {
        return;
    };

    for example in elements(examples) {
        let Ok(example) = example.dyn_into::<HtmlElement>() else {
            continue;
        };
        let _ = example.style().set_property("cursor", "pointer");
        example.set_title(EXAMPLE_TITLE);

        let input = input.clone();
        let example_ref = example.clone();
        let callback = Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
            let text = example_ref.text_content().unwrap_or_default();
            page::apply_jql_example(&input, &text);
        });
        let _ = example.add_event_listener_with_callback("click", callback.as_ref().unchecked_ref());
        callback.forget();
    }
}

fn init_status_poller(document: &Document) {
    let Ok(Some(element)) = document.query_selector(".job-status") else {
        return;
    };
    let status = element.get_attribute("data-status");
    let job_id = element.get_attribute("data-job-id");
    let Some(poller) =
        JobStatusPoller::activate(status.as_deref(), job_id.as_deref(), GlooHttp, LocationReload)
    else {
        return;
    };

    info!(job_id = poller.job_id(), "polling job status");
    let (task, handle) = poller.start(&BrowserTimers);
    POLL_HANDLE.with(|slot| {
        if let Some(previous) = slot.borrow_mut().replace(handle) {
            previous.cancel();
        }
    });
    spawn_local(async move {
        match task.await {
            Ok(PollExit::Reloaded) => debug!("job status poller reloaded the page"),
            Ok(PollExit::TicksExhausted) => warn!("job status ticks ended unexpectedly"),
            Err(_) => info!("job status polling stopped"),
        }
    });
}

/// Cancels the page's job status poller. Returns false when none was running.
#[wasm_bindgen(js_name = stopJobStatusPolling)]
pub fn stop_job_status_polling() -> bool {
    POLL_HANDLE.with(|slot| match slot.borrow_mut().take() {
        Some(handle) => {
            handle.cancel();
            true
        }
        None => false,
    })
}

#[wasm_bindgen(js_name = getStatusColor)]
pub fn get_status_color(status: &str) -> String {
    status::status_color(status).to_string()
}

/// Refreshes the badge carrying `data-job-id="{job_id}"`.
#[wasm_bindgen(js_name = updateJobStatus)]
pub async fn update_job_status(job_id: String) -> bool {
    status::update_job_status(&GlooHttp, &DomBadges, &job_id).await
}

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    logging::init();
    install_error_listener();

    let Some(document) = web_document() else {
        return;
    };

    confirm_form_submissions(&document);
    validate_ticket_field(&document);
    wrap_responsive_tables(&document);
    // Before the tester creates its own alert-danger container.
    auto_dismiss_notifications(&document);
    init_connection_tester(&document);
    init_jql_examples(&document);
    init_status_poller(&document);
}
