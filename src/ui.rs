use html_compile::compile::build_component;
use html_compile::types::{Attribute, Child, Component};

use crate::models::{
    GenerationJob, JiraConnection, JiraProject, JobLogEntry, JobStatus, TicketContent,
};

const BOOTSTRAP_CSS: &str = "https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css";
const FRONTEND_BOOTSTRAP: &str =
    "import init from '/assets/testgen_frontend.js';\ninit().catch((err) => console.error(err));";
const BASE_CSS: &str = ".alert { transition: opacity 300ms ease-in-out; }\n.table-wrapper { overflow-x: auto; }\n.card-body code { user-select: all; }";

const JQL_EXAMPLES: [&str; 3] = [
    "project = PROJ AND status = \"To Do\"",
    "assignee = currentUser() AND resolution = Unresolved",
    "project = PROJ AND created >= -7d ORDER BY created DESC",
];

#[derive(Debug, Clone)]
struct UiElement {
    tag: &'static str,
    attrs: Vec<(&'static str, String)>,
    content: UiContent,
}

#[derive(Debug, Clone)]
enum UiContent {
    Empty,
    Text(String),
    Children(Vec<UiElement>),
}

impl UiElement {
    fn new(tag: &'static str) -> Self {
        Self {
            tag,
            attrs: Vec::new(),
            content: UiContent::Empty,
        }
    }

    fn with_attr(mut self, label: &'static str, value: impl Into<String>) -> Self {
        self.attrs.push((label, value.into()));
        self
    }

    fn maybe_attr(
        mut self,
        condition: bool,
        label: &'static str,
        value: impl Into<String>,
    ) -> Self {
        if condition {
            self.attrs.push((label, value.into()));
        }
        self
    }

    fn with_text(mut self, text: impl Into<String>) -> Self {
        self.content = UiContent::Text(text.into());
        self
    }

    fn with_children(mut self, children: Vec<UiElement>) -> Self {
        self.content = UiContent::Children(children);
        self
    }

    fn render(&self) -> String {
        let component = self.to_component();
        build_component(&component)
    }

    fn to_component<'a>(&'a self) -> Component<'a> {
        let meta = if self.attrs.is_empty() {
            None
        } else {
            Some(
                self.attrs
                    .iter()
                    .map(|(label, value)| Attribute {
                        label,
                        value: value.as_str(),
                    })
                    .collect(),
            )
        };

        let child = match &self.content {
            UiContent::Empty => Child::NoChild,
            UiContent::Text(value) => Child::Text(value.as_str()),
            UiContent::Children(nodes) => Child::ComponentVec(
                nodes
                    .iter()
                    .map(|node| Box::new(node.to_component()))
                    .collect(),
            ),
        };

        Component {
            tag: self.tag,
            meta,
            child,
        }
    }
}

fn el(tag: &'static str) -> UiElement {
    UiElement::new(tag)
}

fn text_el(tag: &'static str, text: impl Into<String>) -> UiElement {
    UiElement::new(tag).with_text(text)
}

fn nav_link(path: &str, label: &str, active_path: &str) -> UiElement {
    el("a")
        .with_attr("href", path)
        .with_attr(
            "class",
            if active_path == path {
                "nav-link active"
            } else {
                "nav-link"
            },
        )
        .with_text(label)
}

fn alert(kind: &str, message: &str) -> UiElement {
    el("div")
        .with_attr("class", format!("alert alert-{kind}"))
        .with_attr("role", "alert")
        .with_text(escape_html(message))
}

fn status_badge(job: &GenerationJob) -> UiElement {
    el("span")
        .with_attr(
            "class",
            format!("badge bg-{}", job.status.badge_color()),
        )
        .with_attr("data-job-id", escape_html_attr(&job.id))
        .maybe_attr(
            job.error.is_some(),
            "title",
            escape_html_attr(job.error.as_deref().unwrap_or_default()),
        )
        .with_text(job.status.as_str())
}

fn form_field(id: &str, label: &str, input_type: &str, placeholder: &str, value: &str) -> UiElement {
    el("div").with_attr("class", "mb-3").with_children(vec![
        text_el("label", label)
            .with_attr("for", id)
            .with_attr("class", "form-label"),
        el("input")
            .with_attr("type", input_type)
            .with_attr("class", "form-control")
            .with_attr("id", id)
            .with_attr("name", id)
            .with_attr("placeholder", escape_html_attr(placeholder))
            .maybe_attr(!value.is_empty(), "value", escape_html_attr(value))
            .with_attr("required", "required"),
    ])
}

fn hidden_input(name: &str, value: impl Into<String>) -> UiElement {
    el("input")
        .with_attr("type", "hidden")
        .with_attr("name", name)
        .with_attr("value", escape_html_attr(&value.into()))
}

fn ticket_form() -> UiElement {
    el("form")
        .with_attr("method", "POST")
        .with_attr("action", "/ticket/submit")
        .with_children(vec![
            form_field("jiraTicket", "Jira ticket", "text", "PROJ-123", ""),
            el("div").with_attr("class", "mb-3").with_children(vec![
                text_el("label", "Description")
                    .with_attr("for", "description")
                    .with_attr("class", "form-label"),
                text_el("textarea", "")
                    .with_attr("class", "form-control")
                    .with_attr("id", "description")
                    .with_attr("name", "description")
                    .with_attr("rows", "4"),
            ]),
            el("div").with_attr("class", "mb-3").with_children(vec![
                text_el("label", "Components")
                    .with_attr("for", "components")
                    .with_attr("class", "form-label"),
                el("input")
                    .with_attr("type", "text")
                    .with_attr("class", "form-control")
                    .with_attr("id", "components")
                    .with_attr("name", "components")
                    .with_attr("placeholder", "api, web"),
            ]),
            text_el("button", "Generate tests")
                .with_attr("type", "submit")
                .with_attr("class", "btn btn-primary"),
        ])
}

fn import_form(connection_id: u64, key: &str) -> UiElement {
    el("form")
        .with_attr("method", "POST")
        .with_attr("action", format!("/jira/import/{}", escape_html_attr(key)))
        .with_attr("class", "d-inline")
        .with_children(vec![
            hidden_input("connectionId", connection_id.to_string()),
            text_el("button", "Generate tests")
                .with_attr("type", "submit")
                .with_attr("class", "btn btn-sm btn-primary"),
        ])
}

fn table(headers: &[&str], rows: Vec<UiElement>) -> UiElement {
    let header_cells = headers.iter().map(|label| text_el("th", *label)).collect();
    el("div")
        .with_attr("class", "table-responsive")
        .with_children(vec![el("table").with_attr("class", "table").with_children(vec![
            el("thead").with_children(vec![el("tr").with_children(header_cells)]),
            el("tbody").with_children(rows),
        ])])
}

fn jobs_table(jobs: &[GenerationJob]) -> UiElement {
    if jobs.is_empty() {
        return text_el("p", "No generation jobs yet.").with_attr("class", "text-muted");
    }

    let rows = jobs
        .iter()
        .map(|job| {
            el("tr").with_children(vec![
                el("td").with_children(vec![
                    text_el("a", escape_html(&job.ticket_key))
                        .with_attr("href", format!("/jobs/{}", escape_html_attr(&job.id))),
                ]),
                el("td").with_children(vec![status_badge(job)]),
                text_el("td", job.updated_at.format("%d/%m/%Y %H:%M").to_string()),
            ])
        })
        .collect::<Vec<_>>();

    table(&["Ticket", "Status", "Updated"], rows)
}

fn logs_table(logs: &[JobLogEntry]) -> UiElement {
    if logs.is_empty() {
        return text_el("p", "No log entries.").with_attr("class", "text-muted");
    }

    let rows = logs
        .iter()
        .map(|entry| {
            el("tr").with_children(vec![
                text_el("td", entry.timestamp.format("%H:%M:%S").to_string()),
                text_el("td", entry.level.as_str()),
                text_el("td", escape_html(&entry.message)),
            ])
        })
        .collect::<Vec<_>>();

    table(&["Time", "Level", "Message"], rows)
}

fn card(title: &str, body: Vec<UiElement>) -> UiElement {
    let mut children = vec![text_el("h2", title).with_attr("class", "h5")];
    children.extend(body);
    el("div")
        .with_attr("class", "card mb-4")
        .with_children(vec![el("div").with_attr("class", "card-body").with_children(children)])
}

pub fn render_index_page(jobs: &[GenerationJob], error: Option<&str>) -> String {
    let mut content = vec![text_el("h1", "Test generation")];
    if let Some(message) = error {
        content.push(alert("danger", message));
    }
    content.push(card("New job", vec![ticket_form()]));
    content.push(jobs_table(jobs));

    render_app_page("/", "Jobs - Test generation", content)
}

pub fn render_connect_page(error: Option<&str>, server_url: &str, username: &str) -> String {
    let mut content = vec![text_el("h1", "Connect to Jira")];
    if let Some(message) = error {
        content.push(alert("danger", message));
    }
    content.push(
        el("form")
            .with_attr("id", "jira-connection-form")
            .with_attr("method", "POST")
            .with_attr("action", "/jira/connect")
            .with_attr("autocomplete", "off")
            .with_children(vec![
                form_field(
                    "serverUrl",
                    "Server URL",
                    "url",
                    "https://your-domain.atlassian.net",
                    server_url,
                ),
                form_field("username", "Username", "email", "you@example.com", username),
                form_field("apiToken", "API token", "password", "", ""),
                el("div").with_attr("class", "d-flex gap-2").with_children(vec![
                    text_el("button", "Test connection")
                        .with_attr("type", "button")
                        .with_attr("id", "testConnection")
                        .with_attr("class", "btn btn-outline-secondary"),
                    text_el("button", "Save connection")
                        .with_attr("type", "submit")
                        .with_attr("class", "btn btn-primary"),
                ]),
            ]),
    );

    render_app_page("/jira/connect", "Jira connection - Test generation", content)
}

pub fn render_connections_page(connections: &[JiraConnection]) -> String {
    let mut content = vec![text_el("h1", "Jira connections")];
    if connections.is_empty() {
        content.push(
            text_el("p", "No saved connections yet.").with_attr("class", "text-muted"),
        );
    } else {
        let rows = connections
            .iter()
            .map(|connection| {
                let last_used = connection
                    .last_used_at
                    .map(|at| at.format("%d/%m/%Y %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                el("tr").with_children(vec![
                    text_el("td", escape_html(&connection.credentials.server_url)),
                    text_el("td", escape_html(&connection.credentials.username)),
                    text_el("td", connection.created_at.format("%d/%m/%Y %H:%M").to_string()),
                    text_el("td", last_used),
                    el("td").with_children(vec![
                        text_el("a", "Search")
                            .with_attr("href", search_href(connection.id))
                            .with_attr("class", "btn btn-sm btn-outline-primary"),
                    ]),
                ])
            })
            .collect::<Vec<_>>();
        content.push(table(
            &["Server", "Username", "Created", "Last used", ""],
            rows,
        ));
    }
    content.push(
        text_el("a", "Add connection")
            .with_attr("href", "/jira/connect")
            .with_attr("class", "btn btn-primary"),
    );

    render_app_page("/jira/connections", "Connections - Test generation", content)
}

/// Everything the ticket search page shows for one saved connection.
pub struct SearchView<'a> {
    pub connection: &'a JiraConnection,
    pub projects: &'a [JiraProject],
    pub jql: &'a str,
    pub results: Option<&'a [TicketContent]>,
    pub error: Option<&'a str>,
}

pub fn render_search_page(view: &SearchView<'_>) -> String {
    let connection_id = view.connection.id;
    let mut content = vec![
        text_el("h1", "Search tickets"),
        text_el(
            "p",
            format!(
                "Connected to {} as {}",
                escape_html(&view.connection.credentials.server_url),
                escape_html(&view.connection.credentials.username)
            ),
        )
        .with_attr("class", "text-muted"),
    ];
    if let Some(message) = view.error {
        content.push(alert("danger", message));
    }

    if !view.projects.is_empty() {
        let badges = view
            .projects
            .iter()
            .map(|project| {
                text_el(
                    "span",
                    format!("{} ({})", escape_html(&project.name), escape_html(&project.key)),
                )
                .with_attr("class", "badge bg-light text-dark me-1")
            })
            .collect::<Vec<_>>();
        content.push(card("Projects", vec![el("div").with_children(badges)]));
    }

    let examples = JQL_EXAMPLES
        .iter()
        .map(|example| el("li").with_children(vec![text_el("code", escape_html(example))]))
        .collect::<Vec<_>>();
    content.push(card(
        "JQL query",
        vec![
            el("ul").with_children(examples),
            el("form")
                .with_attr("method", "POST")
                .with_attr("action", "/jira/search")
                .with_children(vec![
                    hidden_input("connectionId", connection_id.to_string()),
                    form_field("jql", "JQL", "text", "project = PROJ", view.jql),
                    text_el("button", "Search")
                        .with_attr("type", "submit")
                        .with_attr("class", "btn btn-primary"),
                ]),
        ],
    ));

    match view.results {
        Some([]) => content.push(
            text_el("p", "No tickets match this query.").with_attr("class", "text-muted"),
        ),
        Some(tickets) => {
            let rows = tickets
                .iter()
                .map(|ticket| {
                    el("tr").with_children(vec![
                        el("td").with_children(vec![
                            text_el("a", escape_html(&ticket.key))
                                .with_attr("href", ticket_href(connection_id, &ticket.key)),
                        ]),
                        text_el("td", escape_html(&ticket.summary)),
                        text_el("td", escape_html(ticket.status.as_deref().unwrap_or("-"))),
                        text_el("td", escape_html(ticket.issue_type.as_deref().unwrap_or("-"))),
                        el("td").with_children(vec![import_form(connection_id, &ticket.key)]),
                    ])
                })
                .collect::<Vec<_>>();
            content.push(table(&["Key", "Summary", "Status", "Type", ""], rows));
        }
        None => {}
    }

    render_app_page("/jira/connections", "Search - Test generation", content)
}

pub fn render_ticket_page(connection_id: u64, ticket: &TicketContent) -> String {
    let components = if ticket.components.is_empty() {
        "N/A".to_string()
    } else {
        ticket.components.join(", ")
    };
    let content = vec![
        text_el(
            "h1",
            format!("{}: {}", escape_html(&ticket.key), escape_html(&ticket.summary)),
        ),
        text_el("p", format!("Components: {}", escape_html(&components))),
        text_el("pre", escape_html(&ticket.content)).with_attr("class", "border rounded p-3"),
        import_form(connection_id, &ticket.key),
        text_el("a", "Back to search")
            .with_attr("href", search_href(connection_id))
            .with_attr("class", "btn btn-link"),
    ];

    render_app_page("/jira/connections", "Ticket - Test generation", content)
}

pub fn render_job_page(job: &GenerationJob, logs: &[JobLogEntry]) -> String {
    let mut details = vec![
        text_el("h1", format!("Job {}", escape_html(&job.ticket_key))),
        el("p").with_children(vec![
            text_el("span", "Status: "),
            el("span")
                .with_attr(
                    "class",
                    format!("job-status badge bg-{}", job.status.badge_color()),
                )
                .with_attr("data-status", job.status.as_str())
                .with_attr("data-job-id", escape_html_attr(&job.id))
                .with_text(job.status.as_str()),
        ]),
        text_el(
            "p",
            format!("Created {}", job.created_at.format("%d/%m/%Y %H:%M")),
        )
        .with_attr("class", "text-muted"),
        text_el("p", format!("Components: {}", escape_html(&job.components_label()))),
    ];

    match job.error.as_deref() {
        Some(error) => details.push(alert("danger", error)),
        None if job.status == JobStatus::Completed => {
            details.push(alert("success", "Test generation completed."));
        }
        None if job.status.is_terminal() => {
            details.push(alert("danger", "Test generation failed."));
        }
        None => {}
    }

    if !job.description.is_empty() {
        details.push(card(
            "Ticket",
            vec![text_el("pre", escape_html(&job.description))],
        ));
    }
    if let Some(result) = job.test_result.as_deref() {
        details.push(card(
            "Generated tests",
            vec![text_el("pre", escape_html(result)).with_attr("id", "testResult")],
        ));
    }
    details.push(text_el("h2", "Log").with_attr("class", "h5"));
    details.push(logs_table(logs));

    render_app_page("/jobs", "Job - Test generation", details)
}

pub fn render_not_found_page(job_id: &str) -> String {
    render_error_page("Job not found", &format!("No job with id {job_id}."))
}

pub fn render_error_page(heading: &str, message: &str) -> String {
    let content = vec![
        text_el("h1", escape_html(heading)),
        alert("danger", message),
        text_el("a", "Back to jobs").with_attr("href", "/"),
    ];
    render_app_page("/jobs", "Error - Test generation", content)
}

fn search_href(connection_id: u64) -> String {
    format!("/jira/search?connectionId={connection_id}")
}

fn ticket_href(connection_id: u64, key: &str) -> String {
    format!(
        "/jira/ticket/{}?connectionId={connection_id}",
        escape_html_attr(key)
    )
}

fn render_app_page(active_path: &str, title: &str, content: Vec<UiElement>) -> String {
    let nav = el("nav")
        .with_attr("class", "navbar navbar-expand bg-body-tertiary mb-4")
        .with_children(vec![el("div").with_attr("class", "container").with_children(vec![
            text_el("a", "TestGen")
                .with_attr("class", "navbar-brand")
                .with_attr("href", "/"),
            el("div").with_attr("class", "navbar-nav").with_children(vec![
                nav_link("/", "Jobs", active_path),
                nav_link("/jira/connect", "Jira", active_path),
                nav_link("/jira/connections", "Connections", active_path),
            ]),
        ])]);

    let body_nodes = vec![
        nav,
        el("main")
            .with_attr("class", "container")
            .with_children(content),
        text_el("script", FRONTEND_BOOTSTRAP).with_attr("type", "module"),
    ];

    render_document(title, body_nodes)
}

fn render_document(title: &str, body_nodes: Vec<UiElement>) -> String {
    let head_children = vec![
        el("meta").with_attr("charset", "UTF-8"),
        el("meta")
            .with_attr("name", "viewport")
            .with_attr("content", "width=device-width, initial-scale=1.0"),
        text_el("title", escape_html(title)),
        el("link")
            .with_attr("rel", "stylesheet")
            .with_attr("href", BOOTSTRAP_CSS),
        text_el("style", BASE_CSS),
    ];

    let html = el("html")
        .with_attr("lang", "en")
        .with_children(vec![
            el("head").with_children(head_children),
            el("body").with_children(body_nodes),
        ]);

    format!("<!DOCTYPE html>\n{}", html.render())
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn escape_html_attr(input: &str) -> String {
    escape_html(input)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{JiraCredentials, LogLevel};

    fn job(status: JobStatus) -> GenerationJob {
        let mut job = GenerationJob::new("PROJ-42", "", Vec::new());
        job.set_status(status, None);
        job
    }

    fn connection() -> JiraConnection {
        JiraConnection {
            id: 7,
            credentials: JiraCredentials {
                server_url: "https://acme.atlassian.net".to_string(),
                username: "qa@acme.io".to_string(),
                api_token: "secret-token".to_string(),
            },
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    fn ticket(key: &str) -> TicketContent {
        TicketContent {
            key: key.to_string(),
            summary: "Login <SSO>".to_string(),
            status: Some("To Do".to_string()),
            issue_type: None,
            components: vec!["auth".to_string()],
            content: "Summary: Login <SSO>\n\n".to_string(),
        }
    }

    #[test]
    fn connect_page_carries_credential_fields_and_saves() {
        let html = render_connect_page(Some("API token is required"), "https://acme.io", "");
        for id in ["jira-connection-form", "serverUrl", "username", "apiToken", "testConnection"] {
            assert!(html.contains(&format!("id=\"{id}\"")), "missing #{id}");
        }
        assert!(html.contains("action=\"/jira/connect\""));
        assert!(html.contains("value=\"https://acme.io\""));
        assert!(html.contains("alert alert-danger"));
        assert!(html.contains("/assets/testgen_frontend.js"));
    }

    #[test]
    fn search_page_feeds_jql_into_the_search_form() {
        let connection = connection();
        let results = vec![ticket("PROJ-1")];
        let html = render_search_page(&SearchView {
            connection: &connection,
            projects: &[JiraProject {
                key: "PROJ".to_string(),
                name: "Project".to_string(),
            }],
            jql: "project = PROJ",
            results: Some(&results),
            error: None,
        });

        assert!(html.contains("action=\"/jira/search\""));
        assert!(html.contains("id=\"jql\""));
        assert!(html.contains("name=\"connectionId\""));
        assert!(html.contains("value=\"7\""));
        assert!(html.contains("value=\"project = PROJ\""));
        assert!(html.contains("card-body"));
        assert!(html.contains("assignee = currentUser() AND resolution = Unresolved"));
        assert!(html.contains("Project (PROJ)"));
        assert!(html.contains("href=\"/jira/ticket/PROJ-1?connectionId=7\""));
        assert!(html.contains("action=\"/jira/import/PROJ-1\""));
        assert!(html.contains("Login &lt;SSO&gt;"));
        assert!(!html.contains("secret-token"));
    }

    #[test]
    fn search_page_reports_empty_results() {
        let connection = connection();
        let html = render_search_page(&SearchView {
            connection: &connection,
            projects: &[],
            jql: "",
            results: Some(&[]),
            error: Some("JQL error: bad"),
        });
        assert!(html.contains("No tickets match this query."));
        assert!(html.contains("JQL error: bad"));
        assert!(!html.contains("Projects"));
    }

    #[test]
    fn connections_page_links_to_search() {
        let html = render_connections_page(&[connection()]);
        assert!(html.contains("href=\"/jira/search?connectionId=7\""));
        assert!(html.contains("never"));
        assert!(!html.contains("secret-token"));
        assert!(render_connections_page(&[]).contains("No saved connections yet."));
    }

    #[test]
    fn ticket_page_offers_import() {
        let html = render_ticket_page(7, &ticket("PROJ-1"));
        assert!(html.contains("action=\"/jira/import/PROJ-1\""));
        assert!(html.contains("Components: auth"));
        assert!(html.contains("<pre"));
    }

    #[test]
    fn job_page_exposes_status_data_attributes() {
        let job = job(JobStatus::InProgress);
        let html = render_job_page(&job, &[]);
        assert!(html.contains("job-status"));
        assert!(html.contains("data-status=\"IN_PROGRESS\""));
        assert!(html.contains(&format!("data-job-id=\"{}\"", job.id)));
        assert!(html.contains("badge bg-warning"));
        assert!(html.contains("No log entries."));
    }

    #[test]
    fn completed_job_page_shows_result_and_logs() {
        let mut job = job(JobStatus::InProgress);
        job.complete("Scenario: <login>".to_string());
        let logs = vec![JobLogEntry::new(LogLevel::Info, "Job completed and saved")];

        let html = render_job_page(&job, &logs);
        assert!(html.contains("id=\"testResult\""));
        assert!(html.contains("Scenario: &lt;login&gt;"));
        assert!(html.contains("Job completed and saved"));
        assert!(html.contains("table-responsive"));
        assert!(html.contains("alert alert-success"));
    }

    #[test]
    fn index_lists_jobs_with_badges_and_ticket_form() {
        let jobs = vec![job(JobStatus::Failed)];
        let html = render_index_page(&jobs, Some("Jira ticket format must be PROJ-123"));
        assert!(html.contains("action=\"/ticket/submit\""));
        for id in ["jiraTicket", "description", "components"] {
            assert!(html.contains(&format!("id=\"{id}\"")), "missing #{id}");
        }
        assert!(html.contains("badge bg-danger"));
        assert!(html.contains("table-responsive"));
        assert!(html.contains("alert alert-danger"));
        assert!(html.contains("href=\"/jira/connections\""));
    }

    #[test]
    fn escapes_user_supplied_text() {
        let html = render_not_found_page("<script>");
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("No job with id <script>"));
    }
}
