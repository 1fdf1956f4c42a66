use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{JiraCredentials, JiraProject, TicketContent, is_valid_ticket_key};

const SEARCH_MAX_RESULTS: u32 = 50;
const ISSUE_FIELDS: [&str; 5] = ["summary", "description", "status", "issuetype", "components"];

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .unwrap_or_else(|err| panic!("invalid email pattern: {err}"))
});

#[derive(Debug, Error)]
pub enum JiraError {
    #[error("Invalid URL. It must start with http:// or https://")]
    InvalidUrl,
    #[error("Username is not a valid email address")]
    InvalidUsername,
    #[error("API token is required")]
    MissingToken,
    #[error("Invalid credentials. Check username and API token.")]
    Unauthorized,
    #[error("Jira server not found. Check the URL.")]
    NotFound,
    #[error("Jira server responded with status {0}")]
    UnexpectedStatus(u16),
    #[error("Unable to reach Jira server: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{0}")]
    Query(String),
    #[error("Ticket not found: {0}")]
    TicketNotFound(String),
    #[error("Unexpected response from Jira: {0}")]
    Decode(String),
    #[error("failed building Jira client: {0}")]
    Client(String),
}

#[derive(Debug, Deserialize)]
struct SearchDto {
    #[serde(default)]
    issues: Vec<IssueDto>,
}

#[derive(Debug, Deserialize)]
struct IssueDto {
    key: String,
    #[serde(default)]
    fields: IssueFields,
}

#[derive(Debug, Default, Deserialize)]
struct IssueFields {
    #[serde(default)]
    summary: String,
    description: Option<String>,
    status: Option<Named>,
    issuetype: Option<Named>,
    #[serde(default)]
    components: Vec<Named>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDto {
    #[serde(default)]
    error_messages: Vec<String>,
    #[serde(default)]
    errors: BTreeMap<String, String>,
}

impl From<IssueDto> for TicketContent {
    fn from(issue: IssueDto) -> Self {
        let fields = issue.fields;
        let status = fields.status.map(|named| named.name);
        let issue_type = fields.issuetype.map(|named| named.name);

        let mut content = format!("Summary: {}\n\n", fields.summary);
        if let Some(description) = fields.description.as_deref() {
            content.push_str(&format!("Description: {description}\n\n"));
        }
        if let Some(status) = status.as_deref() {
            content.push_str(&format!("Status: {status}\n"));
        }
        if let Some(issue_type) = issue_type.as_deref() {
            content.push_str(&format!("Type: {issue_type}\n"));
        }

        Self {
            key: issue.key,
            summary: fields.summary,
            status,
            issue_type,
            components: fields.components.into_iter().map(|c| c.name).collect(),
            content,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JiraClient {
    http: reqwest::Client,
}

impl JiraClient {
    pub fn new(timeout: Duration) -> Result<Self, JiraError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| JiraError::Client(err.to_string()))?;
        Ok(Self { http })
    }

    /// Authenticates against `/rest/api/2/myself`; any 2xx counts as success.
    pub async fn test_connection(&self, credentials: &JiraCredentials) -> Result<(), JiraError> {
        validate(credentials)?;
        let url = api_url(&credentials.server_url, "myself")?;

        let response = authorized(self.http.get(url), credentials).send().await?;
        let status = response.status();
        if status.is_success() {
            info!("jira connection ok: {}", credentials.server_url);
            return Ok(());
        }

        warn!(
            "jira connection to {} failed with status {status}",
            credentials.server_url
        );
        Err(status_error(status))
    }

    pub async fn search(
        &self,
        credentials: &JiraCredentials,
        jql: &str,
    ) -> Result<Vec<TicketContent>, JiraError> {
        let url = api_url(&credentials.server_url, "search")?;
        let body = json!({
            "jql": jql.trim(),
            "maxResults": SEARCH_MAX_RESULTS,
            "fields": ISSUE_FIELDS,
        });

        let response = authorized(self.http.post(url), credentials)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if status.is_client_error() && status != StatusCode::UNAUTHORIZED {
            let raw = response.text().await?;
            warn!("jira search rejected with status {status}");
            return Err(JiraError::Query(query_error_message(&raw, status)));
        }

        let search: SearchDto = decode(response).await?;
        info!("jira search returned {} issue(s)", search.issues.len());
        Ok(search.issues.into_iter().map(TicketContent::from).collect())
    }

    pub async fn issue(
        &self,
        credentials: &JiraCredentials,
        key: &str,
    ) -> Result<TicketContent, JiraError> {
        let key = key.trim();
        if !is_valid_ticket_key(key) {
            return Err(JiraError::TicketNotFound(key.to_string()));
        }
        let url = api_url(&credentials.server_url, &format!("issue/{key}"))?;

        let response = authorized(self.http.get(url), credentials)
            .query(&[("fields", ISSUE_FIELDS.join(","))])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(JiraError::TicketNotFound(key.to_string()));
        }

        let issue: IssueDto = decode(response).await?;
        Ok(issue.into())
    }

    pub async fn projects(
        &self,
        credentials: &JiraCredentials,
    ) -> Result<Vec<JiraProject>, JiraError> {
        let url = api_url(&credentials.server_url, "project")?;
        let response = authorized(self.http.get(url), credentials).send().await?;
        decode(response).await
    }
}

/// Shape checks run before any request leaves the server.
pub fn validate(credentials: &JiraCredentials) -> Result<(), JiraError> {
    api_url(&credentials.server_url, "myself")?;
    if !EMAIL_RE.is_match(credentials.username.trim()) {
        return Err(JiraError::InvalidUsername);
    }
    if credentials.api_token.trim().is_empty() {
        return Err(JiraError::MissingToken);
    }
    Ok(())
}

fn authorized(request: RequestBuilder, credentials: &JiraCredentials) -> RequestBuilder {
    request
        .basic_auth(credentials.username.trim(), Some(&credentials.api_token))
        .header(ACCEPT, "application/json")
}

fn status_error(status: StatusCode) -> JiraError {
    match status {
        StatusCode::UNAUTHORIZED => JiraError::Unauthorized,
        StatusCode::NOT_FOUND => JiraError::NotFound,
        other => JiraError::UnexpectedStatus(other.as_u16()),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, JiraError> {
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status));
    }
    response
        .json::<T>()
        .await
        .map_err(|err| JiraError::Decode(err.to_string()))
}

fn query_error_message(raw: &str, status: StatusCode) -> String {
    let parsed = serde_json::from_str::<ErrorDto>(raw).unwrap_or_default();
    if !parsed.error_messages.is_empty() {
        format!("JQL error: {}", parsed.error_messages.join(", "))
    } else if !parsed.errors.is_empty() {
        let details = parsed.errors.into_values().collect::<Vec<_>>();
        format!("JQL error: {}", details.join(", "))
    } else {
        format!("Ticket search failed with status {}", status.as_u16())
    }
}

fn api_url(server_url: &str, path: &str) -> Result<Url, JiraError> {
    let trimmed = server_url.trim();
    let base = Url::parse(trimmed).map_err(|_| JiraError::InvalidUrl)?;
    if !matches!(base.scheme(), "http" | "https") || base.host_str().is_none() {
        return Err(JiraError::InvalidUrl);
    }

    let joined = format!("{}/rest/api/2/{path}", trimmed.trim_end_matches('/'));
    Url::parse(&joined).map_err(|_| JiraError::InvalidUrl)
}
