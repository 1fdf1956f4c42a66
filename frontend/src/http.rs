use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T>(&self) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_str(&self.body).map_err(|err| FetchError::Decode(err.to_string()))
    }
}

/// Resolves with any HTTP status; only transport failures are `Err`.
#[allow(async_fn_in_trait)]
pub trait HttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;

    async fn post_json(&self, url: &str, body: String) -> Result<HttpResponse, FetchError>;
}
