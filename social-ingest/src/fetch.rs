use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use social_ingest_common::{ProjectedPost, SourceKind};
use thiserror::Error;

use crate::response_helpers;

/// Why a search request produced no records. Each variant names the query.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("unable to connect while searching {query:?}: {error}")]
    Connection {
        query: String,
        #[source]
        error: reqwest::Error,
    },

    #[error("timed out searching {query:?}")]
    Timeout {
        query: String,
        #[source]
        error: reqwest::Error,
    },

    #[error("too many redirects searching {query:?}")]
    TooManyRedirects {
        query: String,
        #[source]
        error: reqwest::Error,
    },

    #[error("search {query:?} returned {status}{}", retry_hint(.retry_after))]
    HttpStatus {
        query: String,
        status: StatusCode,
        retry_after: Option<Duration>,
    },

    #[error("search {query:?} failed: {error}")]
    Request {
        query: String,
        #[source]
        error: reqwest::Error,
    },

    #[error("invalid url for search {query:?}: {msg}")]
    InvalidUrl { query: String, msg: String },
}

impl FetchError {
    pub fn query(&self) -> &str {
        match self {
            Self::Connection { query, .. }
            | Self::Timeout { query, .. }
            | Self::TooManyRedirects { query, .. }
            | Self::HttpStatus { query, .. }
            | Self::Request { query, .. }
            | Self::InvalidUrl { query, .. } => query,
        }
    }

    fn classify(query: &str, error: reqwest::Error) -> Self {
        let query = query.to_owned();
        if error.is_timeout() {
            Self::Timeout { query, error }
        } else if error.is_connect() {
            Self::Connection { query, error }
        } else if error.is_redirect() {
            Self::TooManyRedirects { query, error }
        } else {
            Self::Request { query, error }
        }
    }
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(", retry after {}s", d.as_secs()),
        None => String::new(),
    }
}

/// One search API. Implementations make a single request per call.
#[async_trait]
pub trait Source {
    fn kind(&self) -> SourceKind;

    /// Human readable description of what is searched, used in errors and logs
    fn query(&self) -> String;

    /// Raw records of the first result page
    async fn search(&self) -> Result<Vec<serde_json::Value>, FetchError>;

    /// Reduce one raw record, or say why it can't be
    fn project(&self, raw: &serde_json::Value) -> Result<ProjectedPost, String>;
}

/// Send the request and decode a successful JSON body
pub(crate) async fn get_json<T: DeserializeOwned>(
    request: RequestBuilder,
    query: &str,
) -> Result<T, FetchError> {
    let resp = request
        .send()
        .await
        .map_err(|e| FetchError::classify(query, e))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            query: query.to_owned(),
            status,
            retry_after: response_helpers::check_rate_limit(&resp),
        });
    }

    resp.json::<T>()
        .await
        .map_err(|e| FetchError::classify(query, e))
}

/// Record ids come as strings from both APIs, but accept plain numbers too
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
