use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use social_ingest_common::{ProjectedPost, SourceKind};
use tracing::{info, warn};
use url::Url;

use super::tweet::Tweet;
use crate::config::twitter::TwitterConfig;
use crate::fetch::{get_json, FetchError, Source};

static TWEET_FIELDS: &str = "id,text,created_at,author_id";

#[derive(Deserialize, Debug)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<serde_json::Value>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

/// Recent search against the Twitter v2 API, app-only bearer auth
pub struct TwitterClient<'a> {
    client: &'a Client,
    config: &'a TwitterConfig,
}

impl<'a> TwitterClient<'a> {
    pub fn new(client: &'a Client, config: &'a TwitterConfig) -> TwitterClient<'a> {
        TwitterClient { client, config }
    }

    /// The endpoint only accepts 10 to 100 results per page
    fn max_results(&self) -> u32 {
        self.config.max_results.clamp(10, 100)
    }
}

#[async_trait]
impl Source for TwitterClient<'_> {
    fn kind(&self) -> SourceKind {
        SourceKind::Twitter
    }

    fn query(&self) -> String {
        self.config.query.clone()
    }

    async fn search(&self) -> Result<Vec<serde_json::Value>, FetchError> {
        let query = self.query();
        let invalid = |msg: String| FetchError::InvalidUrl {
            query: query.clone(),
            msg,
        };
        let mut url = Url::parse(&self.config.api_base).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid(format!("{} cannot be a base url", self.config.api_base)))?
            .pop_if_empty()
            .extend(["2", "tweets", "search", "recent"]);

        let params = [
            ("query", query.clone()),
            ("max_results", self.max_results().to_string()),
            ("tweet.fields", TWEET_FIELDS.to_owned()),
        ];

        info!(%query, "searching recent tweets");
        let resp: SearchResponse = get_json(
            self.client
                .get(url)
                .header(AUTHORIZATION, self.config.bearer.authorization())
                .query(&params),
            &query,
        )
        .await?;

        if !resp.errors.is_empty() {
            warn!(%query, errors = resp.errors.len(), "search returned partial errors");
        }
        info!(%query, count = resp.data.len(), "fetched tweets");

        Ok(resp.data)
    }

    fn project(&self, raw: &serde_json::Value) -> Result<ProjectedPost, String> {
        Tweet::project(raw)
    }
}
