use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use social_ingest_common::{ProjectedPost, SourceKind};
use tracing::info;
use url::Url;

pub use self::toot::Toot;
use crate::config::mastodon::MastodonConfig;
use crate::fetch::{get_json, FetchError, Source};

mod toot;

/// Mastodon servers cap page size at 40
const MAX_LIMIT: u32 = 40;

/// Hashtag timeline search on a single Mastodon instance
pub struct MastodonClient<'a> {
    client: &'a Client,
    config: &'a MastodonConfig,
}

impl<'a> MastodonClient<'a> {
    pub fn new(client: &'a Client, config: &'a MastodonConfig) -> Self {
        Self { client, config }
    }

    fn hashtag(&self) -> &str {
        self.config.hashtag.trim_start_matches('#')
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let limit = self.config.limit.clamp(1, MAX_LIMIT);
        let mut params = vec![("limit", limit.to_string())];
        for (key, tags) in [
            ("any[]", &self.config.any),
            ("all[]", &self.config.all),
            ("none[]", &self.config.none),
        ] {
            params.extend(tags.iter().map(|t| (key, t.clone())));
        }
        params
    }
}

#[async_trait]
impl Source for MastodonClient<'_> {
    fn kind(&self) -> SourceKind {
        SourceKind::Mastodon
    }

    fn query(&self) -> String {
        let mut query = format!("#{}", self.hashtag());
        if !self.config.all.is_empty() {
            query.push_str(&format!(" all:{}", self.config.all.join(",")));
        }
        if !self.config.any.is_empty() {
            query.push_str(&format!(" any:{}", self.config.any.join(",")));
        }
        if !self.config.none.is_empty() {
            query.push_str(&format!(" none:{}", self.config.none.join(",")));
        }
        query
    }

    async fn search(&self) -> Result<Vec<serde_json::Value>, FetchError> {
        let query = self.query();
        let mut url = Url::parse(&self.config.instance).map_err(|e| FetchError::InvalidUrl {
            query: query.clone(),
            msg: e.to_string(),
        })?;
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl {
                query: query.clone(),
                msg: format!("{} cannot be a base url", self.config.instance),
            })?
            .pop_if_empty()
            .extend(["api", "v1", "timelines", "tag", self.hashtag()]);

        info!(%query, instance = %self.config.instance, "searching mastodon");
        let toots: Vec<serde_json::Value> = get_json(
            self.client
                .get(url)
                .header(AUTHORIZATION, self.config.user_key.authorization())
                .query(&self.params()),
            &query,
        )
        .await?;
        info!(%query, count = toots.len(), "fetched toots");

        Ok(toots)
    }

    fn project(&self, raw: &serde_json::Value) -> Result<ProjectedPost, String> {
        Toot::project(raw)
    }
}
