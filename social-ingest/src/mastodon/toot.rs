use serde::Deserialize;
use social_ingest_common::{ProjectedPost, SourceKind};

use crate::fetch::deserialize_id;
use crate::project::clean_text;

/// The parts of a Mastodon status entity that get staged
#[derive(Deserialize, Debug)]
pub struct Toot {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub url: Option<String>,
    pub created_at: String,
    /// HTML
    pub content: String,
    pub account: Account,
}

#[derive(Deserialize, Debug)]
pub struct Account {
    pub acct: String,
}

impl Toot {
    pub fn project(raw: &serde_json::Value) -> Result<ProjectedPost, String> {
        let toot = Toot::deserialize(raw).map_err(|e| e.to_string())?;
        Ok(toot.into())
    }
}

impl From<Toot> for ProjectedPost {
    fn from(toot: Toot) -> Self {
        ProjectedPost {
            source: SourceKind::Mastodon,
            id: toot.id,
            url: toot.url,
            created_at: toot.created_at,
            content: clean_text(&toot.content),
            author: Some(toot.account.acct),
        }
    }
}
