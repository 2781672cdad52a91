use serde::Deserialize;
use social_ingest_common::{ProjectedPost, SourceKind};

use crate::fetch::deserialize_id;
use crate::project::clean_text;

/// Tweet object from the v2 search endpoint
#[derive(Deserialize, Debug)]
pub struct Tweet {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub text: String,
    /// Only present when requested through `tweet.fields`
    #[serde(default)]
    pub created_at: String,
    pub author_id: Option<String>,
}

impl Tweet {
    pub fn project(raw: &serde_json::Value) -> Result<ProjectedPost, String> {
        let tweet = Tweet::deserialize(raw).map_err(|e| e.to_string())?;
        Ok(tweet.into())
    }
}

impl From<Tweet> for ProjectedPost {
    fn from(tweet: Tweet) -> Self {
        ProjectedPost {
            source: SourceKind::Twitter,
            id: tweet.id,
            url: None,
            created_at: tweet.created_at,
            // Tweet text comes back with &, < and > entity encoded
            content: clean_text(&tweet.text),
            author: tweet.author_id,
        }
    }
}
