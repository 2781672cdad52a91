use std::fmt::Display;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Service a post was fetched from. Decides the key names of the staged line.
#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug)]
pub enum SourceKind {
    Twitter,
    Mastodon,
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Twitter => write!(f, "twitter"),
            Self::Mastodon => write!(f, "mastodon"),
        }
    }
}

/// A tweet or toot reduced to the fields that get staged and loaded.
///
/// `content` is already stripped of markup and has its double quotes escaped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectedPost {
    pub source: SourceKind,
    pub id: String,
    pub url: Option<String>,
    pub created_at: String,
    pub content: String,
    pub author: Option<String>,
}

impl Serialize for ProjectedPost {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.source {
            SourceKind::Mastodon => {
                let mut map = serializer.serialize_map(Some(5))?;
                map.serialize_entry("id", &self.id)?;
                map.serialize_entry("url", &self.url)?;
                map.serialize_entry("created_at", &self.created_at)?;
                map.serialize_entry("content", &self.content)?;
                map.serialize_entry("acct", &self.author)?;
                map.end()
            }
            SourceKind::Twitter => {
                let len = if self.author.is_some() { 4 } else { 3 };
                let mut map = serializer.serialize_map(Some(len))?;
                map.serialize_entry("id", &self.id)?;
                map.serialize_entry("created_at", &self.created_at)?;
                map.serialize_entry("text", &self.content)?;
                if let Some(author) = &self.author {
                    map.serialize_entry("author_id", author)?;
                }
                map.end()
            }
        }
    }
}
