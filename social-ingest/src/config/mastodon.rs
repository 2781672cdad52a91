use std::path::PathBuf;

use bigquery::WriteDisposition;
use serde::Deserialize;
use social_ingest_common::Credentials;

/// Hashtag timeline of one Mastodon instance
#[derive(Deserialize, Debug)]
pub struct MastodonConfig {
    pub instance: String,
    pub user_key: Credentials,
    pub hashtag: String,
    /// Toots must also carry any of these tags
    #[serde(default)]
    pub any: Vec<String>,
    /// Toots must also carry all of these tags
    #[serde(default)]
    pub all: Vec<String>,
    /// Toots must carry none of these tags
    #[serde(default)]
    pub none: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(deserialize_with = "super::deserialize_path")]
    pub staging_file: PathBuf,
    pub table: String,
    #[serde(default)]
    pub write_disposition: WriteDisposition,
}

const fn default_limit() -> u32 {
    20
}
