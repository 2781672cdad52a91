use std::path::PathBuf;

use bigquery::WriteDisposition;
use serde::Deserialize;
use social_ingest_common::Credentials;

#[derive(Deserialize, Debug)]
pub struct TwitterConfig {
    pub bearer: Credentials,
    /// Recent search query, same syntax as the search box
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(deserialize_with = "super::deserialize_path")]
    pub staging_file: PathBuf,
    pub table: String,
    #[serde(default)]
    pub write_disposition: WriteDisposition,
}

const fn default_max_results() -> u32 {
    10
}

fn default_api_base() -> String {
    "https://api.twitter.com".to_owned()
}
