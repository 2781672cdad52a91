use std::time::Duration;

use bigquery::{BigQueryClient, PollPolicy};
use serde::Deserialize;
use social_ingest_common::Credentials;

#[derive(Deserialize, Debug)]
pub struct BigQueryConfig {
    pub project: String,
    /// OAuth2 access token with BigQuery scope
    pub access_token: Credentials,
    pub dataset: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_true")]
    pub log_existing: bool,
    /// Skip the load when a run stages no records, instead of loading the
    /// empty file with the configured write disposition
    #[serde(default)]
    pub skip_empty_loads: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

impl BigQueryConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_polls: self.max_polls,
        }
    }
}

fn default_location() -> String {
    BigQueryClient::DEFAULT_LOCATION.to_owned()
}

fn default_endpoint() -> String {
    BigQueryClient::DEFAULT_ENDPOINT.to_owned()
}

const fn default_true() -> bool {
    true
}

const fn default_poll_interval_secs() -> u64 {
    2
}

const fn default_max_polls() -> u32 {
    150
}
