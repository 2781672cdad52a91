use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
#[cfg(unix)]
use home_dir::HomeDirExt;
#[cfg(unix)]
use serde::de::Error;
use serde::{Deserialize, Deserializer};

use self::bigquery::BigQueryConfig;
use self::mastodon::MastodonConfig;
use self::twitter::TwitterConfig;

pub mod bigquery;
pub mod mastodon;
pub mod twitter;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Timeout for each HTTP request, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub twitter: Option<TwitterConfig>,
    pub mastodon: Option<MastodonConfig>,
    pub bigquery: Option<BigQueryConfig>,
}

impl Config {
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let conf_contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("unable to read config {}", path.as_ref().display()))?;
        Ok(toml::from_str(&conf_contents)?)
    }
}

fn deserialize_path<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: Deserializer<'de>,
{
    let s: PathBuf = Deserialize::deserialize(deserializer)?;
    #[cfg(unix)]
    let s = s.expand_home().map_err(D::Error::custom)?;
    Ok(s)
}

const fn default_timeout_secs() -> u64 {
    30
}
