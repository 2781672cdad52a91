use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("invalid BigQuery endpoint: {endpoint}")]
    InvalidEndpoint { endpoint: String },

    #[error("unable to reach BigQuery while trying to {action}: {error}")]
    Http {
        action: String,
        #[source]
        error: reqwest::Error,
    },

    #[error("BigQuery refused to {action}: {status}, {message}")]
    Api {
        action: String,
        status: StatusCode,
        message: String,
    },

    #[error("unable to encode request to {action}: {error}")]
    Encode {
        action: String,
        #[source]
        error: serde_json::Error,
    },

    #[error("unable to read staged file {}: {error}", path.display())]
    StagedFile {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Column types in the file clash with the table or with each other.
    /// Unreadable rows are reported as [`WarehouseError::LoadJobFailed`].
    #[error("load job {job_id} hit a schema conflict loading {}: {message}", path.display())]
    SchemaConflict {
        job_id: String,
        path: PathBuf,
        message: String,
    },

    #[error("load job {job_id} failed for {}: {reason}, {message}", path.display())]
    LoadJobFailed {
        job_id: String,
        path: PathBuf,
        reason: String,
        message: String,
    },

    #[error("load job {job_id} for {} still running after {polls} status checks", path.display())]
    LoadTimeout {
        job_id: String,
        path: PathBuf,
        polls: u32,
    },
}
