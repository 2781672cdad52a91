use std::fmt::Display;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::WarehouseError;

/// Dataset and table inside the client's project
#[derive(Eq, PartialEq, Hash, Clone, Debug)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// What a load job does with rows already in the destination table
#[derive(Deserialize, Eq, PartialEq, Clone, Copy, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum WriteDisposition {
    Append,
    #[default]
    Truncate,
    /// Only write if the table is empty
    Empty,
}

impl WriteDisposition {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::Append => "WRITE_APPEND",
            Self::Truncate => "WRITE_TRUNCATE",
            Self::Empty => "WRITE_EMPTY",
        }
    }
}

/// Outcome of an idempotent create
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum Ensured {
    Created,
    Existed,
}

#[derive(Eq, PartialEq, Hash, Clone, Debug)]
pub struct JobId(pub String);

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum JobState {
    Pending,
    Running,
    Done,
}

#[derive(Eq, PartialEq, Clone, Debug)]
pub struct JobError {
    pub reason: String,
    pub message: String,
}

#[derive(Eq, PartialEq, Clone, Debug)]
pub struct JobStatus {
    pub state: JobState,
    /// Set once the job is done and failed
    pub error: Option<JobError>,
    pub output_rows: Option<u64>,
}

/// The warehouse operations a load needs.
///
/// Creation calls are idempotent: asking for something that already exists
/// reports [`Ensured::Existed`] instead of failing.
#[async_trait]
pub trait Warehouse {
    async fn ensure_dataset(&self, dataset: &str) -> Result<Ensured, WarehouseError>;

    /// Create the table without a schema, columns are detected on first load
    async fn ensure_table(&self, table: &TableRef) -> Result<Ensured, WarehouseError>;

    /// Start a newline-delimited JSON load of `path` into `table`
    async fn submit_load(
        &self,
        table: &TableRef,
        path: &Path,
        disposition: WriteDisposition,
    ) -> Result<JobId, WarehouseError>;

    async fn job_status(&self, job: &JobId) -> Result<JobStatus, WarehouseError>;
}
