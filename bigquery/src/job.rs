use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use crate::{
    JobError, JobId, JobState, JobStatus, TableRef, Warehouse, WarehouseError, WriteDisposition,
};

/// BigQuery reports both unreadable rows and column type clashes as `invalid`
const INVALID_REASON: &str = "invalid";

/// Lowercased message fragments that mark an `invalid` error as a schema clash
const SCHEMA_CONFLICT_MARKERS: &[&str] = &[
    "schema does not match",
    "changed type from",
    "invalid schema update",
    "could not convert value",
];

fn is_schema_conflict(error: &JobError) -> bool {
    if error.reason != INVALID_REASON {
        return false;
    }
    let message = error.message.to_lowercase();
    SCHEMA_CONFLICT_MARKERS.iter().any(|m| message.contains(m))
}

/// How long to wait for a load job before giving up on it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_polls: 150,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadOutcome {
    pub job_id: JobId,
    pub output_rows: Option<u64>,
    pub polls: u32,
}

/// A submitted load job. Never resubmitted from here, whatever the outcome.
pub struct LoadJob<'w, W: ?Sized> {
    warehouse: &'w W,
    id: JobId,
    path: PathBuf,
}

impl<'w, W: Warehouse + ?Sized> LoadJob<'w, W> {
    pub async fn submit(
        warehouse: &'w W,
        table: &TableRef,
        path: &Path,
        disposition: WriteDisposition,
    ) -> Result<LoadJob<'w, W>, WarehouseError> {
        let id = warehouse.submit_load(table, path, disposition).await?;
        Ok(Self {
            warehouse,
            id,
            path: path.to_owned(),
        })
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Check the job status every `policy.interval` until it is done or the
    /// poll budget runs out.
    pub async fn poll_until_done(&self, policy: PollPolicy) -> Result<LoadOutcome, WarehouseError> {
        let max_polls = policy.max_polls.max(1);
        for poll in 1..=max_polls {
            let status = self.warehouse.job_status(&self.id).await?;
            if status.state == JobState::Done {
                return self.finish(status, poll);
            }

            debug!(job_id = %self.id, state = ?status.state, poll, "load job not done yet");
            if poll < max_polls {
                sleep(policy.interval).await;
            }
        }

        Err(WarehouseError::LoadTimeout {
            job_id: self.id.to_string(),
            path: self.path.clone(),
            polls: max_polls,
        })
    }

    fn finish(&self, status: JobStatus, polls: u32) -> Result<LoadOutcome, WarehouseError> {
        match status.error {
            None => Ok(LoadOutcome {
                job_id: self.id.clone(),
                output_rows: status.output_rows,
                polls,
            }),
            Some(e) if is_schema_conflict(&e) => Err(WarehouseError::SchemaConflict {
                job_id: self.id.to_string(),
                path: self.path.clone(),
                message: e.message,
            }),
            Some(e) => Err(WarehouseError::LoadJobFailed {
                job_id: self.id.to_string(),
                path: self.path.clone(),
                reason: e.reason,
                message: e.message,
            }),
        }
    }
}

/// Submit a load of the staged file and block until the job is terminal
pub async fn load_file<W: Warehouse + ?Sized>(
    warehouse: &W,
    table: &TableRef,
    path: impl AsRef<Path>,
    disposition: WriteDisposition,
    policy: PollPolicy,
) -> Result<LoadOutcome, WarehouseError> {
    let job = LoadJob::submit(warehouse, table, path.as_ref(), disposition).await?;
    info!(
        job_id = %job.id(),
        %table,
        disposition = disposition.as_api_str(),
        "load job submitted"
    );

    let outcome = job.poll_until_done(policy).await?;
    info!(
        job_id = %outcome.job_id,
        rows = outcome.output_rows,
        polls = outcome.polls,
        "load job done"
    );
    Ok(outcome)
}
