mod client;
mod error;
mod job;
mod warehouse;

pub use client::BigQueryClient;
pub use error::WarehouseError;
pub use job::{load_file, LoadJob, LoadOutcome, PollPolicy};
pub use warehouse::{
    Ensured, JobError, JobId, JobState, JobStatus, TableRef, Warehouse, WriteDisposition,
};
