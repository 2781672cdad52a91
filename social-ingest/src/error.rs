use std::path::PathBuf;

use bigquery::WarehouseError;
use thiserror::Error;

use crate::fetch::FetchError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("unable to write staged file {}: {error}", path.display())]
    Stage {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}
