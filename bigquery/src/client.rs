use std::path::Path;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use social_ingest_common::Credentials;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    Ensured, JobError, JobId, JobState, JobStatus, TableRef, Warehouse, WarehouseError,
    WriteDisposition,
};

/// BigQuery REST v2 client bound to a single project
pub struct BigQueryClient<'a> {
    client: &'a Client,
    credentials: Credentials,
    project: String,
    location: String,
    endpoint: Url,
    log_existing: bool,
}

impl<'a> BigQueryClient<'a> {
    pub const DEFAULT_ENDPOINT: &'static str = "https://bigquery.googleapis.com";
    pub const DEFAULT_LOCATION: &'static str = "US";

    pub fn new(
        client: &'a Client,
        credentials: Credentials,
        project: impl Into<String>,
        endpoint: &str,
    ) -> Result<Self, WarehouseError> {
        let invalid = || WarehouseError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
        };
        let endpoint = Url::parse(endpoint).map_err(|_| invalid())?;
        if endpoint.cannot_be_a_base() {
            return Err(invalid());
        }

        Ok(Self {
            client,
            credentials,
            project: project.into(),
            location: Self::DEFAULT_LOCATION.to_owned(),
            endpoint,
            log_existing: true,
        })
    }

    /// Location new datasets and load jobs are placed in
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Whether "already exists" outcomes are logged at info level
    pub fn log_existing(mut self, log_existing: bool) -> Self {
        self.log_existing = log_existing;
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn url<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Result<Url, WarehouseError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| WarehouseError::InvalidEndpoint {
                endpoint: self.endpoint.to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn project_url<'s>(
        &'s self,
        segments: impl IntoIterator<Item = &'s str>,
    ) -> Result<Url, WarehouseError> {
        self.url(
            ["bigquery", "v2", "projects", self.project.as_str()]
                .into_iter()
                .chain(segments),
        )
    }

    async fn send(
        &self,
        request: RequestBuilder,
        action: &str,
    ) -> Result<Response, WarehouseError> {
        request
            .header(AUTHORIZATION, self.credentials.authorization())
            .send()
            .await
            .map_err(|error| WarehouseError::Http {
                action: action.to_owned(),
                error,
            })
    }

    /// Look a resource up and create it on 404. A 409 from the create means
    /// someone else created it in between, which counts as existing.
    async fn ensure(
        &self,
        kind: &str,
        name: &str,
        get_url: Url,
        create_url: Url,
        resource: &impl Serialize,
    ) -> Result<Ensured, WarehouseError> {
        let action = format!("get {kind} {name}");
        let resp = self.send(self.client.get(get_url), &action).await?;
        match resp.status() {
            s if s.is_success() => return Ok(self.existed(kind, name)),
            StatusCode::NOT_FOUND => {}
            _ => return Err(api_error(&action, resp).await),
        }

        let action = format!("create {kind} {name}");
        let resp = self
            .send(self.client.post(create_url).json(resource), &action)
            .await?;
        match resp.status() {
            s if s.is_success() => {
                info!(kind, resource = name, project = %self.project, "created");
                Ok(Ensured::Created)
            }
            StatusCode::CONFLICT => Ok(self.existed(kind, name)),
            _ => Err(api_error(&action, resp).await),
        }
    }

    fn existed(&self, kind: &str, name: &str) -> Ensured {
        if self.log_existing {
            info!(kind, resource = name, project = %self.project, "already exists");
        } else {
            debug!(kind, resource = name, project = %self.project, "already exists");
        }
        Ensured::Existed
    }
}

#[async_trait]
impl Warehouse for BigQueryClient<'_> {
    async fn ensure_dataset(&self, dataset: &str) -> Result<Ensured, WarehouseError> {
        let resource = DatasetResource {
            dataset_reference: DatasetReference {
                project_id: &self.project,
                dataset_id: dataset,
            },
            location: &self.location,
        };
        self.ensure(
            "dataset",
            dataset,
            self.project_url(["datasets", dataset])?,
            self.project_url(["datasets"])?,
            &resource,
        )
        .await
    }

    async fn ensure_table(&self, table: &TableRef) -> Result<Ensured, WarehouseError> {
        let resource = TableResource {
            table_reference: self.table_reference(table),
        };
        self.ensure(
            "table",
            &table.to_string(),
            self.project_url([
                "datasets",
                table.dataset.as_str(),
                "tables",
                table.table.as_str(),
            ])?,
            self.project_url(["datasets", table.dataset.as_str(), "tables"])?,
            &resource,
        )
        .await
    }

    async fn submit_load(
        &self,
        table: &TableRef,
        path: &Path,
        disposition: WriteDisposition,
    ) -> Result<JobId, WarehouseError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|error| WarehouseError::StagedFile {
                path: path.to_owned(),
                error,
            })?;

        let job_id = format!("social_ingest_{}", Uuid::new_v4().simple());
        let request = LoadJobRequest {
            job_reference: JobReference {
                project_id: self.project.clone(),
                job_id: job_id.clone(),
                location: Some(self.location.clone()),
            },
            configuration: JobConfiguration {
                load: LoadConfiguration {
                    destination_table: self.table_reference(table),
                    source_format: "NEWLINE_DELIMITED_JSON",
                    autodetect: true,
                    write_disposition: disposition.as_api_str(),
                },
            },
        };
        let metadata = serde_json::to_vec(&request).map_err(|error| WarehouseError::Encode {
            action: format!("submit load job {job_id}"),
            error,
        })?;

        let boundary = format!("load_{}", Uuid::new_v4().simple());
        let mut url = self.url([
            "upload",
            "bigquery",
            "v2",
            "projects",
            self.project.as_str(),
            "jobs",
        ])?;
        url.query_pairs_mut().append_pair("uploadType", "multipart");

        let action = format!("submit load job {job_id} into {table}");
        let resp = self
            .send(
                self.client
                    .post(url)
                    .header(
                        CONTENT_TYPE,
                        format!("multipart/related; boundary={boundary}"),
                    )
                    .body(multipart_related(&boundary, &metadata, &data)),
                &action,
            )
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(&action, resp).await);
        }

        let job: JobResponse = resp.json().await.map_err(|error| WarehouseError::Http {
            action: action.clone(),
            error,
        })?;
        Ok(JobId(job.job_reference.job_id))
    }

    async fn job_status(&self, job: &JobId) -> Result<JobStatus, WarehouseError> {
        let action = format!("get load job {job}");
        let url = self.project_url(["jobs", job.0.as_str()])?;
        let resp = self
            .send(
                self.client
                    .get(url)
                    .query(&[("location", self.location.as_str())]),
                &action,
            )
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(&action, resp).await);
        }

        let job: JobResponse = resp
            .json()
            .await
            .map_err(|error| WarehouseError::Http { action, error })?;

        let state = match job.status.state.as_str() {
            "PENDING" => JobState::Pending,
            "RUNNING" => JobState::Running,
            "DONE" => JobState::Done,
            other => {
                warn!(job_id = %job.job_reference.job_id, state = other, "unknown job state");
                JobState::Pending
            }
        };

        Ok(JobStatus {
            state,
            error: job.status.error_result.map(|e| JobError {
                reason: e.reason,
                message: e.message,
            }),
            output_rows: job
                .statistics
                .and_then(|s| s.load)
                .and_then(|l| l.output_rows),
        })
    }
}

impl BigQueryClient<'_> {
    fn table_reference(&self, table: &TableRef) -> TableReference {
        TableReference {
            project_id: self.project.clone(),
            dataset_id: table.dataset.clone(),
            table_id: table.table.clone(),
        }
    }
}

/// Body for the multipart upload endpoint: job metadata, then the file
fn multipart_related(boundary: &str, metadata: &[u8], data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + data.len() + 256);
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(metadata);
    body.extend_from_slice(
        format!("\r\n--{boundary}\r\nContent-Type: application/octet-stream\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

async fn api_error(action: &str, resp: Response) -> WarehouseError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.error.message)
        .unwrap_or(text);

    WarehouseError::Api {
        action: action.to_owned(),
        status,
        message,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetResource<'r> {
    dataset_reference: DatasetReference<'r>,
    location: &'r str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference<'r> {
    project_id: &'r str,
    dataset_id: &'r str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    table_reference: TableReference,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    project_id: String,
    dataset_id: String,
    table_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadJobRequest {
    job_reference: JobReference,
    configuration: JobConfiguration,
}

#[derive(Serialize)]
struct JobConfiguration {
    load: LoadConfiguration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadConfiguration {
    destination_table: TableReference,
    source_format: &'static str,
    autodetect: bool,
    write_disposition: &'static str,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct JobResponse {
    job_reference: JobReference,
    status: JobStatusResponse,
    statistics: Option<JobStatistics>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct JobStatusResponse {
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Deserialize, Debug)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize, Debug)]
struct JobStatistics {
    load: Option<LoadStatistics>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    #[serde(default, deserialize_with = "parse_u64_option")]
    output_rows: Option<u64>,
}

// int64 fields come back as JSON strings
fn parse_u64_option<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let s = Option::<String>::deserialize(deserializer)?;
    s.map(|s| s.parse().map_err(serde::de::Error::custom))
        .transpose()
}
