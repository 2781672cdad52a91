use std::path::Path;

use bigquery::{load_file, LoadOutcome, PollPolicy, TableRef, Warehouse, WriteDisposition};
use social_ingest_common::write_lines;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::fetch::Source;
use crate::project::project_batch;

/// Where and how a staged file gets loaded
#[derive(Clone, Debug)]
pub struct Target {
    pub table: TableRef,
    pub disposition: WriteDisposition,
    pub poll: PollPolicy,
    /// Leave the table alone when nothing was staged
    pub skip_empty: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageSummary {
    pub fetched: usize,
    pub staged: usize,
    pub skipped: usize,
    pub duplicates: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub stage: StageSummary,
    /// `None` when an empty batch was skipped
    pub load: Option<LoadOutcome>,
}

/// Fetch, project and write the staged file
pub async fn stage<S: Source + ?Sized>(
    source: &S,
    staging_file: &Path,
) -> Result<StageSummary, PipelineError> {
    let records = source.search().await?;
    let projection = project_batch(&records, |raw| source.project(raw));
    if projection.skipped > 0 {
        warn!(
            source = %source.kind(),
            skipped = projection.skipped,
            "some records could not be projected"
        );
    }

    let staged = write_lines(staging_file, &projection.posts)
        .await
        .map_err(|error| PipelineError::Stage {
            path: staging_file.to_owned(),
            error,
        })?;
    info!(
        source = %source.kind(),
        path = %staging_file.display(),
        staged,
        "staged file written"
    );

    Ok(StageSummary {
        fetched: records.len(),
        staged,
        skipped: projection.skipped,
        duplicates: projection.duplicates,
    })
}

/// Fetch -> project -> write -> load, one stage after the other.
///
/// A fetch failure returns before the staged file is touched. An empty batch
/// is loaded like any other unless `target.skip_empty` is set, so a truncating
/// load of nothing empties the table.
pub async fn run<S, W>(
    source: &S,
    staging_file: &Path,
    warehouse: &W,
    target: &Target,
) -> Result<RunSummary, PipelineError>
where
    S: Source + ?Sized,
    W: Warehouse + ?Sized,
{
    let stage = stage(source, staging_file).await?;
    if stage.staged == 0 {
        if target.skip_empty {
            info!(table = %target.table, "nothing staged, skipping load");
            return Ok(RunSummary { stage, load: None });
        }
        warn!(
            table = %target.table,
            disposition = target.disposition.as_api_str(),
            skipped = stage.skipped,
            "loading an empty batch"
        );
    }

    warehouse.ensure_dataset(&target.table.dataset).await?;
    warehouse.ensure_table(&target.table).await?;
    let load = load_file(
        warehouse,
        &target.table,
        staging_file,
        target.disposition,
        target.poll,
    )
    .await?;

    Ok(RunSummary {
        stage,
        load: Some(load),
    })
}

#[cfg(test)]
mod test {
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use bigquery::{Ensured, JobError, JobId, JobState, JobStatus, WarehouseError};
    use reqwest::{Client, StatusCode};
    use serde_json::{json, Value};
    use social_ingest_common::{read_lines, Credentials, ProjectedPost, SourceKind};
    use wiremock::matchers::{method, path as path_matcher};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::mastodon::MastodonConfig;
    use crate::fetch::FetchError;
    use crate::mastodon::{MastodonClient, Toot};

    /// Hands out a fixed batch of raw toots
    struct FixedToots(Vec<Value>);

    #[async_trait]
    impl Source for FixedToots {
        fn kind(&self) -> SourceKind {
            SourceKind::Mastodon
        }

        fn query(&self) -> String {
            "#hiring".to_owned()
        }

        async fn search(&self) -> Result<Vec<Value>, FetchError> {
            Ok(self.0.clone())
        }

        fn project(&self, raw: &Value) -> Result<ProjectedPost, String> {
            Toot::project(raw)
        }
    }

    #[derive(Default)]
    struct MemoryState {
        datasets: HashSet<String>,
        tables: HashMap<TableRef, Vec<Value>>,
        jobs: Vec<JobStatus>,
        creations: usize,
        calls: usize,
    }

    /// Tables held in memory, loads applied immediately
    #[derive(Default)]
    struct MemoryWarehouse {
        state: Mutex<MemoryState>,
    }

    impl MemoryWarehouse {
        fn rows(&self, table: &TableRef) -> Vec<Value> {
            self.state.lock().unwrap().tables.get(table).cloned().unwrap_or_default()
        }

        fn creations(&self) -> usize {
            self.state.lock().unwrap().creations
        }

        fn calls(&self) -> usize {
            self.state.lock().unwrap().calls
        }
    }

    fn not_found(action: &str) -> WarehouseError {
        WarehouseError::Api {
            action: action.to_owned(),
            status: StatusCode::NOT_FOUND,
            message: "Not found".to_owned(),
        }
    }

    #[async_trait]
    impl Warehouse for MemoryWarehouse {
        async fn ensure_dataset(&self, dataset: &str) -> Result<Ensured, WarehouseError> {
            let mut state = self.state.lock().unwrap();
            state.calls += 1;
            if state.datasets.insert(dataset.to_owned()) {
                state.creations += 1;
                Ok(Ensured::Created)
            } else {
                Ok(Ensured::Existed)
            }
        }

        async fn ensure_table(&self, table: &TableRef) -> Result<Ensured, WarehouseError> {
            let mut state = self.state.lock().unwrap();
            state.calls += 1;
            if !state.datasets.contains(&table.dataset) {
                return Err(not_found("create table"));
            }
            if state.tables.contains_key(table) {
                return Ok(Ensured::Existed);
            }
            state.tables.insert(table.clone(), vec![]);
            state.creations += 1;
            Ok(Ensured::Created)
        }

        async fn submit_load(
            &self,
            table: &TableRef,
            path: &Path,
            disposition: WriteDisposition,
        ) -> Result<JobId, WarehouseError> {
            let rows = read_lines(path)
                .await
                .map_err(|error| WarehouseError::StagedFile {
                    path: path.to_owned(),
                    error,
                })?;

            let mut state = self.state.lock().unwrap();
            state.calls += 1;
            let existing = state
                .tables
                .get_mut(table)
                .ok_or_else(|| not_found("submit load"))?;

            let output_rows = rows.len() as u64;
            let error = match disposition {
                WriteDisposition::Truncate => {
                    *existing = rows;
                    None
                }
                WriteDisposition::Append => {
                    existing.extend(rows);
                    None
                }
                WriteDisposition::Empty if !existing.is_empty() => Some(JobError {
                    reason: "duplicate".to_owned(),
                    message: format!("Already Exists: Table {table}"),
                }),
                WriteDisposition::Empty => {
                    *existing = rows;
                    None
                }
            };

            state.jobs.push(JobStatus {
                state: JobState::Done,
                output_rows: error.is_none().then_some(output_rows),
                error,
            });
            Ok(JobId(format!("mem_{}", state.jobs.len() - 1)))
        }

        async fn job_status(&self, job: &JobId) -> Result<JobStatus, WarehouseError> {
            let mut state = self.state.lock().unwrap();
            state.calls += 1;
            let index: usize = job.0.trim_start_matches("mem_").parse().unwrap();
            Ok(state.jobs[index].clone())
        }
    }

    fn toot(id: &str, content: &str) -> Value {
        json!({
            "id": id,
            "url": format!("https://data-folks.masto.host/@alice/{id}"),
            "created_at": "2023-03-01T10:00:00.000Z",
            "content": content,
            "account": {"acct": "alice"},
        })
    }

    fn target(disposition: WriteDisposition) -> Target {
        Target {
            table: TableRef::new("tweets_dataset", "raw_mastodon_jobs"),
            disposition,
            poll: PollPolicy {
                interval: Duration::ZERO,
                max_polls: 3,
            },
            skip_empty: false,
        }
    }

    fn ids(rows: &[Value]) -> Vec<&str> {
        rows.iter().map(|r| r["id"].as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn example_toot_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mastodon.jsonl");
        let source = FixedToots(vec![json!({
            "id": "1",
            "url": "http://x/1",
            "created_at": "2023-01-01T00:00:00Z",
            "content": "<p>Hello \"world\"</p>",
            "account": {"acct": "alice"},
        })]);
        let warehouse = MemoryWarehouse::default();
        let target = target(WriteDisposition::Truncate);

        let summary = run(&source, &path, &warehouse, &target).await.unwrap();
        assert_eq!(summary.stage.staged, 1);
        assert_eq!(summary.load.unwrap().output_rows, Some(1));

        let staged = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            staged,
            "{\"id\":\"1\",\"url\":\"http://x/1\",\"created_at\":\"2023-01-01T00:00:00Z\",\"content\":\"Hello \\\\\\\"world\\\\\\\"\",\"acct\":\"alice\"}\n"
        );
        assert_eq!(warehouse.rows(&target.table).len(), 1);
    }

    #[tokio::test]
    async fn truncate_replaces_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mastodon.jsonl");
        let warehouse = MemoryWarehouse::default();
        let target = target(WriteDisposition::Truncate);

        let first = FixedToots(vec![toot("1", "a"), toot("2", "b")]);
        run(&first, &path, &warehouse, &target).await.unwrap();
        let second = FixedToots(vec![toot("3", "c")]);
        run(&second, &path, &warehouse, &target).await.unwrap();

        assert_eq!(ids(&warehouse.rows(&target.table)), ["3"]);
    }

    #[tokio::test]
    async fn append_accumulates_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mastodon.jsonl");
        let warehouse = MemoryWarehouse::default();
        let target = target(WriteDisposition::Append);

        let first = FixedToots(vec![toot("1", "a"), toot("2", "b")]);
        run(&first, &path, &warehouse, &target).await.unwrap();
        let second = FixedToots(vec![toot("2", "b"), toot("3", "c")]);
        run(&second, &path, &warehouse, &target).await.unwrap();

        assert_eq!(ids(&warehouse.rows(&target.table)), ["1", "2", "2", "3"]);
    }

    #[tokio::test]
    async fn repeated_runs_create_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mastodon.jsonl");
        let warehouse = MemoryWarehouse::default();
        let target = target(WriteDisposition::Truncate);
        let source = FixedToots(vec![toot("1", "a")]);

        run(&source, &path, &warehouse, &target).await.unwrap();
        run(&source, &path, &warehouse, &target).await.unwrap();

        // one dataset, one table
        assert_eq!(warehouse.creations(), 2);
    }

    #[tokio::test]
    async fn malformed_toots_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mastodon.jsonl");
        let mut orphan = toot("2", "no account");
        orphan.as_object_mut().unwrap().remove("account");
        let source = FixedToots(vec![toot("1", "a"), orphan, toot("3", "c")]);
        let warehouse = MemoryWarehouse::default();
        let target = target(WriteDisposition::Truncate);

        let summary = run(&source, &path, &warehouse, &target).await.unwrap();
        assert_eq!(
            summary.stage,
            StageSummary {
                fetched: 3,
                staged: 2,
                skipped: 1,
                duplicates: 0,
            }
        );
        assert_eq!(ids(&warehouse.rows(&target.table)), ["1", "3"]);
    }

    #[tokio::test]
    async fn truncate_then_empty_batch_empties_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mastodon.jsonl");
        let warehouse = MemoryWarehouse::default();
        let target = target(WriteDisposition::Truncate);

        let first = FixedToots(vec![toot("1", "a"), toot("2", "b")]);
        run(&first, &path, &warehouse, &target).await.unwrap();
        assert_eq!(ids(&warehouse.rows(&target.table)), ["1", "2"]);

        let summary = run(&FixedToots(vec![]), &path, &warehouse, &target)
            .await
            .unwrap();
        assert_eq!(summary.stage.staged, 0);
        assert_eq!(summary.load.unwrap().output_rows, Some(0));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
        assert!(warehouse.rows(&target.table).is_empty());
    }

    #[tokio::test]
    async fn all_malformed_batch_still_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mastodon.jsonl");
        let warehouse = MemoryWarehouse::default();
        let target = target(WriteDisposition::Truncate);

        run(&FixedToots(vec![toot("1", "a")]), &path, &warehouse, &target)
            .await
            .unwrap();
        let summary = run(&FixedToots(vec![json!({"id": "2"})]), &path, &warehouse, &target)
            .await
            .unwrap();
        assert_eq!(summary.stage.skipped, 1);
        assert!(summary.load.is_some());
        assert!(warehouse.rows(&target.table).is_empty());
    }

    #[tokio::test]
    async fn empty_batch_skipped_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mastodon.jsonl");
        let warehouse = MemoryWarehouse::default();
        let mut target = target(WriteDisposition::Truncate);

        run(&FixedToots(vec![toot("1", "a")]), &path, &warehouse, &target)
            .await
            .unwrap();
        let calls = warehouse.calls();

        target.skip_empty = true;
        let summary = run(&FixedToots(vec![]), &path, &warehouse, &target)
            .await
            .unwrap();
        assert_eq!(summary.load, None);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
        assert_eq!(warehouse.calls(), calls);
        assert_eq!(ids(&warehouse.rows(&target.table)), ["1"]);
    }

    #[tokio::test]
    async fn write_empty_fails_on_populated_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mastodon.jsonl");
        let warehouse = MemoryWarehouse::default();
        let source = FixedToots(vec![toot("1", "a")]);

        run(&source, &path, &warehouse, &target(WriteDisposition::Empty))
            .await
            .unwrap();
        let err = run(&source, &path, &warehouse, &target(WriteDisposition::Empty))
            .await
            .unwrap_err();
        match err {
            PipelineError::Warehouse(WarehouseError::LoadJobFailed {
                job_id,
                path: p,
                reason,
                ..
            }) => {
                assert_eq!(job_id, "mem_1");
                assert_eq!(p, path);
                assert_eq!(reason, "duplicate");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limited_fetch_stages_and_loads_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_matcher("/api/v1/timelines/tag/hiring"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;
        let client = Client::builder().no_proxy().build().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mastodon.jsonl");
        let config = MastodonConfig {
            instance: server.uri(),
            user_key: Credentials::bearer("masto"),
            hashtag: "hiring".to_owned(),
            any: vec![],
            all: vec!["data".to_owned()],
            none: vec![],
            limit: 20,
            staging_file: PathBuf::from(&path),
            table: "raw_mastodon_jobs".to_owned(),
            write_disposition: WriteDisposition::Truncate,
        };
        let source = MastodonClient::new(&client, &config);
        let warehouse = MemoryWarehouse::default();

        let err = run(&source, &path, &warehouse, &target(WriteDisposition::Truncate))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Fetch(FetchError::HttpStatus { status, .. })
                if status == StatusCode::TOO_MANY_REQUESTS
        ));
        assert!(!path.exists());
        assert_eq!(warehouse.calls(), 0);
    }
}
