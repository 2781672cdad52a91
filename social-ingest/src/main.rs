use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use bigquery::{BigQueryClient, TableRef, WriteDisposition};
use clap::{Parser, Subcommand};
use reqwest::Client;
use social_ingest::config::bigquery::BigQueryConfig;
use social_ingest::config::Config;
use social_ingest::fetch::Source;
use social_ingest::mastodon::MastodonClient;
use social_ingest::pipeline::{self, Target};
use social_ingest::twitter::TwitterClient;
use social_ingest_common::read_lines;
use tracing::{error, info};

mod logging;

/// Load social media search results into BigQuery
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Source to search
    #[clap(subcommand)]
    source: SourceArg,

    /// Config file location
    #[clap(short, long, default_value_os_t = default_config_path(), value_parser)]
    config: PathBuf,

    /// Log debug output
    #[clap(short, long)]
    verbose: bool,

    /// Write the staged file and stop
    #[clap(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum SourceArg {
    /// Twitter recent search
    Twitter {
        /// Search query, overrides the config file
        #[clap(short, long)]
        query: Option<String>,
    },
    /// Mastodon hashtag timeline
    Mastodon {
        /// Hashtag, overrides the config file
        #[clap(long)]
        hashtag: Option<String>,
    },
}

/// Where a source's batch is staged and loaded
struct Destination<'a> {
    staging_file: &'a Path,
    table: &'a str,
    disposition: WriteDisposition,
}

fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "Social Ingest")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init(args.verbose);

    match run(args).await {
        Ok(_) => process::exit(0),
        Err(err) => {
            error!("{:#}", err);
            process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let conf = Config::read(&args.config)?;
    let client = Client::builder()
        .timeout(Duration::from_secs(conf.timeout_secs))
        .build()?;
    let bigquery = conf.bigquery.as_ref();

    match args.source {
        SourceArg::Twitter { query } => {
            let mut twitter = conf
                .twitter
                .ok_or_else(|| anyhow!("Missing twitter section in config file"))?;
            if let Some(query) = query {
                twitter.query = query;
            }
            let dest = Destination {
                staging_file: &twitter.staging_file,
                table: &twitter.table,
                disposition: twitter.write_disposition,
            };
            let source = TwitterClient::new(&client, &twitter);
            ingest(&client, &source, dest, bigquery, args.dry_run).await
        }
        SourceArg::Mastodon { hashtag } => {
            let mut mastodon = conf
                .mastodon
                .ok_or_else(|| anyhow!("Missing mastodon section in config file"))?;
            if let Some(hashtag) = hashtag {
                mastodon.hashtag = hashtag;
            }
            let dest = Destination {
                staging_file: &mastodon.staging_file,
                table: &mastodon.table,
                disposition: mastodon.write_disposition,
            };
            let source = MastodonClient::new(&client, &mastodon);
            ingest(&client, &source, dest, bigquery, args.dry_run).await
        }
    }
}

async fn ingest<S: Source>(
    client: &Client,
    source: &S,
    dest: Destination<'_>,
    bigquery: Option<&BigQueryConfig>,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        pipeline::stage(source, dest.staging_file).await?;
        let lines = read_lines(dest.staging_file)
            .await
            .with_context(|| format!("unable to read back {}", dest.staging_file.display()))?;
        println!("{} records staged in {}", lines.len(), dest.staging_file.display());
        return Ok(());
    }

    let bq = bigquery.ok_or_else(|| anyhow!("Missing bigquery section in config file"))?;
    let warehouse = BigQueryClient::new(client, bq.access_token.clone(), &bq.project, &bq.endpoint)?
        .with_location(&bq.location)
        .log_existing(bq.log_existing);
    let target = Target {
        table: TableRef::new(&bq.dataset, dest.table),
        disposition: dest.disposition,
        poll: bq.poll_policy(),
        skip_empty: bq.skip_empty_loads,
    };

    let summary = pipeline::run(source, dest.staging_file, &warehouse, &target).await?;
    match summary.load {
        Some(load) => info!(
            table = %target.table,
            job_id = %load.job_id,
            rows = load.output_rows.unwrap_or_default(),
            skipped = summary.stage.skipped,
            "load complete"
        ),
        None => info!(table = %target.table, "empty batch, table left as it was"),
    }

    Ok(())
}
