use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use ads_report::ads::AdsClient;
use ads_report::config;
use ads_report::output::OutputSink;
use ads_report::pipeline::{PipelineSettings, ReportDownloader};

#[derive(Debug, Parser)]
#[command(author, version, about = "Download and merge asynchronous ads stats reports")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print an example config file and exit
    #[arg(long)]
    example_config: bool,

    /// Entity type to report on (only CAMPAIGN is supported)
    #[arg(long)]
    entity: Option<String>,

    /// Comma separated metric groups; whitespace is ignored
    #[arg(long)]
    metric_groups: Option<String>,

    #[arg(long)]
    start_time: Option<String>,

    #[arg(long)]
    end_time: Option<String>,

    #[arg(long)]
    granularity: Option<String>,

    #[arg(long)]
    placement: Option<String>,

    #[arg(long)]
    segmentation_type: Option<String>,

    /// Include deleted entities in the stats; `--with-deleted false` turns
    /// off a config value of `true`
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        action = clap::ArgAction::Set
    )]
    with_deleted: Option<bool>,

    /// Output file for the merged JSON report
    #[arg(long)]
    output: Option<PathBuf>,

    /// Per-job timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if args.example_config {
        print!("{}", config::example());
        return Ok(());
    }

    let mut cfg = config::load(Some(args.config.as_path()))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    apply_overrides(&mut cfg, &args);
    config::validate(&cfg)?;

    let output = cfg
        .report
        .output
        .clone()
        .context("no output file configured (report.output or --output)")?;
    let sink = OutputSink::new(output);

    let client = AdsClient::from_config(&cfg)?;
    let mut downloader = ReportDownloader::new(Arc::new(client), PipelineSettings::from_config(&cfg));

    let cancel = downloader.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling");
            cancel.cancel();
        }
    });

    match downloader.download(&cfg.report, &sink).await {
        Ok(summary) => {
            info!(
                entities = summary.entities,
                jobs = summary.jobs,
                records = summary.records,
                output = %sink.path().display(),
                "done"
            );
            Ok(())
        }
        Err(err) => {
            error!(%err, "report download failed");
            Err(err.into())
        }
    }
}

fn apply_overrides(cfg: &mut config::Config, args: &Args) {
    let report = &mut cfg.report;
    let overrides = [
        (&mut report.entity, &args.entity),
        (&mut report.metric_groups, &args.metric_groups),
        (&mut report.start_time, &args.start_time),
        (&mut report.end_time, &args.end_time),
        (&mut report.granularity, &args.granularity),
        (&mut report.placement, &args.placement),
        (&mut report.segmentation_type, &args.segmentation_type),
    ];
    for (slot, value) in overrides {
        if value.is_some() {
            *slot = value.clone();
        }
    }
    if let Some(with_deleted) = args.with_deleted {
        report.with_deleted = with_deleted;
    }
    if args.output.is_some() {
        report.output = args.output.clone();
    }
    if let Some(timeout) = args.timeout {
        cfg.app.job_timeout_seconds = timeout;
    }
}
