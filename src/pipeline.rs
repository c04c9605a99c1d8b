//! End-to-end orchestration of one report download.
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::ads::AdsService;
use crate::batch::partition;
use crate::config::{Config, ReportParams};
use crate::error::Result;
use crate::fetch::ReportFetcher;
use crate::merge::{merge, render};
use crate::model::MAX_ENTITY_IDS_PER_QUERY;
use crate::output::OutputSink;
use crate::poller::JobPoller;
use crate::resolver::EntityResolver;
use crate::submit::{submit_all, JobTemplate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub job_timeout: Duration,
    pub max_status_failures: u32,
    pub max_concurrent_jobs: usize,
    pub batch_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(600),
            max_status_failures: 3,
            max_concurrent_jobs: 1,
            batch_size: MAX_ENTITY_IDS_PER_QUERY,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            job_timeout: cfg.app.job_timeout(),
            max_status_failures: cfg.app.max_status_failures,
            max_concurrent_jobs: cfg.app.max_concurrent_jobs,
            batch_size: MAX_ENTITY_IDS_PER_QUERY,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub entities: usize,
    pub jobs: usize,
    pub records: usize,
}

/// One downloader session: owns the entity-name cache and drives
/// resolve → batch → submit → poll → fetch → merge → write.
pub struct ReportDownloader {
    service: Arc<dyn AdsService>,
    settings: PipelineSettings,
    resolver: EntityResolver,
    cancel: CancellationToken,
}

impl ReportDownloader {
    pub fn new(service: Arc<dyn AdsService>, settings: PipelineSettings) -> Self {
        Self {
            service,
            settings,
            resolver: EntityResolver::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts in-flight polls and downloads when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the whole pipeline. The sink is truncated before any remote call
    /// and only receives content once every stage has succeeded.
    #[instrument(skip_all, fields(output = %sink.path().display()))]
    pub async fn download(&mut self, params: &ReportParams, sink: &OutputSink) -> Result<RunSummary> {
        sink.prepare().await?;
        let template = JobTemplate::from_params(params)?;

        let service = self.service.as_ref();
        let entities = self.resolver.resolve(service, template.entity).await?;

        let batches = partition(entities.ids(), self.settings.batch_size);
        info!(entities = entities.len(), batches = batches.len(), "submitting stats jobs");
        let job_ids = submit_all(service, &template, &batches).await?;

        let poller = JobPoller::new(
            service,
            self.settings.job_timeout,
            self.settings.max_status_failures,
            self.cancel.clone(),
        );
        let urls = poller
            .await_all(&job_ids, self.settings.max_concurrent_jobs)
            .await?;

        let fetcher = ReportFetcher::new(service, self.cancel.clone());
        let raw_reports = fetcher
            .fetch_all(&urls, self.settings.max_concurrent_jobs)
            .await?;

        let merged = merge(&raw_reports, entities)?;
        sink.write(&render(&merged)?).await?;

        let summary = RunSummary {
            entities: entities.len(),
            jobs: job_ids.len(),
            records: merged.len(),
        };
        info!(records = summary.records, jobs = summary.jobs, "report written");
        Ok(summary)
    }
}
