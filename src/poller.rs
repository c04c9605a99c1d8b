//! Polls asynchronous stats jobs until they succeed or run out of time.
use futures::stream::{self, StreamExt, TryStreamExt};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::ads::AdsService;
use crate::error::{ReportError, Result};
use crate::model::{DownloadUrl, JobId, JobStatus};

/// Waits for jobs to reach `SUCCESS`. Every job gets its own deadline of
/// `timeout` from the moment its poll loop starts, and is re-queried every
/// `timeout / 10`.
pub struct JobPoller<'a> {
    service: &'a dyn AdsService,
    timeout: Duration,
    max_status_failures: u32,
    cancel: CancellationToken,
}

impl<'a> JobPoller<'a> {
    pub fn new(
        service: &'a dyn AdsService,
        timeout: Duration,
        max_status_failures: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            timeout,
            max_status_failures,
            cancel,
        }
    }

    pub fn interval(&self) -> Duration {
        self.timeout / 10
    }

    #[instrument(skip(self), fields(timeout = ?self.timeout))]
    pub async fn await_completion(&self, job_id: &str) -> Result<DownloadUrl> {
        let deadline = Instant::now() + self.timeout;
        let interval = self.interval();
        let mut consecutive_failures = 0u32;
        let mut last_status = String::from("NOT_OBSERVED");

        loop {
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ReportError::Cancelled),
                res = self.service.job_details(job_id) => res,
                _ = tokio::time::sleep_until(deadline) => {
                    last_status = "STATUS_QUERY_PENDING".into();
                    break;
                }
            };

            match outcome {
                Ok(Some(details)) => {
                    consecutive_failures = 0;
                    if details.status == JobStatus::Success {
                        let url = details.url.ok_or_else(|| ReportError::RemoteApi {
                            operation: format!("status of job {job_id}"),
                            status: None,
                            message: "job succeeded without a download url".into(),
                        })?;
                        info!(job_id, "job ready");
                        return Ok(url);
                    }
                    debug!(job_id, status = %details.status, "job not ready");
                    last_status = details.status.to_string();
                }
                Ok(None) => {
                    consecutive_failures = 0;
                    debug!(job_id, "job not listed yet");
                    last_status = "NOT_LISTED".into();
                }
                Err(err) => {
                    consecutive_failures += 1;
                    if consecutive_failures > self.max_status_failures {
                        return Err(match err {
                            ReportError::RemoteApi { status, message, .. } => ReportError::RemoteApi {
                                operation: format!("status of job {job_id}"),
                                status,
                                message,
                            },
                            other => other,
                        });
                    }
                    warn!(
                        job_id,
                        attempt = consecutive_failures,
                        error = %err,
                        "status query failed; treating job as not ready"
                    );
                    last_status = format!("STATUS_QUERY_FAILED: {err}");
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ReportError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
            if Instant::now() > deadline {
                break;
            }
        }

        warn!(job_id, %last_status, "job timed out");
        Err(ReportError::JobTimeout {
            job_id: job_id.to_string(),
            timeout: self.timeout,
            last_status,
        })
    }

    /// Await every job, at most `concurrency` at a time. Urls come back in
    /// job order; the first failure aborts the remaining polls.
    pub async fn await_all(&self, job_ids: &[JobId], concurrency: usize) -> Result<Vec<DownloadUrl>> {
        stream::iter(job_ids)
            .map(|job_id| self.await_completion(job_id))
            .buffered(concurrency.max(1))
            .try_collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityKind, EntityPage, JobDetails, JobRequest};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    /// Jobs become `SUCCESS` once the paused clock passes their ready time.
    struct ScriptedJobs {
        start: Instant,
        ready_after: HashMap<String, Duration>,
        failures_left: AtomicU32,
        with_url: bool,
        stall: bool,
        calls: AtomicUsize,
    }

    impl ScriptedJobs {
        fn new(jobs: &[(&str, u64)]) -> Self {
            Self {
                start: Instant::now(),
                ready_after: jobs
                    .iter()
                    .map(|(id, secs)| (id.to_string(), Duration::from_secs(*secs)))
                    .collect(),
                failures_left: AtomicU32::new(0),
                with_url: true,
                stall: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_first(self, n: u32) -> Self {
            self.failures_left.store(n, Ordering::SeqCst);
            self
        }

        fn stalled(mut self) -> Self {
            self.stall = true;
            self
        }
    }

    #[async_trait]
    impl AdsService for ScriptedJobs {
        async fn list_entities(&self, _kind: EntityKind, _cursor: Option<&str>) -> Result<EntityPage> {
            unreachable!()
        }

        async fn create_job(&self, _request: &JobRequest) -> Result<JobId> {
            unreachable!()
        }

        async fn job_details(&self, job_id: &str) -> Result<Option<JobDetails>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.stall {
                std::future::pending::<()>().await;
            }
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(ReportError::remote("job status", "503 service unavailable"));
            }
            let ready = self.start.elapsed() >= self.ready_after[job_id];
            Ok(Some(JobDetails {
                id: job_id.to_string(),
                status: if ready { JobStatus::Success } else { JobStatus::Processing },
                url: (ready && self.with_url).then(|| format!("https://ton.example/{job_id}.json.gz")),
            }))
        }

        async fn download(&self, _url: &str) -> Result<Vec<u8>> {
            unreachable!()
        }
    }

    fn poller(service: &ScriptedJobs, timeout_secs: u64, max_failures: u32) -> JobPoller<'_> {
        JobPoller::new(
            service,
            Duration::from_secs(timeout_secs),
            max_failures,
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn returns_url_when_ready_before_deadline() {
        let service = ScriptedJobs::new(&[("j1", 4)]);
        let url = poller(&service, 10, 3).await_completion("j1").await.unwrap();
        assert_eq!(url, "https://ton.example/j1.json.gz");
        // queried at t = 0, 1, 2, 3, 4 seconds
        assert_eq!(service.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_ready_after_deadline() {
        let service = ScriptedJobs::new(&[("j1", 4)]);
        let err = poller(&service, 2, 3).await_completion("j1").await.unwrap_err();
        match err {
            ReportError::JobTimeout { job_id, timeout, last_status } => {
                assert_eq!(job_id, "j1");
                assert_eq!(timeout, Duration::from_secs(2));
                assert_eq!(last_status, "PROCESSING");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(service.start.elapsed() < Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_status_query_still_times_out_at_deadline() {
        let service = ScriptedJobs::new(&[("j1", 0)]).stalled();
        let polled = tokio::time::timeout(
            Duration::from_secs(3600),
            poller(&service, 10, 3).await_completion("j1"),
        )
        .await
        .expect("poll loop must end at its own deadline");
        match polled.unwrap_err() {
            ReportError::JobTimeout { job_id, last_status, .. } => {
                assert_eq!(job_id, "j1");
                assert_eq!(last_status, "STATUS_QUERY_PENDING");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert!(service.start.elapsed() <= Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_after_failed_queries_carries_the_query_error() {
        let service = ScriptedJobs::new(&[("j1", 0)]).failing_first(1000);
        let err = poller(&service, 2, 1000).await_completion("j1").await.unwrap_err();
        match err {
            ReportError::JobTimeout { last_status, .. } => {
                assert!(last_status.starts_with("STATUS_QUERY_FAILED"), "{last_status}");
                assert!(last_status.contains("503 service unavailable"), "{last_status}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tolerates_bounded_transient_failures() {
        let service = ScriptedJobs::new(&[("j1", 0)]).failing_first(3);
        let url = poller(&service, 10, 3).await_completion("j1").await.unwrap();
        assert!(url.ends_with("j1.json.gz"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn surfaces_persistent_status_failures() {
        let service = ScriptedJobs::new(&[("j1", 0)]).failing_first(10);
        let err = poller(&service, 10, 2).await_completion("j1").await.unwrap_err();
        match err {
            ReportError::RemoteApi { operation, .. } => assert_eq!(operation, "status of job j1"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn success_without_url_is_an_api_error() {
        let mut service = ScriptedJobs::new(&[("j1", 0)]);
        service.with_url = false;
        let err = poller(&service, 10, 3).await_completion("j1").await.unwrap_err();
        assert!(matches!(err, ReportError::RemoteApi { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_polling() {
        let service = ScriptedJobs::new(&[("j1", 1000)]);
        let cancel = CancellationToken::new();
        let poller = JobPoller::new(&service, Duration::from_secs(100), 3, cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            trigger.cancel();
        });

        let err = poller.await_completion("j1").await.unwrap_err();
        assert!(matches!(err, ReportError::Cancelled));
        assert!(service.start.elapsed() < Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_polling_keeps_job_order() {
        let service = ScriptedJobs::new(&[("slow", 6), ("fast", 1)]);
        let jobs = vec!["slow".to_string(), "fast".to_string()];
        let urls = poller(&service, 10, 3).await_all(&jobs, 2).await.unwrap();
        assert_eq!(
            urls,
            vec![
                "https://ton.example/slow.json.gz".to_string(),
                "https://ton.example/fast.json.gz".to_string(),
            ]
        );
        // both loops ran side by side rather than back to back
        assert!(service.start.elapsed() < Duration::from_secs(7));
    }
}
