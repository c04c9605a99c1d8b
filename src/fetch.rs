//! Downloads and decompresses finished reports.
use flate2::read::GzDecoder;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::io::Read;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::ads::AdsService;
use crate::error::{ReportError, Result};
use crate::model::{DownloadUrl, RawReport};

pub struct ReportFetcher<'a> {
    service: &'a dyn AdsService,
    cancel: CancellationToken,
}

impl<'a> ReportFetcher<'a> {
    pub fn new(service: &'a dyn AdsService, cancel: CancellationToken) -> Self {
        Self { service, cancel }
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<RawReport> {
        let body = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ReportError::Cancelled),
            res = self.service.download(url) => res?,
        };
        let report = gunzip(url, &body)?;
        debug!(compressed = body.len(), decompressed = report.len(), "report downloaded");
        Ok(report)
    }

    /// Fetch every url, at most `concurrency` at a time, keeping url order.
    pub async fn fetch_all(&self, urls: &[DownloadUrl], concurrency: usize) -> Result<Vec<RawReport>> {
        stream::iter(urls)
            .map(|url| self.fetch(url))
            .buffered(concurrency.max(1))
            .try_collect()
            .await
    }
}

/// Decompress a whole gzip body into UTF-8 text.
pub fn gunzip(url: &str, body: &[u8]) -> Result<RawReport> {
    let decode_err = |message: String| ReportError::Decode {
        url: url.to_string(),
        message,
    };
    let mut bytes = Vec::new();
    GzDecoder::new(body)
        .read_to_end(&mut bytes)
        .map_err(|e| decode_err(format!("invalid gzip stream: {e}")))?;
    String::from_utf8(bytes).map_err(|e| decode_err(format!("report is not UTF-8: {e}")))
}
