//! Error taxonomy for the report pipeline.
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReportError>;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("invalid parameter `{field}`: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("entity type '{0}' is not recognized or unsupported")]
    UnsupportedEntity(String),

    #[error("ads API error during {operation}{}: {message}", http_suffix(.status))]
    RemoteApi {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    #[error("job {job_id} did not succeed within {timeout:?} (last status: {last_status})")]
    JobTimeout {
        job_id: String,
        timeout: Duration,
        last_status: String,
    },

    #[error("failed to download report from {url}: {message}")]
    Download { url: String, message: String },

    #[error("failed to decode report from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("malformed report #{index}: {reason}")]
    MalformedReport { index: usize, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("output {}: {source}", .path.display())]
    Sink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn http_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl ReportError {
    pub fn missing(field: &'static str) -> Self {
        ReportError::Validation {
            field,
            reason: "must be present and non-empty".into(),
        }
    }

    pub fn remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        ReportError::RemoteApi {
            operation: operation.into(),
            status: None,
            message: message.into(),
        }
    }
}
