use async_trait::async_trait;
use reqwest::header::{ACCEPT_ENCODING, AUTHORIZATION};
use reqwest::{Client, Method, Response, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::ads::model::{DataResponse, EntityResp, ErrorResp, JobResp, ListResponse};
use crate::config::Config;
use crate::error::{ReportError, Result};
use crate::model::{EntityKind, EntityPage, JobDetails, JobId, JobRequest, JobStatus};

pub mod model;

const ADS_API_BASE: &str = "https://ads-api.twitter.com/";
const DEFAULT_API_VERSION: &str = "12";
const LIST_PAGE_SIZE: &str = "1000";

/// Operations consumed from the remote ads platform.
#[async_trait]
pub trait AdsService: Send + Sync {
    /// Fetch one page of entities of `kind`; `cursor` is the previous page's
    /// `next_cursor`.
    async fn list_entities(&self, kind: EntityKind, cursor: Option<&str>) -> Result<EntityPage>;

    /// Create an asynchronous stats job and return its id.
    async fn create_job(&self, request: &JobRequest) -> Result<JobId>;

    /// Current details of `job_id`, or `None` when the platform returned no
    /// entry for it yet.
    async fn job_details(&self, job_id: &str) -> Result<Option<JobDetails>>;

    /// Raw (still compressed) body behind a report download url.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// Transport limits applied to every request, downloads included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            user_agent: "ads-report/0.1".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct AdsClient {
    http: Client,
    download_http: Client,
    base_url: Url,
    api_version: String,
    account_id: String,
    token: String,
}

impl fmt::Debug for AdsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdsClient")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

impl AdsClient {
    pub fn new(account_id: String, token: String) -> Result<Self> {
        let base_url = Url::parse(ADS_API_BASE)
            .map_err(|e| ReportError::remote("client setup", e.to_string()))?;
        Self::with_base_url(base_url, DEFAULT_API_VERSION.into(), account_id, token)
    }

    pub fn with_base_url(
        base_url: Url,
        api_version: String,
        account_id: String,
        token: String,
    ) -> Result<Self> {
        Self::with_settings(base_url, api_version, account_id, token, HttpSettings::default())
    }

    pub fn with_settings(
        base_url: Url,
        api_version: String,
        account_id: String,
        token: String,
        settings: HttpSettings,
    ) -> Result<Self> {
        let builder = || {
            Client::builder()
                .connect_timeout(settings.connect_timeout)
                .timeout(settings.request_timeout)
                .user_agent(&settings.user_agent)
        };
        let http = builder()
            .build()
            .map_err(|e| ReportError::remote("client setup", e.to_string()))?;
        // Report files are gzip objects; keep the body compressed so the
        // fetcher sees exactly what was stored.
        let download_http = builder()
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()
            .map_err(|e| ReportError::remote("client setup", e.to_string()))?;
        Ok(Self {
            http,
            download_http,
            base_url,
            api_version,
            account_id,
            token,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(cfg.ads.base_url.trim())
            .map_err(|e| ReportError::remote("client setup", e.to_string()))?;
        Self::with_settings(
            base_url,
            cfg.ads.api_version.trim().to_string(),
            cfg.ads.account_id.trim().to_string(),
            cfg.ads.bearer_token.clone(),
            HttpSettings {
                connect_timeout: Duration::from_secs(cfg.ads.connect_timeout_seconds),
                request_timeout: Duration::from_secs(cfg.ads.request_timeout_seconds),
                ..HttpSettings::default()
            },
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(&format!("{}/{}", self.api_version, path))
            .map_err(|e| ReportError::remote("build url", e.to_string()))
    }

    fn jobs_endpoint(&self) -> Result<Url> {
        self.endpoint(&format!("stats/jobs/accounts/{}", self.account_id))
    }

    fn authorized(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
    }

    pub fn build_list_request(
        &self,
        kind: EntityKind,
        cursor: Option<&str>,
    ) -> Result<reqwest::Request> {
        let url = self.endpoint(&format!(
            "accounts/{}/{}",
            self.account_id,
            kind.listing_path()
        ))?;
        let mut query = vec![("count", LIST_PAGE_SIZE)];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }
        self.authorized(Method::GET, url)
            .query(&query)
            .build()
            .map_err(|e| ReportError::remote("list entities", e.to_string()))
    }

    pub fn build_create_job_request(&self, request: &JobRequest) -> Result<reqwest::Request> {
        self.authorized(Method::POST, self.jobs_endpoint()?)
            .query(&request.query_pairs())
            .build()
            .map_err(|e| ReportError::remote("create job", e.to_string()))
    }

    pub fn build_status_request(&self, job_id: &str) -> Result<reqwest::Request> {
        self.authorized(Method::GET, self.jobs_endpoint()?)
            .query(&[("job_ids", job_id)])
            .build()
            .map_err(|e| ReportError::remote("job status", e.to_string()))
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::Request,
    ) -> Result<T> {
        debug!(method = %request.method(), url = %request.url(), operation, "ads API request");
        let res = self
            .http
            .execute(request)
            .await
            .map_err(|e| ReportError::remote(operation, e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let message = error_message(res).await;
            warn!(operation, %status, %message, "ads API error");
            return Err(ReportError::RemoteApi {
                operation: operation.to_string(),
                status: Some(status.as_u16()),
                message,
            });
        }

        let body = res
            .text()
            .await
            .map_err(|e| ReportError::remote(operation, format!("failed to read response: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| ReportError::remote(operation, format!("invalid response JSON: {e}")))
    }
}

/// Flatten the platform's `errors` array into one message, falling back to
/// the raw body.
async fn error_message(res: Response) -> String {
    let body = res.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResp>(&body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed
            .errors
            .iter()
            .map(|e| match &e.code {
                Some(code) => format!("{code}: {}", e.message),
                None => e.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; "),
        _ => body,
    }
}

#[async_trait]
impl AdsService for AdsClient {
    async fn list_entities(&self, kind: EntityKind, cursor: Option<&str>) -> Result<EntityPage> {
        let request = self.build_list_request(kind, cursor)?;
        let page: ListResponse<EntityResp> = self
            .execute_json(&format!("list {}", kind.listing_path()), request)
            .await?;
        Ok(EntityPage {
            entities: page.data.into_iter().map(|e| (e.id, e.name)).collect(),
            next_cursor: page.next_cursor.filter(|c| !c.is_empty()),
        })
    }

    async fn create_job(&self, request: &JobRequest) -> Result<JobId> {
        let http_request = self.build_create_job_request(request)?;
        let created: DataResponse<JobResp> = self.execute_json("create job", http_request).await?;
        info!(
            job_id = %created.data.id_str,
            entities = request.entity_ids.len(),
            "created stats job"
        );
        Ok(created.data.id_str)
    }

    async fn job_details(&self, job_id: &str) -> Result<Option<JobDetails>> {
        let request = self.build_status_request(job_id)?;
        let page: ListResponse<JobResp> = self.execute_json("job status", request).await?;
        Ok(page
            .data
            .into_iter()
            .find(|j| j.id_str == job_id)
            .map(|j| JobDetails {
                status: JobStatus::parse(&j.status),
                id: j.id_str,
                url: j.url.filter(|u| !u.is_empty()),
            }))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let res = self
            .download_http
            .get(url)
            .header(ACCEPT_ENCODING, "gzip")
            .send()
            .await
            .map_err(|e| ReportError::Download {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let status = res.status();
        if !status.is_success() {
            return Err(ReportError::Download {
                url: url.to_string(),
                message: format!("HTTP {status}"),
            });
        }
        let bytes = res.bytes().await.map_err(|e| ReportError::Download {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}
