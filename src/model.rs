use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ReportError;

pub type EntityId = String;
pub type JobId = String;
pub type DownloadUrl = String;
pub type RawReport = String;
pub type MergedReport = Vec<serde_json::Value>;

/// Platform cap on the number of entity ids a single stats job may cover.
pub const MAX_ENTITY_IDS_PER_QUERY: usize = 20;

/// Reportable entity kinds. Each kind knows how it is named in job requests
/// and where its listing lives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Campaign,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Campaign => "CAMPAIGN",
        }
    }

    /// Account-relative path segment of the paginated listing endpoint.
    pub fn listing_path(&self) -> &'static str {
        match self {
            EntityKind::Campaign => "campaigns",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "CAMPAIGN" => Ok(EntityKind::Campaign),
            other => Err(ReportError::UnsupportedEntity(other.to_string())),
        }
    }
}

/// Execution status of an asynchronous stats job as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Processing,
    Success,
    Failed,
    Unknown(String),
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "QUEUED" => JobStatus::Queued,
            "PROCESSING" => JobStatus::Processing,
            "SUCCESS" => JobStatus::Success,
            "FAILED" => JobStatus::Failed,
            other => JobStatus::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failed => "FAILED",
            JobStatus::Unknown(s) => s,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest known state of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDetails {
    pub id: JobId,
    pub status: JobStatus,
    pub url: Option<DownloadUrl>,
}

/// One page of an entity listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityPage {
    pub entities: Vec<(EntityId, Option<String>)>,
    pub next_cursor: Option<String>,
}

/// Parameters of one asynchronous stats job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub entity: EntityKind,
    pub entity_ids: Vec<EntityId>,
    pub start_time: String,
    pub end_time: String,
    pub granularity: String,
    pub metric_groups: String,
    pub placement: String,
    pub segmentation_type: Option<String>,
    pub with_deleted: bool,
}

impl JobRequest {
    /// Query parameters in the order the stats endpoint documents them.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("entity", self.entity.as_str().to_string()),
            ("entity_ids", self.entity_ids.join(",")),
            ("start_time", self.start_time.clone()),
            ("end_time", self.end_time.clone()),
            ("with_deleted", self.with_deleted.to_string()),
            ("granularity", self.granularity.clone()),
            ("metric_groups", self.metric_groups.clone()),
            ("placement", self.placement.clone()),
        ];
        if let Some(seg) = self.segmentation_type.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("segmentation_type", seg.to_string()));
        }
        pairs
    }
}

/// Entity id → display name, in listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityInfo {
    ids: Vec<EntityId>,
    names: HashMap<EntityId, Option<String>>,
}

impl EntityInfo {
    pub fn insert(&mut self, id: EntityId, name: Option<String>) {
        if !self.names.contains_key(&id) {
            self.ids.push(id.clone());
        }
        self.names.insert(id, name);
    }

    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    /// Resolved name, or `None` when the id is unknown or unnamed.
    pub fn name(&self, id: &str) -> Option<&str> {
        self.names.get(id).and_then(|n| n.as_deref())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<I: Into<EntityId>, N: Into<String>> FromIterator<(I, N)> for EntityInfo {
    fn from_iter<T: IntoIterator<Item = (I, N)>>(iter: T) -> Self {
        let mut info = EntityInfo::default();
        for (id, name) in iter {
            info.insert(id.into(), Some(name.into()));
        }
        info
    }
}
