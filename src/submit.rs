//! Validates report parameters and submits one stats job per batch.
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, instrument};

use crate::ads::AdsService;
use crate::config::ReportParams;
use crate::error::{ReportError, Result};
use crate::model::{EntityId, EntityKind, JobId, JobRequest};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Strip every whitespace run from a metric group list.
pub fn normalize_metric_groups(raw: &str) -> String {
    WHITESPACE.replace_all(raw, "").into_owned()
}

/// Validated parameters shared by every job of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTemplate {
    pub entity: EntityKind,
    pub start_time: String,
    pub end_time: String,
    pub granularity: String,
    pub metric_groups: String,
    pub placement: String,
    pub segmentation_type: Option<String>,
    pub with_deleted: bool,
}

fn required(value: &Option<String>, field: &'static str) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ReportError::missing(field)),
    }
}

impl JobTemplate {
    pub fn from_params(params: &ReportParams) -> Result<Self> {
        let entity: EntityKind = required(&params.entity, "entity")?.parse()?;
        let metric_groups = normalize_metric_groups(&required(&params.metric_groups, "metric_groups")?);
        let start_time = required(&params.start_time, "start_time")?;
        let end_time = required(&params.end_time, "end_time")?;
        let granularity = required(&params.granularity, "granularity")?;
        let placement = required(&params.placement, "placement")?;
        let segmentation_type = params
            .segmentation_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            entity,
            start_time,
            end_time,
            granularity,
            metric_groups,
            placement,
            segmentation_type,
            with_deleted: params.with_deleted,
        })
    }

    pub fn for_batch(&self, batch: &[EntityId]) -> JobRequest {
        JobRequest {
            entity: self.entity,
            entity_ids: batch.to_vec(),
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
            granularity: self.granularity.clone(),
            metric_groups: self.metric_groups.clone(),
            placement: self.placement.clone(),
            segmentation_type: self.segmentation_type.clone(),
            with_deleted: self.with_deleted,
        }
    }
}

/// Submit one job per batch, in batch order. Stops at the first failure;
/// jobs already created are left to expire on the platform.
#[instrument(skip_all, fields(batches = batches.len()))]
pub async fn submit_all(
    service: &dyn AdsService,
    template: &JobTemplate,
    batches: &[&[EntityId]],
) -> Result<Vec<JobId>> {
    let mut job_ids = Vec::with_capacity(batches.len());
    for (index, batch) in batches.iter().enumerate() {
        let job_id = service.create_job(&template.for_batch(batch)).await?;
        info!(batch = index, %job_id, size = batch.len(), "submitted batch");
        job_ids.push(job_id);
    }
    Ok(job_ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ReportParams {
        ReportParams {
            entity: Some("CAMPAIGN".into()),
            metric_groups: Some("engagements, impressions".into()),
            start_time: Some("2026-10-01T00:00:00Z".into()),
            end_time: Some("2026-10-08T00:00:00Z".into()),
            granularity: Some("DAY".into()),
            placement: Some("ALL_ON_TWITTER".into()),
            segmentation_type: Some("  ".into()),
            with_deleted: true,
            output: None,
        }
    }

    #[test]
    fn metric_groups_lose_all_whitespace() {
        assert_eq!(
            normalize_metric_groups("engagements, impressions"),
            "engagements,impressions"
        );
        assert_eq!(normalize_metric_groups(" a ,\tb\n, c "), "a,b,c");
    }

    #[test]
    fn template_from_complete_params() {
        let template = JobTemplate::from_params(&params()).unwrap();
        assert_eq!(template.entity, EntityKind::Campaign);
        assert_eq!(template.metric_groups, "engagements,impressions");
        assert_eq!(template.segmentation_type, None);
        assert!(template.with_deleted);

        let request = template.for_batch(&["1".to_string(), "2".to_string()]);
        assert_eq!(request.entity_ids, vec!["1", "2"]);
        assert_eq!(request.granularity, "DAY");
    }

    #[test]
    fn missing_fields_are_named() {
        let cases: [(&str, fn(&mut ReportParams)); 6] = [
            ("entity", |p| p.entity = None),
            ("metric_groups", |p| p.metric_groups = Some(" ".into())),
            ("start_time", |p| p.start_time = None),
            ("end_time", |p| p.end_time = Some(String::new())),
            ("granularity", |p| p.granularity = None),
            ("placement", |p| p.placement = None),
        ];
        for (field, mutate) in cases {
            let mut p = params();
            mutate(&mut p);
            match JobTemplate::from_params(&p).unwrap_err() {
                ReportError::Validation { field: f, .. } => assert_eq!(f, field),
                other => panic!("unexpected error for {field}: {other}"),
            }
        }
    }

    #[test]
    fn unsupported_entity_is_rejected() {
        let mut p = params();
        p.entity = Some("PROMOTED_TWEET".into());
        assert!(matches!(
            JobTemplate::from_params(&p),
            Err(ReportError::UnsupportedEntity(_))
        ));
    }
}
