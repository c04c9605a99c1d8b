//! Concatenates per-job reports and attaches entity names.
use serde_json::Value;

use crate::error::{ReportError, Result};
use crate::model::{EntityInfo, MergedReport, RawReport};

/// Merge `raw_reports` in order into one array, setting `name` on each
/// record from `entities` (`null` when the id is unknown).
pub fn merge(raw_reports: &[RawReport], entities: &EntityInfo) -> Result<MergedReport> {
    let mut merged = Vec::new();
    for (index, raw) in raw_reports.iter().enumerate() {
        let malformed = |reason: String| ReportError::MalformedReport { index, reason };

        let parsed: Value =
            serde_json::from_str(raw).map_err(|e| malformed(format!("invalid JSON: {e}")))?;
        let data = match parsed {
            Value::Object(mut top) => match top.remove("data") {
                Some(Value::Array(data)) => data,
                Some(_) => return Err(malformed("`data` is not an array".into())),
                None => return Err(malformed("missing `data` array".into())),
            },
            _ => return Err(malformed("top level is not an object".into())),
        };

        for (position, record) in data.into_iter().enumerate() {
            let Value::Object(mut record) = record else {
                return Err(malformed(format!("record {position} is not an object")));
            };
            let name = record
                .get("id")
                .and_then(Value::as_str)
                .and_then(|id| entities.name(id))
                .map_or(Value::Null, |n| Value::String(n.to_string()));
            record.insert("name".into(), name);
            merged.push(Value::Object(record));
        }
    }
    Ok(merged)
}

/// Serialize a merged report as one JSON array.
pub fn render(report: &MergedReport) -> Result<String> {
    serde_json::to_string(report).map_err(|e| ReportError::MalformedReport {
        index: 0,
        reason: format!("failed to serialize merged report: {e}"),
    })
}
