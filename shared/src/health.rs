use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

/// Outcome of a single health check. The derived ordering ranks statuses
/// from healthiest to least healthy, so the aggregate over a report is the
/// maximum of its checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passing,
    Degraded,
    Failing,
}

/// Structured diagnostic payload attached to a check.
pub type CheckData = BTreeMap<String, serde_json::Value>;

/// One named health check with its outcome and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "CheckData::is_empty", default)]
    pub data: CheckData,
}

/// Aggregated health report: the checks in evaluation order plus the
/// overall status reduced from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: Status,
    pub checks: Vec<Check>,
}

/// Wire envelope for the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub health: Health,
}
