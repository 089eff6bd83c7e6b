//! Exposure events reported by the delivery snippet once a variant has been applied to the page.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureType {
    Exposure,
}

/// Beacon payload sent to the events endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureEvent {
    #[serde(rename = "type")]
    pub kind: ExposureType,
    pub project_id: String,
    pub experiment_id: String,
    pub variant_id: String,
    /// Visitor id, named after the snippet's field.
    pub user_id: String,
    /// Milliseconds since the Unix epoch, as reported by the browser.
    pub timestamp: i64,
}

impl ExposureEvent {
    pub fn new(
        project_id: impl Into<String>,
        experiment_id: impl Into<String>,
        variant_id: impl Into<String>,
        visitor_id: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: ExposureType::Exposure,
            project_id: project_id.into(),
            experiment_id: experiment_id.into(),
            variant_id: variant_id.into(),
            user_id: visitor_id.into(),
            timestamp: at.timestamp_millis(),
        }
    }

    /// Parse a beacon body.
    pub fn from_beacon(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }

    /// Time of exposure, `None` if the browser clock reported an out-of-range value.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}
