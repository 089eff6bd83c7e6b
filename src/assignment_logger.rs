use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Assignment served by the config service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEvent {
    pub project_id: String,
    pub experiment_id: String,
    pub variant_id: String,
    pub visitor_id: String,
    pub is_control: bool,
    pub bucket_value: u32,
    /// RFC 3339 time the assignment was computed.
    pub timestamp: String,
    pub meta_data: HashMap<String, String>,
}

pub trait AssignmentLogger {
    fn log_assignment(&self, event: AssignmentEvent);
}

pub(crate) struct NoopAssignmentLogger;
impl AssignmentLogger for NoopAssignmentLogger {
    fn log_assignment(&self, _event: AssignmentEvent) {}
}

impl<T: Fn(AssignmentEvent)> AssignmentLogger for T {
    fn log_assignment(&self, event: AssignmentEvent) {
        self(event);
    }
}
