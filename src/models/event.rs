use serde::{Deserialize, Serialize};

/// Notifications published to the host's event bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QuotaEvent {
    /// Usage reached `threshold` percent of the daily quota
    #[serde(rename_all = "camelCase")]
    ThresholdCrossed {
        application_id: String,
        application_name: String,
        quota_consumed: u64,
        quota_limit: i64,
        threshold: u8,
    },
    /// Active traffic moved from `previous_application_id` to `application_id`
    #[serde(rename_all = "camelCase")]
    FailoverCompleted {
        previous_application_id: String,
        application_id: String,
        application_name: String,
        quota_consumed: u64,
        quota_limit: i64,
        threshold: u8,
    },
}
