use serde::{Deserialize, Serialize};

/// Quota consumption of one application within the current reset period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUsage {
    pub quota_units_used: u64,
    /// Next reset boundary, epoch milliseconds
    pub quota_reset_time: i64,
    /// Last mutation, epoch milliseconds
    pub last_updated: i64,
}

impl QuotaUsage {
    pub fn new(quota_reset_time: i64, now_ms: i64) -> Self {
        Self {
            quota_units_used: 0,
            quota_reset_time,
            last_updated: now_ms,
        }
    }

    /// Whole percentage of `daily_quota` consumed, floor-truncated and capped at 100.
    ///
    /// Returns `None` when the quota is not positive, since the percentage is undefined.
    pub fn percentage_of(&self, daily_quota: i64) -> Option<u8> {
        usage_percentage(self.quota_units_used, daily_quota)
    }
}

/// Floor of `used * 100 / daily_quota`, capped at 100.
pub fn usage_percentage(used: u64, daily_quota: i64) -> Option<u8> {
    percentage_level(used, daily_quota).map(|level| level.min(100) as u8)
}

/// Uncapped floor of `used * 100 / daily_quota`.
pub(crate) fn percentage_level(used: u64, daily_quota: i64) -> Option<u64> {
    if daily_quota <= 0 {
        return None;
    }
    let level = u128::from(used) * 100 / daily_quota as u128;
    Some(u64::try_from(level).unwrap_or(u64::MAX))
}

/// Per-application quota settings, owned by the host's account configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaSettings {
    pub daily_quota: i64,
    pub max_stream_hours: f64,
    #[serde(default)]
    pub override_polling_delay: bool,
    #[serde(default)]
    pub custom_polling_delay_seconds: u64,
}

impl QuotaSettings {
    pub fn new(daily_quota: i64, max_stream_hours: f64) -> Self {
        Self {
            daily_quota,
            max_stream_hours,
            override_polling_delay: false,
            custom_polling_delay_seconds: 0,
        }
    }
}
