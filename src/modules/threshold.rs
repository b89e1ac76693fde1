use std::ops::RangeInclusive;
use std::sync::Arc;

use super::events::EventSink;
use crate::models::quota::percentage_level;
use crate::models::{Application, QuotaEvent};

/// Integer percentage thresholds crossed when usage moves from `old_units` to `new_units`.
///
/// Covers `[max(1, old + 1), min(100, new)]`, so a jump over several points
/// reports each one. Empty when the quota is not positive or usage did not
/// reach a new level.
pub fn crossed_thresholds(old_units: u64, new_units: u64, daily_quota: i64) -> RangeInclusive<u8> {
    let empty = 1..=0;
    let (Some(old_level), Some(new_level)) = (
        percentage_level(old_units, daily_quota),
        percentage_level(new_units, daily_quota),
    ) else {
        return empty;
    };
    if new_level <= old_level {
        return empty;
    }

    let low = old_level.saturating_add(1).max(1);
    let high = new_level.min(100);
    if low > high {
        return empty;
    }
    (low as u8)..=(high as u8)
}

/// Emits one [`QuotaEvent::ThresholdCrossed`] per whole percentage point crossed
pub struct ThresholdNotifier {
    sink: Arc<dyn EventSink>,
}

impl ThresholdNotifier {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Publish crossings for a usage change and return the thresholds notified
    pub fn notify(&self, application: &Application, old_units: u64, new_units: u64) -> Vec<u8> {
        let daily_quota = application.daily_quota();
        if daily_quota <= 0 {
            tracing::debug!(
                application_id = %application.id,
                "Daily quota unknown, skipping threshold notification"
            );
            return Vec::new();
        }

        let crossed: Vec<u8> = crossed_thresholds(old_units, new_units, daily_quota).collect();
        for &threshold in &crossed {
            tracing::info!(
                application_id = %application.id,
                threshold,
                used = new_units,
                limit = daily_quota,
                "Quota threshold crossed"
            );
            self.sink.emit(QuotaEvent::ThresholdCrossed {
                application_id: application.id.clone(),
                application_name: application.name.clone(),
                quota_consumed: new_units,
                quota_limit: daily_quota,
                threshold,
            });
        }
        crossed
    }
}
