//! Polling cadence derived from a daily quota budget.
//!
//! With `budget = daily_quota * target_utilization` and `calls = budget / cost`,
//! the extra wait per call solves
//! `(min_call_duration + wait) * calls = max_stream_hours * 3600`, using the
//! form `wait = (stream_secs - calls * min_call_duration) / (calls - 1)`. The
//! returned interval is start-to-start: `min_call_duration + wait`, rounded to
//! whole seconds, with `wait` floored at zero.
//!
//! As `calls` approaches 1 the denominator vanishes; budgets allowing fewer
//! than [`MIN_CALLS_PER_DAY`] calls are rejected instead of producing a huge or
//! clamped interval.

use std::time::Duration;

use thiserror::Error;

use crate::models::{PollingConfig, QuotaSettings};

/// Smallest number of poll calls per day the formula is evaluated for
pub const MIN_CALLS_PER_DAY: f64 = 2.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DelayError {
    #[error("daily quota must be positive (got {0})")]
    InvalidDailyQuota(i64),

    #[error("max stream hours must be positive (got {0})")]
    InvalidStreamHours(f64),

    #[error("quota budget allows only {calls_per_day:.2} poll calls per day")]
    BudgetTooSmall { calls_per_day: f64 },
}

/// Compute the polling interval for `settings` under the given poll-call constants
pub fn calculate_delay(
    settings: &QuotaSettings,
    polling: &PollingConfig,
) -> Result<Duration, DelayError> {
    if settings.override_polling_delay {
        return Ok(Duration::from_secs(settings.custom_polling_delay_seconds));
    }

    let result = compute_interval(settings, polling);
    if let Err(e) = &result {
        tracing::error!(
            daily_quota = settings.daily_quota,
            max_stream_hours = settings.max_stream_hours,
            "Cannot compute polling delay: {}",
            e
        );
    }
    result
}

/// [`calculate_delay`] with the default poll-call constants
pub fn calculate_delay_with_defaults(settings: &QuotaSettings) -> Result<Duration, DelayError> {
    calculate_delay(settings, &PollingConfig::default())
}

fn compute_interval(
    settings: &QuotaSettings,
    polling: &PollingConfig,
) -> Result<Duration, DelayError> {
    if settings.daily_quota <= 0 {
        return Err(DelayError::InvalidDailyQuota(settings.daily_quota));
    }
    // Also rejects NaN
    if !(settings.max_stream_hours > 0.0) {
        return Err(DelayError::InvalidStreamHours(settings.max_stream_hours));
    }

    let cost = f64::from(polling.poll_call_cost.max(1));
    let budget = settings.daily_quota as f64 * polling.target_utilization;
    let calls_per_day = budget / cost;
    if !(calls_per_day >= MIN_CALLS_PER_DAY) {
        return Err(DelayError::BudgetTooSmall { calls_per_day });
    }

    let min_call = polling.min_call_duration_secs.max(0.0);
    let stream_secs = settings.max_stream_hours * 3600.0;
    let wait = ((stream_secs - calls_per_day * min_call) / (calls_per_day - 1.0)).max(0.0);

    let interval = (min_call + wait).round();
    Ok(Duration::from_secs(interval as u64))
}
