use chrono::{DateTime, Duration, LocalResult, NaiveTime, TimeZone, Utc};
use chrono_tz::America::Los_Angeles;

/// Reference zone in which the upstream daily quota rolls over
pub const RESET_TIME_ZONE: chrono_tz::Tz = Los_Angeles;

/// Next Pacific midnight strictly after `now`.
///
/// Computed on the local calendar, so the period is 23 or 25 hours long on
/// daylight-saving transition days.
pub fn next_reset_after(now: DateTime<Utc>) -> DateTime<Utc> {
    let local_date = now.with_timezone(&RESET_TIME_ZONE).date_naive();
    let next_date = local_date.succ_opt().unwrap_or(local_date);
    let midnight = next_date.and_time(NaiveTime::MIN);

    match RESET_TIME_ZONE.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // Midnight skipped by a forward shift: the day starts one hour later
        LocalResult::None => RESET_TIME_ZONE
            .from_local_datetime(&(midnight + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| now + Duration::hours(24)),
    }
}

/// Epoch-millisecond form of [`next_reset_after`]
pub fn next_reset_millis(now: DateTime<Utc>) -> i64 {
    next_reset_after(now).timestamp_millis()
}

/// Whether a record whose reset boundary is `reset_time_ms` is due at `now`
pub fn is_reset_due(reset_time_ms: i64, now: DateTime<Utc>) -> bool {
    now.timestamp_millis() >= reset_time_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_standard_day_is_midnight_pst() {
        let next = next_reset_after(utc("2024-01-15T20:00:00Z"));
        assert_eq!(next, utc("2024-01-16T08:00:00Z"));
    }

    #[test]
    fn test_utc_evening_already_next_local_day() {
        // 2024-07-01T05:00Z is still June 30 in Los Angeles (PDT)
        let next = next_reset_after(utc("2024-07-01T05:00:00Z"));
        assert_eq!(next, utc("2024-07-01T07:00:00Z"));
    }

    #[test]
    fn test_spring_forward_day_is_23_hours() {
        let start = utc("2024-03-10T08:00:00Z"); // 2024-03-10 00:00 PST
        let next = next_reset_after(start);
        assert_eq!(next, utc("2024-03-11T07:00:00Z")); // 2024-03-11 00:00 PDT
        assert_ne!(next, start + Duration::hours(24));
        assert_eq!(next - start, Duration::hours(23));
    }

    #[test]
    fn test_fall_back_day_is_25_hours() {
        let start = utc("2024-11-03T07:00:00Z"); // 2024-11-03 00:00 PDT
        let next = next_reset_after(start);
        assert_eq!(next, utc("2024-11-04T08:00:00Z")); // 2024-11-04 00:00 PST
        assert_ne!(next, start + Duration::hours(24));
        assert_eq!(next - start, Duration::hours(25));
    }

    #[test]
    fn test_exact_midnight_moves_to_following_day() {
        let midnight = utc("2024-01-16T08:00:00Z");
        assert_eq!(next_reset_after(midnight), utc("2024-01-17T08:00:00Z"));
    }

    #[test]
    fn test_reset_due_at_boundary() {
        let boundary = utc("2024-01-16T08:00:00Z");
        let ms = boundary.timestamp_millis();
        assert!(!is_reset_due(ms, boundary - Duration::milliseconds(1)));
        assert!(is_reset_due(ms, boundary));
        assert!(is_reset_due(ms, boundary + Duration::hours(3)));
    }
}
