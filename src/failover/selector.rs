//! Ranking of failover candidates.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::{Application, QuotaUsage};
use crate::modules::ledger::QuotaLedger;

/// An application eligible to take over traffic, with its usage at ranking time
#[derive(Debug, Clone, PartialEq)]
pub struct FailoverCandidate {
    pub application: Application,
    /// Floor-truncated, 0..=100
    pub usage_percent: u8,
    pub usage: Option<QuotaUsage>,
}

impl FailoverCandidate {
    pub fn units_used(&self) -> u64 {
        self.usage.as_ref().map(|u| u.quota_units_used).unwrap_or(0)
    }
}

/// Strict total order: lower usage, then larger quota, then name
/// (case-insensitive), then identifier.
fn compare_candidates(a: &FailoverCandidate, b: &FailoverCandidate) -> Ordering {
    a.usage_percent
        .cmp(&b.usage_percent)
        .then_with(|| b.application.daily_quota().cmp(&a.application.daily_quota()))
        .then_with(|| {
            a.application
                .name
                .to_lowercase()
                .cmp(&b.application.name.to_lowercase())
        })
        .then_with(|| a.application.id.cmp(&b.application.id))
}

pub fn rank_candidates(
    applications: &[Application],
    ledger: &QuotaLedger,
    active_application_id: Option<&str>,
    threshold_percent: u8,
) -> Vec<FailoverCandidate> {
    rank_candidates_at(
        applications,
        ledger,
        active_application_id,
        threshold_percent,
        Utc::now(),
    )
}

/// Rank the applications that could replace the active one.
///
/// Excludes the active application, applications without a positive daily
/// quota, and applications already at or above `threshold_percent` (clamped
/// to `[1, 100]`). Repeated identifiers keep their first occurrence.
pub fn rank_candidates_at(
    applications: &[Application],
    ledger: &QuotaLedger,
    active_application_id: Option<&str>,
    threshold_percent: u8,
    now: DateTime<Utc>,
) -> Vec<FailoverCandidate> {
    let threshold = threshold_percent.clamp(1, 100);
    let mut seen = HashSet::new();

    let mut candidates: Vec<FailoverCandidate> = applications
        .iter()
        .filter(|app| active_application_id != Some(app.id.as_str()))
        .filter(|app| seen.insert(app.id.clone()))
        .filter_map(|app| {
            let usage = ledger.get_usage_at(&app.id, now);
            let used = usage.as_ref().map(|u| u.quota_units_used).unwrap_or(0);
            let usage_percent = crate::models::usage_percentage(used, app.daily_quota())?;
            if usage_percent >= threshold {
                return None;
            }
            Some(FailoverCandidate {
                application: app.clone(),
                usage_percent,
                usage,
            })
        })
        .collect();

    candidates.sort_by(compare_candidates);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuotaSettings;
    use std::time::Duration;

    fn app(id: &str, name: &str, daily_quota: i64) -> Application {
        Application::new(id, name, QuotaSettings::new(daily_quota, 8.0))
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-15T18:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn ledger(dir: &tempfile::TempDir) -> QuotaLedger {
        QuotaLedger::load(dir.path().join("usage.json"), Duration::from_secs(60))
    }

    fn ids(candidates: &[FailoverCandidate]) -> Vec<&str> {
        candidates
            .iter()
            .map(|c| c.application.id.as_str())
            .collect()
    }

    #[test]
    fn test_tie_on_usage_prefers_larger_quota() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);
        let small = app("small", "Small", 8_000);
        let large = app("large", "Large", 10_000);
        let busy = app("busy", "Busy", 10_000);
        ledger.record_usage_at("small", 400, now()); // 5%
        ledger.record_usage_at("large", 500, now()); // 5%
        ledger.record_usage_at("busy", 1_000, now()); // 10%

        let orders = [
            vec![small.clone(), large.clone(), busy.clone()],
            vec![busy.clone(), small.clone(), large.clone()],
            vec![large.clone(), busy.clone(), small.clone()],
        ];
        for roster in orders {
            let ranked = rank_candidates_at(&roster, &ledger, None, 95, now());
            assert_eq!(ids(&ranked), vec!["large", "small", "busy"]);
        }
    }

    #[test]
    fn test_name_then_id_break_remaining_ties() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);
        let roster = vec![
            app("b-2", "beta", 10_000),
            app("a-1", "Alpha", 10_000),
            app("b-1", "Beta", 10_000),
        ];
        let ranked = rank_candidates_at(&roster, &ledger, None, 95, now());
        assert_eq!(ids(&ranked), vec!["a-1", "b-1", "b-2"]);
    }

    #[test]
    fn test_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);
        ledger.record_usage_at("at-threshold", 9_000, now()); // 90%
        ledger.record_usage_at("below", 8_999, now()); // 89%
        let roster = vec![
            app("active", "Active", 10_000),
            app("no-quota", "Unset", 0),
            app("at-threshold", "Full", 10_000),
            app("below", "Below", 10_000),
        ];

        let ranked = rank_candidates_at(&roster, &ledger, Some("active"), 90, now());
        assert_eq!(ids(&ranked), vec!["below"]);
        assert_eq!(ranked[0].usage_percent, 89);
        assert_eq!(ranked[0].units_used(), 8_999);
    }

    #[test]
    fn test_threshold_clamped_to_at_least_one() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);
        let roster = vec![app("fresh", "Fresh", 10_000)];
        let ranked = rank_candidates_at(&roster, &ledger, None, 0, now());
        assert_eq!(ids(&ranked), vec!["fresh"]);
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);
        let roster = vec![app("dup", "First", 10_000), app("dup", "Second", 20_000)];
        let ranked = rank_candidates_at(&roster, &ledger, None, 95, now());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].application.name, "First");
    }

    #[test]
    fn test_empty_when_everyone_at_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);
        ledger.record_usage_at("a", 9_600, now());
        ledger.record_usage_at("b", 12_000, now());
        let roster = vec![app("a", "A", 10_000), app("b", "B", 10_000)];
        assert!(rank_candidates_at(&roster, &ledger, None, 95, now()).is_empty());
    }
}
