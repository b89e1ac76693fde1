//! Per-application quota ledger.
//!
//! Records are reset lazily: every read and write first runs [`QuotaLedger::touch_at`],
//! which rolls the record over when the stored reset boundary has passed. No
//! background timer is involved, so a record untouched across a boundary
//! corrects itself the next time it is accessed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::persistence::{self, DebouncedWriter};
use super::reset;
use crate::error::AppResult;
use crate::models::{usage_percentage, QuotaUsage};

/// Usage before and after a recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageUpdate {
    pub previous_units: u64,
    pub current: QuotaUsage,
}

pub struct QuotaLedger {
    entries: Arc<DashMap<String, QuotaUsage>>, // application_id -> usage
    writer: DebouncedWriter,
}

impl QuotaLedger {
    /// Load the ledger from `path`, falling back to an empty ledger
    pub fn load(path: PathBuf, debounce: Duration) -> Self {
        let entries: DashMap<String, QuotaUsage> =
            persistence::load_ledger(&path).into_iter().collect();
        let entries = Arc::new(entries);
        let writer = DebouncedWriter::new(path, debounce, entries.clone());
        Self { entries, writer }
    }

    /// Roll the record over if its reset boundary has passed.
    ///
    /// Returns `true` when a reset happened. Does not schedule a save.
    fn touch_at(&self, application_id: &str, now: DateTime<Utc>) -> bool {
        let Some(mut entry) = self.entries.get_mut(application_id) else {
            return false;
        };
        if !reset::is_reset_due(entry.quota_reset_time, now) {
            return false;
        }

        let previous = entry.quota_units_used;
        entry.quota_units_used = 0;
        entry.quota_reset_time = reset::next_reset_millis(now);
        entry.last_updated = now.timestamp_millis();
        tracing::info!(
            application_id = %application_id,
            previous_units = previous,
            next_reset = entry.quota_reset_time,
            "Daily quota reset"
        );
        true
    }

    pub fn record_usage(&self, application_id: &str, units: u64) -> UsageUpdate {
        self.record_usage_at(application_id, units, Utc::now())
    }

    /// Add `units` to the application's usage as of `now`.
    ///
    /// No upper bound is enforced; usage may exceed the daily quota.
    pub fn record_usage_at(
        &self,
        application_id: &str,
        units: u64,
        now: DateTime<Utc>,
    ) -> UsageUpdate {
        self.touch_at(application_id, now);

        let now_ms = now.timestamp_millis();
        let update = {
            let mut entry = self
                .entries
                .entry(application_id.to_string())
                .or_insert_with(|| QuotaUsage::new(reset::next_reset_millis(now), now_ms));
            let previous_units = entry.quota_units_used;
            entry.quota_units_used = previous_units.saturating_add(units);
            entry.last_updated = now_ms;
            UsageUpdate {
                previous_units,
                current: entry.clone(),
            }
        };

        tracing::debug!(
            application_id = %application_id,
            units,
            total = update.current.quota_units_used,
            "Quota usage recorded"
        );
        self.writer.schedule();
        update
    }

    pub fn get_usage(&self, application_id: &str) -> Option<QuotaUsage> {
        self.get_usage_at(application_id, Utc::now())
    }

    /// Current record after the lazy reset check; `None` means no usage yet
    pub fn get_usage_at(&self, application_id: &str, now: DateTime<Utc>) -> Option<QuotaUsage> {
        if self.touch_at(application_id, now) {
            self.writer.schedule();
        }
        self.entries
            .get(application_id)
            .map(|entry| entry.value().clone())
    }

    /// Units consumed in the current period (zero when never recorded)
    pub fn units_used_at(&self, application_id: &str, now: DateTime<Utc>) -> u64 {
        self.get_usage_at(application_id, now)
            .map(|usage| usage.quota_units_used)
            .unwrap_or(0)
    }

    pub fn remaining_capacity(&self, application_id: &str, daily_quota: i64) -> u64 {
        self.remaining_capacity_at(application_id, daily_quota, Utc::now())
    }

    /// `max(0, daily_quota - used)`
    pub fn remaining_capacity_at(
        &self,
        application_id: &str,
        daily_quota: i64,
        now: DateTime<Utc>,
    ) -> u64 {
        let limit = u64::try_from(daily_quota).unwrap_or(0);
        limit.saturating_sub(self.units_used_at(application_id, now))
    }

    pub fn has_capacity(&self, application_id: &str, cost: u64, daily_quota: i64) -> bool {
        self.has_capacity_at(application_id, cost, daily_quota, Utc::now())
    }

    pub fn has_capacity_at(
        &self,
        application_id: &str,
        cost: u64,
        daily_quota: i64,
        now: DateTime<Utc>,
    ) -> bool {
        self.remaining_capacity_at(application_id, daily_quota, now) >= cost
    }

    pub fn usage_percentage(&self, application_id: &str, daily_quota: i64) -> Option<u8> {
        self.usage_percentage_at(application_id, daily_quota, Utc::now())
    }

    /// Floor-truncated percentage capped at 100; `None` when the quota is not positive
    pub fn usage_percentage_at(
        &self,
        application_id: &str,
        daily_quota: i64,
        now: DateTime<Utc>,
    ) -> Option<u8> {
        usage_percentage(self.units_used_at(application_id, now), daily_quota)
    }

    /// Manually zero an application's usage and start a fresh period
    pub fn reset_application(&self, application_id: &str) {
        self.reset_application_at(application_id, Utc::now())
    }

    pub fn reset_application_at(&self, application_id: &str, now: DateTime<Utc>) {
        let reset = match self.entries.get_mut(application_id) {
            Some(mut entry) => {
                entry.quota_units_used = 0;
                entry.quota_reset_time = reset::next_reset_millis(now);
                entry.last_updated = now.timestamp_millis();
                true
            }
            None => false,
        };
        if reset {
            tracing::info!(application_id = %application_id, "Quota usage manually reset");
            self.writer.schedule();
        }
    }

    /// Drop records of applications not in `known_ids`, returning how many were removed
    pub fn retain_applications(&self, known_ids: &[String]) -> usize {
        let mut removed = 0;
        self.entries.retain(|id, _| {
            let keep = known_ids.iter().any(|known| known == id);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            tracing::info!("Removed {} stale quota records", removed);
            self.writer.schedule();
        }
        removed
    }

    pub fn snapshot(&self) -> persistence::LedgerFile {
        self.snapshot_at(Utc::now())
    }

    /// All records, after applying any due resets
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> persistence::LedgerFile {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut any_reset = false;
        for id in &ids {
            any_reset |= self.touch_at(id, now);
        }
        if any_reset {
            self.writer.schedule();
        }
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Cancel the pending debounced write and persist immediately
    pub fn flush(&self) -> AppResult<()> {
        self.writer.flush()
    }

    pub fn has_pending_write(&self) -> bool {
        self.writer.has_pending()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for QuotaLedger {
    fn drop(&mut self) {
        self.writer.flush_if_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn ledger_in(dir: &tempfile::TempDir) -> QuotaLedger {
        QuotaLedger::load(dir.path().join("usage.json"), Duration::from_secs(60))
    }

    #[test]
    fn test_first_record_seeds_reset_time() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let now = utc("2024-01-15T20:00:00Z");

        let update = ledger.record_usage_at("app-1", 5, now);
        assert_eq!(update.previous_units, 0);
        assert_eq!(update.current.quota_units_used, 5);
        assert_eq!(
            update.current.quota_reset_time,
            utc("2024-01-16T08:00:00Z").timestamp_millis()
        );
        assert_eq!(update.current.last_updated, now.timestamp_millis());
    }

    #[test]
    fn test_usage_is_monotonic_within_period() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let mut now = utc("2024-01-15T09:00:00Z");

        let mut last = 0;
        for cost in [1, 5, 5, 100, 3] {
            let update = ledger.record_usage_at("app-1", cost, now);
            assert!(update.current.quota_units_used >= last);
            assert_eq!(update.previous_units, last);
            last = update.current.quota_units_used;
            now += ChronoDuration::minutes(30);
        }
        assert_eq!(last, 114);
    }

    #[test]
    fn test_usage_may_exceed_quota() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let now = utc("2024-01-15T09:00:00Z");
        ledger.record_usage_at("app-1", 10_500, now);
        assert_eq!(ledger.units_used_at("app-1", now), 10_500);
        assert_eq!(ledger.remaining_capacity_at("app-1", 10_000, now), 0);
        assert_eq!(ledger.usage_percentage_at("app-1", 10_000, now), Some(100));
    }

    #[test]
    fn test_reset_on_boundary_crossing() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let before = utc("2024-01-16T07:59:59Z");
        ledger.record_usage_at("app-1", 900, before);

        let after = utc("2024-01-16T08:00:00Z");
        let usage = ledger.get_usage_at("app-1", after).unwrap();
        assert_eq!(usage.quota_units_used, 0);
        assert!(usage.quota_reset_time > after.timestamp_millis());
        assert_eq!(
            usage.quota_reset_time,
            utc("2024-01-17T08:00:00Z").timestamp_millis()
        );
    }

    #[test]
    fn test_write_after_boundary_starts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.record_usage_at("app-1", 900, utc("2024-03-09T20:00:00Z"));

        // Untouched across two boundaries, including the spring-forward day
        let update = ledger.record_usage_at("app-1", 5, utc("2024-03-11T15:00:00Z"));
        assert_eq!(update.previous_units, 0);
        assert_eq!(update.current.quota_units_used, 5);
        assert_eq!(
            update.current.quota_reset_time,
            utc("2024-03-12T07:00:00Z").timestamp_millis()
        );
    }

    #[test]
    fn test_get_usage_idempotent_without_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let now = utc("2024-01-15T09:00:00Z");
        ledger.record_usage_at("app-1", 40, now);

        let later = now + ChronoDuration::minutes(5);
        let first = ledger.get_usage_at("app-1", later);
        let second = ledger.get_usage_at("app-1", later);
        assert_eq!(first, second);
        assert_eq!(first.unwrap().quota_units_used, 40);
    }

    #[test]
    fn test_unknown_application_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let now = utc("2024-01-15T09:00:00Z");
        assert_eq!(ledger.get_usage_at("ghost", now), None);
        assert_eq!(ledger.remaining_capacity_at("ghost", 10_000, now), 10_000);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_capacity_exact_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let now = utc("2024-01-15T09:00:00Z");
        ledger.record_usage_at("app-1", 9_900, now);

        assert_eq!(ledger.remaining_capacity_at("app-1", 10_000, now), 100);
        assert!(!ledger.has_capacity_at("app-1", 200, 10_000, now));
        assert!(ledger.has_capacity_at("app-1", 100, 10_000, now));
    }

    #[test]
    fn test_non_positive_quota_has_no_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let now = utc("2024-01-15T09:00:00Z");
        assert_eq!(ledger.remaining_capacity_at("app-1", -10, now), 0);
        assert!(!ledger.has_capacity_at("app-1", 1, 0, now));
        assert_eq!(ledger.usage_percentage_at("app-1", 0, now), None);
    }

    #[test]
    fn test_manual_reset_and_retain() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let now = utc("2024-01-15T09:00:00Z");
        ledger.record_usage_at("app-1", 300, now);
        ledger.record_usage_at("app-2", 200, now);

        ledger.reset_application_at("app-1", now);
        assert_eq!(ledger.units_used_at("app-1", now), 0);

        let removed = ledger.retain_applications(&["app-1".to_string()]);
        assert_eq!(removed, 1);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.snapshot_at(now).contains_key("app-1"));
    }

    #[test]
    fn test_retain_counts_only_removed_records_under_concurrent_inserts() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let now = utc("2024-01-15T09:00:00Z");
        for i in 0..200 {
            ledger.record_usage_at(&format!("stale-{}", i), 1, now);
        }
        let known: Vec<String> = (0..300).map(|i| format!("keep-{}", i)).collect();

        let removed = std::thread::scope(|scope| {
            scope.spawn(|| {
                for id in &known {
                    ledger.record_usage_at(id, 1, now);
                }
            });
            ledger.retain_applications(&known)
        });

        assert_eq!(removed, 200);
        assert_eq!(ledger.retain_applications(&known), 0);
        assert_eq!(ledger.len(), 300);
    }

    #[test]
    fn test_flush_then_reload_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        let now = utc("2024-01-15T09:00:00Z");
        {
            let ledger = QuotaLedger::load(path.clone(), Duration::from_secs(60));
            ledger.record_usage_at("app-1", 250, now);
            ledger.flush().unwrap();
        }

        let reloaded = QuotaLedger::load(path, Duration::from_secs(60));
        assert_eq!(reloaded.units_used_at("app-1", now), 250);
    }

    #[tokio::test]
    async fn test_drop_flushes_pending_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        let now = utc("2024-01-15T09:00:00Z");
        {
            let ledger = QuotaLedger::load(path.clone(), Duration::from_secs(60));
            ledger.record_usage_at("app-1", 12, now);
            assert!(ledger.has_pending_write());
        }

        let reloaded = persistence::load_ledger(&path);
        assert_eq!(reloaded["app-1"].quota_units_used, 12);
    }
}
