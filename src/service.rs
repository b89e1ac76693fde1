//! Quota subsystem context owned by the host integration.
//!
//! Wires the data flow: a reported call cost updates the ledger, the
//! notifier publishes any percentage crossings, and crossing the failover
//! threshold on the active application spawns a failover attempt in the
//! background.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::error::AppResult;
use crate::failover::{
    CredentialProvider, FailoverOrchestrator, FailoverOutcome, FailoverTrigger, IntegrationHost,
    ViabilityProbe,
};
use crate::models::{AppConfig, Application, PollingConfig};
use crate::modules::delay::{self, DelayError};
use crate::modules::events::EventSink;
use crate::modules::ledger::{QuotaLedger, UsageUpdate};
use crate::modules::threshold::ThresholdNotifier;

/// Result of reporting a call's cost
#[derive(Debug)]
pub struct UsageReport {
    pub update: UsageUpdate,
    pub thresholds_crossed: Vec<u8>,
    /// Background failover attempt started by this report, if any
    pub failover: Option<JoinHandle<FailoverOutcome>>,
}

pub struct QuotaService {
    ledger: Arc<QuotaLedger>,
    notifier: ThresholdNotifier,
    orchestrator: Arc<FailoverOrchestrator>,
    polling: PollingConfig,
}

impl QuotaService {
    /// Build the service, loading the ledger from `ledger_path`
    pub fn new(
        config: &AppConfig,
        ledger_path: PathBuf,
        host: Arc<dyn IntegrationHost>,
        credentials: Arc<dyn CredentialProvider>,
        probe: Arc<dyn ViabilityProbe>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let ledger = Arc::new(QuotaLedger::load(
            ledger_path,
            Duration::from_millis(config.ledger.debounce_ms),
        ));
        let orchestrator = Arc::new(FailoverOrchestrator::new(
            config.failover.clone(),
            ledger.clone(),
            host,
            credentials,
            probe,
            events.clone(),
        ));
        Self {
            ledger,
            notifier: ThresholdNotifier::new(events),
            orchestrator,
            polling: config.polling.clone(),
        }
    }

    pub fn ledger(&self) -> &Arc<QuotaLedger> {
        &self.ledger
    }

    pub fn orchestrator(&self) -> &Arc<FailoverOrchestrator> {
        &self.orchestrator
    }

    pub fn record_usage(&self, application: &Application, units: u64) -> UsageReport {
        self.record_usage_at(application, units, Utc::now())
    }

    /// Report the cost of a completed call.
    ///
    /// Never blocks on, or fails because of, a failover it starts.
    pub fn record_usage_at(
        &self,
        application: &Application,
        units: u64,
        now: DateTime<Utc>,
    ) -> UsageReport {
        let update = self.ledger.record_usage_at(&application.id, units, now);
        let thresholds_crossed = self.notifier.notify(
            application,
            update.previous_units,
            update.current.quota_units_used,
        );

        let failover_threshold = self.orchestrator.settings().threshold_percent();
        let is_active = self.orchestrator.host().active_application_id().as_deref()
            == Some(application.id.as_str());

        let failover = if is_active && thresholds_crossed.contains(&failover_threshold) {
            self.spawn_failover(
                FailoverTrigger {
                    application_id: application.id.clone(),
                    application_name: application.name.clone(),
                    quota_consumed: update.current.quota_units_used,
                    quota_limit: application.daily_quota(),
                    threshold: failover_threshold,
                },
                now,
            )
        } else {
            None
        };

        UsageReport {
            update,
            thresholds_crossed,
            failover,
        }
    }

    /// Run the attempt on its own task; a panic there is logged, not propagated
    fn spawn_failover(
        &self,
        trigger: FailoverTrigger,
        now: DateTime<Utc>,
    ) -> Option<JoinHandle<FailoverOutcome>> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(
                    application_id = %trigger.application_id,
                    "No async runtime available, failover not started"
                );
                return None;
            }
        };

        tracing::info!(
            application_id = %trigger.application_id,
            threshold = trigger.threshold,
            "Failover threshold crossed"
        );
        let orchestrator = self.orchestrator.clone();
        let attempt =
            runtime.spawn(async move { orchestrator.attempt_failover_at(trigger, now).await });
        Some(runtime.spawn(async move {
            match attempt.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Failover task failed: {}", e);
                    FailoverOutcome::Aborted
                }
            }
        }))
    }

    /// Start a failover outside the threshold path (e.g. an upstream quota error)
    pub async fn request_failover(&self, trigger: FailoverTrigger) -> FailoverOutcome {
        self.orchestrator.attempt_failover(trigger).await
    }

    pub fn remaining_capacity(&self, application: &Application) -> u64 {
        self.ledger
            .remaining_capacity(&application.id, application.daily_quota())
    }

    /// Whether a call costing `cost` fits in the remaining quota; logs a warning when not
    pub fn check_capacity(&self, application: &Application, cost: u64) -> bool {
        let remaining = self.remaining_capacity(application);
        if remaining >= cost {
            return true;
        }
        tracing::warn!(
            application_id = %application.id,
            cost,
            remaining,
            "Insufficient quota for planned call"
        );
        false
    }

    /// Polling interval for `application` under the configured poll-call constants
    pub fn polling_delay(&self, application: &Application) -> Result<Duration, DelayError> {
        delay::calculate_delay(&application.quota, &self.polling)
    }

    /// Persist the ledger immediately; call on graceful shutdown
    pub fn shutdown(&self) -> AppResult<()> {
        tracing::info!("Flushing quota ledger for shutdown");
        self.ledger.flush()
    }
}
