//! Drives a failover attempt from candidate ranking to the application switch.
//!
//! Attempts never stack: entry is guarded by an atomic in-progress flag that
//! a scoped guard clears on every exit path, including panics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::capabilities::{ActivationCause, CredentialProvider, IntegrationHost, ViabilityProbe};
use super::selector::{rank_candidates_at, FailoverCandidate};
use crate::models::{FailoverConfig, QuotaEvent};
use crate::modules::events::EventSink;
use crate::modules::ledger::QuotaLedger;

/// Usage snapshot of the application whose crossing requested the failover
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverTrigger {
    pub application_id: String,
    pub application_name: String,
    pub quota_consumed: u64,
    pub quota_limit: i64,
    pub threshold: u8,
}

/// Exit taken by a failover attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverOutcome {
    AlreadyInProgress,
    Disabled,
    NoEligibleApplication,
    AllCandidatesFailed,
    Switched { previous: String, next: String },
    /// The attempt's task died before reaching a defined exit
    Aborted,
}

struct InProgressGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InProgressGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct FailoverOrchestrator {
    in_progress: AtomicBool,
    settings: RwLock<FailoverConfig>,
    ledger: Arc<QuotaLedger>,
    host: Arc<dyn IntegrationHost>,
    credentials: Arc<dyn CredentialProvider>,
    probe: Arc<dyn ViabilityProbe>,
    events: Arc<dyn EventSink>,
}

impl FailoverOrchestrator {
    pub fn new(
        settings: FailoverConfig,
        ledger: Arc<QuotaLedger>,
        host: Arc<dyn IntegrationHost>,
        credentials: Arc<dyn CredentialProvider>,
        probe: Arc<dyn ViabilityProbe>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            in_progress: AtomicBool::new(false),
            settings: RwLock::new(settings),
            ledger,
            host,
            credentials,
            probe,
            events,
        }
    }

    pub fn settings(&self) -> FailoverConfig {
        match self.settings.read() {
            Ok(settings) => settings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the failover settings; takes effect on the next attempt
    pub fn update_settings(&self, settings: FailoverConfig) {
        match self.settings.write() {
            Ok(mut current) => *current = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
        tracing::info!("Failover settings updated");
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn host(&self) -> &Arc<dyn IntegrationHost> {
        &self.host
    }

    /// Run one failover attempt to completion.
    ///
    /// Never fails: every problem degrades to an outcome that leaves the
    /// current application active.
    pub async fn attempt_failover(&self, trigger: FailoverTrigger) -> FailoverOutcome {
        self.attempt_failover_at(trigger, Utc::now()).await
    }

    /// Same as [`attempt_failover`](Self::attempt_failover), ranking usage as of `now`
    pub async fn attempt_failover_at(
        &self,
        trigger: FailoverTrigger,
        now: DateTime<Utc>,
    ) -> FailoverOutcome {
        let Some(_guard) = InProgressGuard::acquire(&self.in_progress) else {
            tracing::debug!(
                application_id = %trigger.application_id,
                "Failover already in progress, ignoring request"
            );
            return FailoverOutcome::AlreadyInProgress;
        };

        let settings = self.settings();
        if !settings.auto_failover_enabled {
            tracing::debug!("Automatic failover disabled");
            return FailoverOutcome::Disabled;
        }

        let previous = self
            .host
            .active_application_id()
            .unwrap_or_else(|| trigger.application_id.clone());

        let candidates = rank_candidates_at(
            &self.host.applications(),
            &self.ledger,
            Some(previous.as_str()),
            settings.threshold_percent(),
            now,
        );
        if candidates.is_empty() {
            tracing::info!(
                application_id = %previous,
                "No eligible application for failover, keeping current application"
            );
            return FailoverOutcome::NoEligibleApplication;
        }

        tracing::info!(
            application_id = %previous,
            candidates = candidates.len(),
            "Starting quota failover"
        );

        for candidate in &candidates {
            if self.try_candidate(candidate).await {
                return self.complete_switch(previous, candidate, &trigger).await;
            }
        }

        tracing::warn!(
            application_id = %previous,
            "Every failover candidate failed, keeping current application"
        );
        FailoverOutcome::AllCandidatesFailed
    }

    /// Credential, probe and activation for one candidate; `true` when it is now active
    async fn try_candidate(&self, candidate: &FailoverCandidate) -> bool {
        let app = &candidate.application;

        let credential = match self.credentials.credential_for(app).await {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                tracing::info!(application_id = %app.id, "No usable credential, skipping candidate");
                return false;
            }
            Err(e) => {
                tracing::warn!(application_id = %app.id, "Credential lookup failed: {:#}", e);
                return false;
            }
        };

        if let Err(e) = self.probe.probe(app, &credential).await {
            tracing::warn!(application_id = %app.id, "Candidate probe failed: {:#}", e);
            return false;
        }

        if let Err(e) = self
            .host
            .activate_application(&app.id, ActivationCause::AutomaticFailover)
            .await
        {
            tracing::warn!(application_id = %app.id, "Failed to activate candidate: {:#}", e);
            return false;
        }
        true
    }

    async fn complete_switch(
        &self,
        previous: String,
        candidate: &FailoverCandidate,
        trigger: &FailoverTrigger,
    ) -> FailoverOutcome {
        let app = &candidate.application;

        if self.host.is_connected() {
            if let Err(e) = self.host.redirect_polling(&app.id).await {
                tracing::warn!(application_id = %app.id, "Failed to redirect polling: {:#}", e);
            }
        }

        tracing::info!(
            previous = %previous,
            application_id = %app.id,
            usage_percent = candidate.usage_percent,
            "Quota failover completed"
        );
        self.events.emit(QuotaEvent::FailoverCompleted {
            previous_application_id: previous.clone(),
            application_id: app.id.clone(),
            application_name: app.name.clone(),
            quota_consumed: trigger.quota_consumed,
            quota_limit: trigger.quota_limit,
            threshold: trigger.threshold,
        });

        FailoverOutcome::Switched {
            previous,
            next: app.id.clone(),
        }
    }
}
