//! Daily API quota ledger, polling cadence and automatic account failover.
//!
//! Each credentialed upstream account ("application") has a daily quota that
//! resets at Pacific midnight. The host reports every call's cost to
//! [`QuotaService`]; the service keeps the durable [`QuotaLedger`], publishes
//! one event per whole percentage point crossed, and once the active
//! application reaches the failover threshold, probes the other applications
//! and switches traffic to the best viable one.

pub mod error;
pub mod failover;
pub mod models;
pub mod modules;
pub mod service;
mod utils;

pub use error::{AppError, AppResult};
pub use failover::{
    ActivationCause, Credential, CredentialProvider, FailoverOrchestrator, FailoverOutcome,
    FailoverTrigger, HttpProbe, IntegrationHost, ViabilityProbe,
};
pub use models::{AppConfig, Application, QuotaEvent, QuotaSettings, QuotaUsage};
pub use modules::{EventSink, QuotaLedger};
pub use service::{QuotaService, UsageReport};
