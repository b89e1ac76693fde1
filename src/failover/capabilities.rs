//! Narrow interfaces the failover layer needs from the host integration.

use async_trait::async_trait;

use crate::models::Application;

/// Why the active application changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationCause {
    AutomaticFailover,
    Manual,
}

impl ActivationCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationCause::AutomaticFailover => "automatic_failover",
            ActivationCause::Manual => "manual",
        }
    }
}

/// Usable session material for one application
#[derive(Clone)]
pub struct Credential {
    pub access_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Application roster, activation and polling control owned by the host
#[async_trait]
pub trait IntegrationHost: Send + Sync {
    /// Identifier of the application currently carrying traffic
    fn active_application_id(&self) -> Option<String>;

    /// Every configured application, active one included
    fn applications(&self) -> Vec<Application>;

    /// Whether the polling loop is currently connected
    fn is_connected(&self) -> bool;

    async fn activate_application(
        &self,
        application_id: &str,
        cause: ActivationCause,
    ) -> anyhow::Result<()>;

    /// Point the running polling loop at `application_id`
    async fn redirect_polling(&self, application_id: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// `Ok(None)` when the application has no usable credential right now
    async fn credential_for(&self, application: &Application) -> anyhow::Result<Option<Credential>>;
}

#[async_trait]
pub trait ViabilityProbe: Send + Sync {
    /// Lightweight idempotent read proving the application is usable now
    async fn probe(&self, application: &Application, credential: &Credential)
        -> anyhow::Result<()>;
}
