use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::capabilities::{Credential, ViabilityProbe};
use crate::models::{Application, ProbeConfig};

/// Placeholder in the probe URL replaced by the candidate's identifier
const APPLICATION_ID_PLACEHOLDER: &str = "{application_id}";

/// Probes a candidate with an authenticated GET; any 2xx means viable
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: crate::utils::http::create_client(timeout_secs),
            url: url.into(),
        }
    }

    /// `None` when no probe URL is configured
    pub fn from_config(config: &ProbeConfig) -> Option<Self> {
        config
            .url
            .as_ref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| Self::new(url.clone(), config.timeout_secs))
    }

    fn url_for(&self, application: &Application) -> String {
        self.url
            .replace(APPLICATION_ID_PLACEHOLDER, &application.id)
    }
}

#[async_trait]
impl ViabilityProbe for HttpProbe {
    async fn probe(&self, application: &Application, credential: &Credential) -> anyhow::Result<()> {
        let url = self.url_for(application);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&credential.access_token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(application_id = %application.id, "Probe succeeded");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        match status {
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                anyhow::bail!("quota unavailable ({}): {}", status, text)
            }
            StatusCode::UNAUTHORIZED => anyhow::bail!("credential rejected ({})", status),
            _ => anyhow::bail!("probe failed ({}): {}", status, text),
        }
    }
}
