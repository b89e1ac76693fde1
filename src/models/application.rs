use serde::{Deserialize, Serialize};

use super::QuotaSettings;

/// A credentialed upstream account whose quota is tracked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub name: String,
    pub quota: QuotaSettings,
}

impl Application {
    pub fn new(id: impl Into<String>, name: impl Into<String>, quota: QuotaSettings) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            quota,
        }
    }

    pub fn daily_quota(&self) -> i64 {
        self.quota.daily_quota
    }
}
