pub mod application;
pub mod config;
pub mod event;
pub mod quota;

pub use application::Application;
pub use config::{AppConfig, FailoverConfig, LedgerConfig, PollingConfig, ProbeConfig};
pub use event::QuotaEvent;
pub use quota::{usage_percentage, QuotaSettings, QuotaUsage};
