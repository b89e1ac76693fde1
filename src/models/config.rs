use serde::{Deserialize, Serialize};

const DEFAULT_FAILOVER_THRESHOLD: f64 = 95.0;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub failover: FailoverConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Automatic failover settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverConfig {
    #[serde(default)]
    pub auto_failover_enabled: bool,
    /// Percentage of the daily quota that triggers a failover attempt
    #[serde(default = "default_failover_threshold")]
    pub failover_threshold: f64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            auto_failover_enabled: false,
            failover_threshold: DEFAULT_FAILOVER_THRESHOLD,
        }
    }
}

impl FailoverConfig {
    /// Threshold as a whole percentage, rounded half-up and clamped to `[1, 100]`
    pub fn threshold_percent(&self) -> u8 {
        let raw = if self.failover_threshold.is_finite() {
            self.failover_threshold
        } else {
            DEFAULT_FAILOVER_THRESHOLD
        };
        raw.round().clamp(1.0, 100.0) as u8
    }
}

fn default_failover_threshold() -> f64 {
    DEFAULT_FAILOVER_THRESHOLD
}

/// Ledger persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_file")]
    pub file_name: String,
    /// Quiet period after the last mutation before the ledger is written
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            file_name: default_ledger_file(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_ledger_file() -> String {
    "quota_usage.json".to_string()
}

fn default_debounce_ms() -> u64 {
    2_000
}

/// Constants of the recurring poll call used by the delay calculator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Fraction of the daily quota the polling loop may consume
    #[serde(default = "default_target_utilization")]
    pub target_utilization: f64,
    /// Quota units charged per poll call
    #[serde(default = "default_poll_call_cost")]
    pub poll_call_cost: u32,
    /// Seconds a poll call blocks before returning when idle
    #[serde(default = "default_min_call_duration")]
    pub min_call_duration_secs: f64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            target_utilization: default_target_utilization(),
            poll_call_cost: default_poll_call_cost(),
            min_call_duration_secs: default_min_call_duration(),
        }
    }
}

fn default_target_utilization() -> f64 {
    0.8
}

fn default_poll_call_cost() -> u32 {
    5
}

fn default_min_call_duration() -> f64 {
    10.0
}

/// HTTP viability probe settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_probe_timeout(),
        }
    }
}

fn default_probe_timeout() -> u64 {
    15
}
