pub mod config;
pub mod delay;
pub mod events;
pub mod ledger;
pub mod logger;
pub mod persistence;
pub mod reset;
pub mod threshold;

// Re-export commonly used items at the modules namespace top level
pub use delay::{calculate_delay, calculate_delay_with_defaults, DelayError};
pub use events::{BroadcastEventSink, EventSink, MemoryEventSink};
pub use ledger::{QuotaLedger, UsageUpdate};
pub use reset::next_reset_after;
pub use threshold::{crossed_thresholds, ThresholdNotifier};
