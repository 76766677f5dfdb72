pub mod counters;

pub use counters::{UsageCategory, UsageCounters, UsageStats};
